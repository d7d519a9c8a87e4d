//! Error types for document loading and incremental pagination.
//!
//! Most irregular input (oversized images, unbreakable words, missing images)
//! is absorbed by pagination policy and reported through diagnostics instead.
//! The variants here are the conditions a caller has to act on.

use std::path::PathBuf;

use thiserror::Error;

/// Errors surfaced by `diary-pager`.
#[derive(Debug, Error)]
pub enum PagerError {
    /// The document could not be fetched from its source.
    #[error("document `{id}` unavailable: {reason}")]
    SourceUnavailable { id: String, reason: String },
    /// Filesystem failure outside of document fetching.
    #[error("I/O error at {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// Configuration payload failed to deserialize.
    #[error("invalid configuration: {0}")]
    Config(#[from] serde_json::Error),
    /// A build ticket from an earlier layout generation was used after a
    /// capacity change.
    #[error("stale build ticket: generation {ticket}, session is at {current}")]
    StaleBuild { ticket: u64, current: u64 },
    /// A page past the end of the document was requested.
    #[error("page {} does not exist, the document has {page_count} pages", .index.saturating_add(1))]
    PageOutOfRange { index: usize, page_count: usize },
    /// Incremental build was cancelled by its cancel token.
    #[error("pagination cancelled")]
    Cancelled,
}

impl PagerError {
    pub(crate) fn unavailable(id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::SourceUnavailable {
            id: id.into(),
            reason: reason.into(),
        }
    }

    /// `true` for errors that the reader turns into a placeholder page.
    pub fn is_source_unavailable(&self) -> bool {
        matches!(self, Self::SourceUnavailable { .. })
    }
}

/// Result alias for `diary-pager` operations.
pub type Result<T> = core::result::Result<T, PagerError>;
