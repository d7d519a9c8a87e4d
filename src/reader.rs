//! Document-opening facade tying the pipeline together.
//!
//! [`open_document`] fetches text, tokenizes it, binds images and hands a
//! [`Navigator`] over a fresh session to the caller. A document that cannot be
//! fetched still opens: the reader shows a single placeholder page and keeps
//! the error for the caller to report.

use std::fmt;

use crate::config::PagerConfig;
use crate::error::{PagerError, Result};
use crate::measure::MeasurementOracle;
use crate::navigator::{Navigator, NavigatorState};
use crate::packer::Page;
use crate::resolve::{resolve_images, DocumentSource, ImageResolver};
use crate::session::PaginationSession;
use crate::tokenizer::{tokenize, Token};

/// Text of the placeholder page shown when a document fails to load.
pub const LOAD_ERROR_TEXT: &str = "Error loading text.";

/// Type-erased oracle chosen from configuration.
pub type DynOracle = Box<dyn MeasurementOracle + Send>;

/// An opened document: navigator, configuration and load outcome.
pub struct Reader {
    id: String,
    config: PagerConfig,
    navigator: Navigator<DynOracle>,
    load_error: Option<PagerError>,
}

impl fmt::Debug for Reader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reader")
            .field("id", &self.id)
            .field("state", &self.navigator.state())
            .field("load_error", &self.load_error)
            .finish_non_exhaustive()
    }
}

impl Reader {
    /// Open already-fetched text.
    pub fn from_text<R: ImageResolver + ?Sized>(
        id: impl Into<String>,
        raw: &str,
        resolver: &R,
        config: &PagerConfig,
    ) -> Self {
        let tokens = resolve_images(tokenize(raw, &config.tokenizer), resolver);
        Self::from_tokens(id.into(), tokens, config, None)
    }

    /// Reader over the single "Error loading text." page.
    pub fn placeholder(id: impl Into<String>, config: &PagerConfig, error: PagerError) -> Self {
        let id = id.into();
        log::warn!("showing placeholder for {id}: {error}");
        Self::from_tokens(id, vec![Token::text(LOAD_ERROR_TEXT)], config, Some(error))
    }

    fn from_tokens(
        id: String,
        tokens: Vec<Token>,
        config: &PagerConfig,
        load_error: Option<PagerError>,
    ) -> Self {
        let session =
            PaginationSession::new(tokens, config.build_oracle()).with_options(config.session);
        Self {
            id,
            config: config.clone(),
            navigator: Navigator::new(session, config.gesture),
            load_error,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn config(&self) -> &PagerConfig {
        &self.config
    }

    /// The fetch error behind a placeholder page, if any.
    pub fn load_error(&self) -> Option<&PagerError> {
        self.load_error.as_ref()
    }

    pub fn is_placeholder(&self) -> bool {
        self.load_error.is_some()
    }

    pub fn navigator(&self) -> &Navigator<DynOracle> {
        &self.navigator
    }

    pub fn navigator_mut(&mut self) -> &mut Navigator<DynOracle> {
        &mut self.navigator
    }

    pub fn state(&self) -> NavigatorState {
        self.navigator.state()
    }

    /// Re-paginate for a new viewport size, keeping the reading position.
    pub fn resize(&mut self, width: u32, height: u32) -> usize {
        self.config.oracle = self.config.oracle.for_viewport(width, height);
        self.navigator.resize(self.config.build_oracle())
    }

    /// Page `index`, building up to it. Fails past the last page.
    pub fn page(&mut self, index: usize) -> Result<&Page> {
        let session = self.navigator.session_mut();
        session.ensure_built(index);
        let page_count = session.built_len();
        session
            .built_page(index)
            .ok_or(PagerError::PageOutOfRange { index, page_count })
    }

    /// Build every remaining page. Returns the page count.
    pub fn build_all(&mut self) -> usize {
        self.navigator.session_mut().build_all()
    }
}

/// Fetch, tokenize, resolve and open document `id`.
///
/// An unavailable source yields a placeholder reader rather than an error.
pub fn open_document<S, R>(
    source: &S,
    resolver: &R,
    id: &str,
    config: &PagerConfig,
) -> Result<Reader>
where
    S: DocumentSource + ?Sized,
    R: ImageResolver + ?Sized,
{
    match source.fetch_document(id) {
        Ok(raw) => Ok(Reader::from_text(id, &raw, resolver, config)),
        Err(err) if err.is_source_unavailable() => Ok(Reader::placeholder(id, config, err)),
        Err(err) => Err(err),
    }
}

/// Asynchronous [`open_document`] over the filesystem collaborators.
#[cfg(feature = "async")]
pub async fn open_document_async(
    source: &crate::resolve::FsDocumentSource,
    resolver: &crate::resolve::FsImageResolver,
    id: &str,
    config: &PagerConfig,
) -> Result<Reader> {
    match source.fetch_document_async(id).await {
        Ok(raw) => {
            let tokens = tokenize(&raw, &config.tokenizer);
            let tokens = crate::resolve::resolve_images_async(tokens, resolver).await;
            Ok(Reader::from_tokens(id.to_string(), tokens, config, None))
        }
        Err(err) if err.is_source_unavailable() => Ok(Reader::placeholder(id, config, err)),
        Err(err) => Err(err),
    }
}
