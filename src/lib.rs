//! Incremental, measurement-driven pagination for illustrated diary text.
//!
//! The pipeline is leaf-first:
//!
//! 1. [`tokenize`] turns raw journal text into typed [`Token`]s
//!    (paragraphs, separators, image references, a leading metadata head).
//! 2. [`resolve_images`] binds image references through an [`ImageResolver`],
//!    degrading unresolved ones to a `Missing image-N` notice.
//! 3. [`PagePacker`] greedily fills [`Page`]s, asking a [`MeasurementOracle`]
//!    whether each candidate fits.
//! 4. [`PaginationSession`] builds pages lazily in bounded batches and
//!    rebuilds them when the capacity changes.
//! 5. [`Navigator`] tracks the reading position and interprets swipe gestures.
//!
//! ```rust
//! use diary_pager::{tokenize, BudgetConfig, BudgetOracle, Navigator, PaginationSession};
//!
//! let tokens = tokenize("Place: Paris\nDate: 1993\n\nHello world", &Default::default());
//! let oracle = BudgetOracle::new(BudgetConfig::characters(300));
//! let navigator = Navigator::new(PaginationSession::new(tokens, oracle), Default::default());
//! assert_eq!(navigator.state().counter_label(), "1/1");
//! ```

#![cfg_attr(
    not(test),
    deny(
        clippy::expect_used,
        clippy::unwrap_used,
        clippy::panic,
        clippy::todo,
        clippy::unimplemented
    )
)]

pub mod config;
#[cfg(feature = "async")]
pub mod cooperative;
pub mod error;
pub mod layout;
pub mod measure;
pub mod navigator;
pub mod packer;
pub mod reader;
pub mod resolve;
pub mod session;
pub mod tokenizer;

pub use config::{OracleConfig, PagerConfig};
#[cfg(feature = "async")]
pub use cooperative::{build_ahead, build_cooperatively, build_cooperatively_to};
pub use error::{PagerError, Result};
pub use layout::{FontFamily, HeuristicSurface, LayoutConfig, TextMeasurer};
pub use measure::{
    BudgetConfig, BudgetOracle, BudgetUnit, LayoutProfileId, MeasurementOracle,
    PresentationSurface, RenderedHeightOracle,
};
pub use navigator::{
    decide_release, GestureConfig, GestureDecision, GestureTracker, Navigator, NavigatorState,
    SwipeDirection, Transition,
};
pub use packer::{
    BlockContent, Cursor, Overflow, PackStep, Page, PageBlocks, PagePacker, RenderBlock, TextSlice,
};
#[cfg(feature = "async")]
pub use reader::open_document_async;
pub use reader::{open_document, DynOracle, Reader, LOAD_ERROR_TEXT};
#[cfg(feature = "async")]
pub use resolve::resolve_images_async;
pub use resolve::{
    missing_image_notice, resolve_images, DocumentSource, FsDocumentSource, FsImageResolver,
    ImageResolver, MapImageResolver, IMAGE_EXTENSIONS,
};
pub use session::{
    BuildProgress, BuildTicket, CancelToken, NeverCancel, PaginationDiagnostic,
    PaginationSession, SessionOptions,
};
pub use tokenizer::{
    tokenize, ImageRef, ImageSource, Metadata, SeparatorStyle, Token, TokenizerOptions,
};
