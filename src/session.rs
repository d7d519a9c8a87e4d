//! Lazy, incremental page construction.
//!
//! A [`PaginationSession`] owns the token stream, the oracle, and the cache of
//! built pages for one layout generation. Pages are only ever appended in
//! document order, and only by packing from the committed cursor. A capacity
//! change discards everything and starts a new generation; build tickets from
//! older generations are refused so no stale build can complete into the new
//! page list.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};

use crate::error::{PagerError, Result};
use crate::measure::{LayoutProfileId, MeasurementOracle};
use crate::packer::{Cursor, Overflow, PackStep, Page, PagePacker};
use crate::tokenizer::Token;

/// Cancellation hook for long-running incremental builds.
pub trait CancelToken {
    fn is_cancelled(&self) -> bool;
}

/// Never-cancel token for default call paths.
#[derive(Clone, Copy, Debug, Default)]
pub struct NeverCancel;

impl CancelToken for NeverCancel {
    fn is_cancelled(&self) -> bool {
        false
    }
}

impl CancelToken for AtomicBool {
    fn is_cancelled(&self) -> bool {
        self.load(Ordering::Relaxed)
    }
}

impl<T: CancelToken + ?Sized> CancelToken for Arc<T> {
    fn is_cancelled(&self) -> bool {
        (**self).is_cancelled()
    }
}

/// Session tuning.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionOptions {
    /// Pages built per batch before yielding to the scheduler.
    pub batch_pages: usize,
    /// Pages built ahead of the one being viewed.
    pub look_ahead: usize,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            batch_pages: 4,
            look_ahead: 1,
        }
    }
}

/// Runtime diagnostics from incremental pagination.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PaginationDiagnostic {
    /// The document produced no tokens; a single empty page was built.
    EmptyDocument,
    /// An atomic block larger than a page was placed alone.
    OversizedAtomic {
        page_index: usize,
        token_index: usize,
    },
    /// A word larger than a page was split at a character boundary.
    HardSplit {
        page_index: usize,
        token_index: usize,
    },
    /// Pages were discarded and rebuilt for a new layout generation.
    Rebuilt { generation: u64, anchor_page: usize },
    /// An incremental build stopped at its cancel token.
    Cancelled { built: usize },
    /// The last page of the document was built.
    BuildFinished { page_count: usize },
}

type DiagnosticCallback = Arc<Mutex<Box<dyn FnMut(PaginationDiagnostic) + Send + 'static>>>;

/// Permission to build pages for one layout generation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct BuildTicket {
    generation: u64,
}

impl BuildTicket {
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

/// Outcome of one build batch.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BuildProgress {
    /// Pages built so far in this generation.
    pub built: usize,
    /// Pages added by this batch.
    pub added: usize,
    /// `true` once the last page exists.
    pub complete: bool,
}

/// Incremental pagination state for one document.
pub struct PaginationSession<O> {
    tokens: Arc<[Token]>,
    oracle: O,
    options: SessionOptions,
    pages: Vec<Page>,
    cursor: Cursor,
    complete: bool,
    generation: u64,
    profile: LayoutProfileId,
    diagnostic_sink: Option<DiagnosticCallback>,
}

impl<O: fmt::Debug> fmt::Debug for PaginationSession<O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PaginationSession")
            .field("tokens", &self.tokens.len())
            .field("oracle", &self.oracle)
            .field("pages", &self.pages.len())
            .field("cursor", &self.cursor)
            .field("complete", &self.complete)
            .field("generation", &self.generation)
            .finish_non_exhaustive()
    }
}

impl<O: MeasurementOracle> PaginationSession<O> {
    /// Create a session. No page is built until one is requested.
    pub fn new(tokens: impl Into<Arc<[Token]>>, oracle: O) -> Self {
        Self {
            tokens: tokens.into(),
            profile: oracle.profile(),
            oracle,
            options: SessionOptions::default(),
            pages: Vec::new(),
            cursor: Cursor::START,
            complete: false,
            generation: 0,
            diagnostic_sink: None,
        }
    }

    pub fn with_options(mut self, options: SessionOptions) -> Self {
        self.options = SessionOptions {
            batch_pages: options.batch_pages.max(1),
            look_ahead: options.look_ahead,
        };
        self
    }

    /// Register or replace the diagnostics sink.
    pub fn set_diagnostic_sink<F>(&mut self, sink: F)
    where
        F: FnMut(PaginationDiagnostic) + Send + 'static,
    {
        self.diagnostic_sink = Some(Arc::new(Mutex::new(Box::new(sink))));
    }

    fn emit_diagnostic(&self, diagnostic: PaginationDiagnostic) {
        let Some(sink) = &self.diagnostic_sink else {
            return;
        };
        if let Ok(mut sink) = sink.lock() {
            sink(diagnostic);
        }
    }

    pub fn tokens(&self) -> &[Token] {
        &self.tokens
    }

    pub fn oracle(&self) -> &O {
        &self.oracle
    }

    pub fn options(&self) -> SessionOptions {
        self.options
    }

    /// Layout generation; bumped by every effective reconfiguration.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn profile(&self) -> LayoutProfileId {
        self.profile
    }

    /// `true` once the last page of the document has been built.
    pub fn is_final(&self) -> bool {
        self.complete
    }

    /// Number of pages built so far.
    pub fn built_len(&self) -> usize {
        self.pages.len()
    }

    pub fn built_pages(&self) -> &[Page] {
        &self.pages
    }

    /// Already-built page, without building.
    pub fn built_page(&self, index: usize) -> Option<&Page> {
        self.pages.get(index)
    }

    /// Page `index`, building up to it when needed.
    ///
    /// `None` when the document has fewer pages.
    pub fn page_at(&mut self, index: usize) -> Option<&Page> {
        self.ensure_built(index);
        self.pages.get(index)
    }

    /// Build until page `up_to` exists or the document ends.
    ///
    /// Returns whether page `up_to` exists.
    pub fn ensure_built(&mut self, up_to: usize) -> bool {
        while self.pages.len() <= up_to && self.build_next() {}
        self.pages.len() > up_to
    }

    /// Build every remaining page.
    pub fn build_all(&mut self) -> usize {
        while self.build_next() {}
        self.pages.len()
    }

    /// Build at most `max_pages` more pages.
    pub fn build_batch(&mut self, max_pages: usize) -> BuildProgress {
        let mut added = 0;
        while added < max_pages.max(1) && self.build_next() {
            added += 1;
        }
        self.progress(added)
    }

    /// [`Self::build_batch`] that checks `cancel` before every page.
    pub fn build_batch_with_cancel(
        &mut self,
        max_pages: usize,
        cancel: &dyn CancelToken,
    ) -> Result<BuildProgress> {
        let mut added = 0;
        while added < max_pages.max(1) && !self.complete {
            if cancel.is_cancelled() {
                self.emit_diagnostic(PaginationDiagnostic::Cancelled {
                    built: self.pages.len(),
                });
                return Err(PagerError::Cancelled);
            }
            if !self.build_next() {
                break;
            }
            added += 1;
        }
        Ok(self.progress(added))
    }

    /// Ticket bound to the current layout generation.
    pub fn ticket(&self) -> BuildTicket {
        BuildTicket {
            generation: self.generation,
        }
    }

    /// Build a batch on behalf of `ticket`.
    ///
    /// Fails with [`PagerError::StaleBuild`] once the session was
    /// reconfigured after the ticket was issued.
    pub fn build_batch_for(
        &mut self,
        ticket: BuildTicket,
        max_pages: usize,
    ) -> Result<BuildProgress> {
        if ticket.generation != self.generation {
            return Err(PagerError::StaleBuild {
                ticket: ticket.generation,
                current: self.generation,
            });
        }
        Ok(self.build_batch(max_pages))
    }

    /// Index of the page holding `cursor`, building as far as needed.
    ///
    /// Cursors past the end resolve to the last page.
    pub fn locate(&mut self, cursor: Cursor) -> Option<usize> {
        while !self.complete && self.pages.last().is_none_or(|last| last.end <= cursor) {
            if !self.build_next() {
                break;
            }
        }
        if self.pages.is_empty() {
            return None;
        }
        let index = self.pages.partition_point(|page| page.end <= cursor);
        Some(index.min(self.pages.len() - 1))
    }

    /// Swap in a new oracle.
    ///
    /// When its layout profile differs, every built page is discarded, the
    /// generation is bumped, and pages are rebuilt up to the one holding
    /// `anchor`. Returns that page's index (0 without an anchor).
    pub fn reconfigure(&mut self, oracle: O, anchor: Option<Cursor>) -> usize {
        let profile = oracle.profile();
        self.oracle = oracle;
        if profile == self.profile {
            return anchor.and_then(|cursor| self.locate(cursor)).unwrap_or(0);
        }
        self.profile = profile;
        self.rebuild(anchor)
    }

    /// Discard all pages and rebuild up to `anchor` under a new generation.
    pub fn rebuild(&mut self, anchor: Option<Cursor>) -> usize {
        self.generation += 1;
        self.pages.clear();
        self.cursor = Cursor::START;
        self.complete = false;

        let anchor_page = match anchor {
            Some(cursor) => self.locate(cursor).unwrap_or(0),
            None => {
                self.ensure_built(0);
                0
            }
        };
        log::info!(
            "rebuilt pagination: generation {}, profile {}, anchor page {anchor_page}",
            self.generation,
            self.profile.short_hex()
        );
        self.emit_diagnostic(PaginationDiagnostic::Rebuilt {
            generation: self.generation,
            anchor_page,
        });
        anchor_page
    }

    fn progress(&self, added: usize) -> BuildProgress {
        BuildProgress {
            built: self.pages.len(),
            added,
            complete: self.complete,
        }
    }

    /// Pack one more page. Returns `false` once the document is complete.
    fn build_next(&mut self) -> bool {
        if self.complete {
            return false;
        }
        let index = self.pages.len();
        let step = PagePacker::new(&self.tokens, &mut self.oracle).pack_next(self.cursor, index);
        let PackStep::Page { page, next } = step else {
            self.finish();
            return false;
        };

        match page.overflow {
            Some(Overflow::OversizedAtomic) => {
                self.emit_diagnostic(PaginationDiagnostic::OversizedAtomic {
                    page_index: index,
                    token_index: page.start.token,
                })
            }
            Some(Overflow::HardSplit) => self.emit_diagnostic(PaginationDiagnostic::HardSplit {
                page_index: index,
                token_index: page.start.token,
            }),
            None => {}
        }
        if page.is_empty() {
            self.emit_diagnostic(PaginationDiagnostic::EmptyDocument);
        }

        self.cursor = next;
        self.pages.push(page);
        if next.token >= self.tokens.len() {
            self.finish();
        }
        true
    }

    fn finish(&mut self) {
        self.complete = true;
        log::debug!("pagination complete: {} pages", self.pages.len());
        self.emit_diagnostic(PaginationDiagnostic::BuildFinished {
            page_count: self.pages.len(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::measure::{BudgetConfig, BudgetOracle};
    use crate::tokenizer::{tokenize, TokenizerOptions};

    fn long_document(paragraphs: usize) -> Vec<Token> {
        let raw = (0..paragraphs)
            .map(|i| format!("Paragraph {i} walks along the river and keeps going."))
            .collect::<Vec<_>>()
            .join("\n\n");
        tokenize(&raw, &TokenizerOptions::default())
    }

    fn session(paragraphs: usize, capacity: u32) -> PaginationSession<BudgetOracle> {
        PaginationSession::new(
            long_document(paragraphs),
            BudgetOracle::new(BudgetConfig::characters(capacity)),
        )
    }

    #[test]
    fn nothing_is_built_until_requested() {
        let mut session = session(50, 120);
        assert_eq!(session.built_len(), 0);
        assert!(session.ensure_built(0));
        assert_eq!(session.built_len(), 1);
        assert!(!session.is_final());
    }

    #[test]
    fn build_batch_is_bounded_and_reports_completion() {
        let mut session = session(10, 60);
        let first = session.build_batch(3);
        assert_eq!(first.added, 3);
        assert_eq!(first.built, 3);
        assert!(!first.complete);

        let total = session.build_all();
        assert!(session.is_final());
        assert_eq!(session.build_batch(3).added, 0);
        assert_eq!(total, session.built_len());
    }

    #[test]
    fn page_at_past_the_end_is_none_and_final() {
        let mut session = session(2, 1000);
        assert!(session.page_at(0).is_some());
        assert!(session.page_at(5).is_none());
        assert!(session.is_final());
        assert_eq!(session.built_len(), 1);
    }

    #[test]
    fn empty_document_builds_one_empty_page() {
        let mut session = PaginationSession::new(Vec::<Token>::new(), BudgetOracle::default());
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        session.set_diagnostic_sink(move |d| sink.lock().unwrap().push(d));

        assert!(session.page_at(0).unwrap().is_empty());
        assert!(session.is_final());
        assert!(!session.ensure_built(1));
        let seen = seen.lock().unwrap();
        assert!(seen.contains(&PaginationDiagnostic::EmptyDocument));
        assert!(seen.contains(&PaginationDiagnostic::BuildFinished { page_count: 1 }));
    }

    #[test]
    fn stale_ticket_is_refused_after_reconfigure() {
        let mut session = session(40, 80);
        let ticket = session.ticket();
        session.build_batch_for(ticket, 2).unwrap();

        session.reconfigure(BudgetOracle::new(BudgetConfig::characters(200)), None);
        let err = session.build_batch_for(ticket, 2).unwrap_err();
        assert!(matches!(err, PagerError::StaleBuild { ticket: 0, current: 1 }));
        assert!(session.build_batch_for(session.ticket(), 2).is_ok());
    }

    #[test]
    fn cancel_token_stops_the_batch() {
        let mut session = session(40, 80);
        let cancel = AtomicBool::new(false);
        session.build_batch_with_cancel(2, &cancel).unwrap();
        cancel.store(true, Ordering::Relaxed);
        assert!(matches!(
            session.build_batch_with_cancel(2, &cancel),
            Err(PagerError::Cancelled)
        ));
        assert_eq!(session.built_len(), 2);
        assert!(session.build_batch_with_cancel(2, &NeverCancel).is_ok());
    }

    #[test]
    fn reconfigure_with_same_profile_keeps_pages() {
        let mut session = session(20, 100);
        session.ensure_built(3);
        let anchor = session.built_page(3).unwrap().start;
        let same = BudgetOracle::new(BudgetConfig::characters(100));
        let index = session.reconfigure(same, Some(anchor));
        assert_eq!(index, 3);
        assert_eq!(session.generation(), 0);
        assert_eq!(session.built_len(), 4);
    }

    #[test]
    fn reconfigure_retargets_the_anchor() {
        let mut session = session(30, 100);
        session.ensure_built(10);
        let anchor = session.built_page(10).unwrap().start;

        let wider = BudgetOracle::new(BudgetConfig::characters(400));
        let index = session.reconfigure(wider, Some(anchor));
        assert_eq!(session.generation(), 1);
        assert!(session.built_page(index).unwrap().contains(anchor));
        assert!(index < 10);
    }

    #[test]
    fn locate_past_the_end_resolves_to_last_page() {
        let mut session = session(5, 100);
        let last = session.locate(Cursor::new(999, 0)).unwrap();
        assert!(session.is_final());
        assert_eq!(last, session.built_len() - 1);
    }

    #[test]
    fn rebuild_reproduces_identical_pages() {
        let mut session = session(25, 90);
        session.build_all();
        let before = session.built_pages().to_vec();
        session.reconfigure(BudgetOracle::new(BudgetConfig::characters(300)), None);
        session.reconfigure(BudgetOracle::new(BudgetConfig::characters(90)), None);
        session.build_all();
        assert_eq!(session.built_pages(), before.as_slice());
        assert_eq!(session.generation(), 2);
    }

    #[test]
    fn oversized_and_split_pages_are_reported() {
        let tokens = tokenize("{image-1}\n\nsupercalifragilistic", &TokenizerOptions::default());
        let mut session = PaginationSession::new(
            tokens,
            BudgetOracle::new(BudgetConfig::characters(8).with_image_weight(50)),
        );
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        session.set_diagnostic_sink(move |d| sink.lock().unwrap().push(d));
        session.build_all();

        let seen = seen.lock().unwrap();
        assert!(seen.contains(&PaginationDiagnostic::OversizedAtomic {
            page_index: 0,
            token_index: 0
        }));
        assert!(seen.contains(&PaginationDiagnostic::HardSplit {
            page_index: 1,
            token_index: 1
        }));
    }
}
