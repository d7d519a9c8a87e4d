//! Batch-then-yield building on a single-threaded cooperative scheduler.
//!
//! The session (or the navigator owning it) lives in a `RefCell` shared with
//! the UI side. Each batch borrows it mutably and releases the borrow before
//! yielding, so a resize handler can reconfigure the session between batches.
//! The build holds a [`BuildTicket`]; after a reconfiguration the ticket is
//! stale and the build stops with [`PagerError::StaleBuild`] instead of
//! writing into the new generation.

use std::cell::{RefCell, RefMut};

use crate::error::{PagerError, Result};
use crate::measure::MeasurementOracle;
use crate::navigator::Navigator;
use crate::session::{BuildProgress, BuildTicket, PaginationSession};

/// Build the whole document for `ticket`, yielding after every batch.
pub async fn build_cooperatively<O: MeasurementOracle>(
    session: &RefCell<PaginationSession<O>>,
    ticket: BuildTicket,
) -> Result<BuildProgress> {
    build_until(|| session.borrow_mut(), ticket, |_| false).await
}

/// Build until page `up_to` exists (or the document ends) for `ticket`.
pub async fn build_cooperatively_to<O: MeasurementOracle>(
    session: &RefCell<PaginationSession<O>>,
    ticket: BuildTicket,
    up_to: usize,
) -> Result<BuildProgress> {
    build_until(|| session.borrow_mut(), ticket, |progress| progress.built > up_to).await
}

/// Build the rest of the document behind a navigator the reader is driving.
///
/// Page turns and [`Navigator::resize`] may run between batches; a resize
/// makes `ticket` stale and ends the build.
pub async fn build_ahead<O: MeasurementOracle>(
    navigator: &RefCell<Navigator<O>>,
    ticket: BuildTicket,
) -> Result<BuildProgress> {
    build_until(
        || RefMut::map(navigator.borrow_mut(), Navigator::session_mut),
        ticket,
        |_| false,
    )
    .await
}

async fn build_until<'a, O, B, F>(borrow: B, ticket: BuildTicket, done: F) -> Result<BuildProgress>
where
    O: MeasurementOracle + 'a,
    B: Fn() -> RefMut<'a, PaginationSession<O>>,
    F: Fn(&BuildProgress) -> bool,
{
    let mut total_added = 0;
    loop {
        let progress = {
            let mut session = borrow();
            let batch = session.options().batch_pages;
            match session.build_batch_for(ticket, batch) {
                Ok(progress) => progress,
                Err(err) => {
                    if let PagerError::StaleBuild { ticket: stale, current } = &err {
                        log::debug!("build for generation {stale} superseded by {current}");
                    }
                    return Err(err);
                }
            }
        };
        total_added += progress.added;
        if progress.complete || done(&progress) {
            return Ok(BuildProgress {
                added: total_added,
                ..progress
            });
        }
        tokio::task::yield_now().await;
    }
}
