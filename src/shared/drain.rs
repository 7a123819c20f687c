//! Paged drain helper.
//!
//! Background cascades (user purge, invitation GC) repeatedly fetch a page of
//! rows that still match their filter and remove each one. Because the
//! filters are existence or time based, no cursor is kept: a page shorter
//! than the page size is the only termination signal, and a run interrupted
//! at any point can simply be started again from scratch.

use std::future::Future;

use tokio_util::sync::CancellationToken;

/// How a drain run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrainOutcome {
    /// A short page was seen; nothing is left to process.
    Exhausted { processed: usize },
    /// The cancellation token fired before the drain finished.
    Cancelled { processed: usize },
}

impl DrainOutcome {
    pub fn processed(&self) -> usize {
        match *self {
            DrainOutcome::Exhausted { processed } | DrainOutcome::Cancelled { processed } => {
                processed
            }
        }
    }
}

/// Fetch pages of `page_size` items with `fetch` and hand every item to
/// `process` until a page comes back shorter than `page_size`.
///
/// `process` must remove the item from whatever `fetch` reads, otherwise the
/// drain never terminates. The first error from either closure aborts the
/// run. Cancellation is checked before every fetch and every item.
pub async fn drain_pages<T, E, F, FFut, P, PFut>(
    cancel: &CancellationToken,
    page_size: usize,
    mut fetch: F,
    mut process: P,
) -> Result<DrainOutcome, E>
where
    F: FnMut(usize) -> FFut,
    FFut: Future<Output = Result<Vec<T>, E>>,
    P: FnMut(T) -> PFut,
    PFut: Future<Output = Result<(), E>>,
{
    let mut processed = 0;

    loop {
        if cancel.is_cancelled() {
            return Ok(DrainOutcome::Cancelled { processed });
        }

        let page = fetch(page_size).await?;
        let short = page.len() < page_size;

        for item in page {
            if cancel.is_cancelled() {
                return Ok(DrainOutcome::Cancelled { processed });
            }
            process(item).await?;
            processed += 1;
        }

        if short {
            return Ok(DrainOutcome::Exhausted { processed });
        }
    }
}
