//! Per-stock collection loop with progress reporting.
//!
//! One chart source serves every stock in turn. A source status or parse
//! failure ends the current stock only; the loop moves on to the next code.

use super::paginator::{Paginator, RateLimit, Sleeper, ThreadSleeper};
use super::provider::{ChartSource, CollectProgress, DataError};

/// Outcome of a multi-stock collection.
#[derive(Debug, Default)]
pub struct CollectSummary {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// Rows reported by successful stocks.
    pub rows: usize,
    pub errors: Vec<(String, DataError)>,
}

/// Run `each` for every code with a fresh paginator over `source`.
///
/// `each` returns the number of rows it kept for the stock.
pub fn collect_stocks<S, F>(
    source: &mut S,
    limit: RateLimit,
    sleeper: Option<&dyn Sleeper>,
    codes: &[String],
    progress: &dyn CollectProgress,
    mut each: F,
) -> CollectSummary
where
    S: ChartSource + ?Sized,
    F: FnMut(&mut Paginator<'_, S>, &str) -> Result<usize, DataError>,
{
    let thread_sleeper = ThreadSleeper;
    let sleeper = sleeper.unwrap_or(&thread_sleeper);
    let mut summary = CollectSummary {
        total: codes.len(),
        ..CollectSummary::default()
    };

    for (i, code) in codes.iter().enumerate() {
        progress.on_start(code, i, summary.total);
        let result = {
            let mut pager = Paginator::with_sleeper(&mut *source, limit, sleeper);
            each(&mut pager, code)
        };
        progress.on_complete(code, i, summary.total, &result);
        match result {
            Ok(rows) => {
                summary.succeeded += 1;
                summary.rows += rows;
            }
            Err(e) => {
                summary.failed += 1;
                summary.errors.push((code.clone(), e));
            }
        }
    }

    progress.on_batch_complete(summary.succeeded, summary.failed, summary.total);
    summary
}
