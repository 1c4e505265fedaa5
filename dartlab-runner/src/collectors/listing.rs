//! DART daily filing list → disclosure TSV.

use std::path::{Path, PathBuf};
use std::time::Instant;

use chrono::NaiveDate;
use dartlab_core::dart::{ListingFetch, ListingOutcome, ListingParser, ListingWalker};
use dartlab_core::data::write_disclosures;

use crate::config::ListingConfig;
use crate::runner::RunError;

#[derive(Debug)]
pub struct ListingRun {
    pub outcome: ListingOutcome,
    pub from: NaiveDate,
    pub output: PathBuf,
}

/// Walk `config.days` back from `config.from` (or `today`) and write every
/// filing found, newest day first.
pub fn collect_listing<F, P>(
    walker: &mut ListingWalker<F, P>,
    config: &ListingConfig,
    today: NaiveDate,
    output: &Path,
) -> Result<ListingRun, RunError>
where
    F: ListingFetch,
    P: ListingParser,
{
    let started = Instant::now();
    let from = config.from.unwrap_or(today);
    tracing::info!(from = %from, days = config.days, "listing walk started");

    let outcome = walker.walk(from, config.days)?;
    write_disclosures(output, &outcome.events)?;

    tracing::info!(
        filings = outcome.events.len(),
        skipped = outcome.skipped_rows,
        elapsed_ms = started.elapsed().as_millis() as u64,
        path = %output.display(),
        "listing written"
    );
    Ok(ListingRun {
        outcome,
        from,
        output: output.to_path_buf(),
    })
}
