//! Named-field series for a single stock.
//!
//! The field map picks feed columns and names them in the output. The date
//! column is always requested (the walk needs it for the floor and for
//! dedup), and so is the time column for minute pulls; neither is written
//! unless the map names it.

use std::path::Path;
use std::time::Instant;

use dartlab_core::data::{
    ChartField, ChartQuery, ChartRow, ChartSource, ColumnarDump, Granularity, Paginator,
    SeriesColumns, ThreadSleeper,
};
use dartlab_core::matcher::{walk, RowFilter};

use crate::config::SeriesConfig;
use crate::runner::{CollectContext, RunError};
use crate::stats::CollectionStats;

#[derive(Debug)]
pub struct SeriesRun {
    pub dump: ColumnarDump,
    pub code: String,
    pub columns: SeriesColumns,
    pub stats: CollectionStats,
}

/// Pull the configured fields for one stock, up to the row budget, and
/// write them as named columns in chronological order.
pub fn collect_series<S>(
    source: &mut S,
    config: &SeriesConfig,
    root: &Path,
    ctx: CollectContext<'_>,
) -> Result<SeriesRun, RunError>
where
    S: ChartSource + ?Sized,
{
    let started = Instant::now();
    let field_map = config.field_map()?;

    let mut fields: Vec<ChartField> = field_map.iter().map(|(f, _)| *f).collect();
    fields.push(ChartField::DATE);
    if config.granularity == Granularity::Minute {
        fields.push(ChartField::TIME);
    }
    let query = ChartQuery::new(&config.code, config.granularity, &fields).with_max_rows(config.max_rows);
    let filter = config.since.map(RowFilter::since).unwrap_or_else(RowFilter::all);

    let thread_sleeper = ThreadSleeper;
    let sleeper = ctx.sleeper.unwrap_or(&thread_sleeper);
    let mut stats = CollectionStats::new();
    stats.total = 1;
    ctx.progress.on_start(&query.code, 0, 1);

    let outcome = {
        let mut pager = Paginator::with_sleeper(&mut *source, ctx.limit, sleeper);
        walk(&mut pager, &query, &filter, |row: &ChartRow| Some(row.clone()))
    };
    let mut rows = match outcome {
        Ok(outcome) => {
            stats.add_pages(outcome.stats);
            outcome.items
        }
        Err(e) => {
            tracing::warn!(code = %query.code, error = %e, "series pull failed");
            ctx.progress.on_batch_complete(0, 1, 1);
            return Err(e.into());
        }
    };
    rows.truncate(config.max_rows as usize);
    rows.reverse();

    let mut columns = SeriesColumns::new();
    for (field, name) in &field_map {
        let col = query.column(*field);
        let values = rows
            .iter()
            .map(|row| col.and_then(|c| row.value(c)).unwrap_or(f64::NAN))
            .collect();
        columns.push(name, values)?;
    }

    let dump = ColumnarDump::new(root, &config.name);
    let key = query.code.clone();
    if rows.is_empty() {
        stats.empty = 1;
        tracing::warn!(code = %key, "series pull returned no rows, nothing written");
    } else {
        dump.write_series(&key, &columns)?;
        dump.write_keys(std::slice::from_ref(&key))?;
    }
    stats.success = 1;
    stats.rows = rows.len();
    ctx.progress.on_complete(&key, 0, 1, &Ok(rows.len()));
    ctx.progress.on_batch_complete(1, 0, 1);

    stats.elapsed = started.elapsed();
    stats.log_summary("series");
    Ok(SeriesRun {
        dump,
        code: key,
        columns,
        stats,
    })
}
