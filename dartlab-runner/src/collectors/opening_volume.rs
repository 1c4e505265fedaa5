//! Opening-volume ranking and the morning-window dump built from it.
//!
//! 1. For every listed stock, the volume of the opening bar on each date
//!    since the start date
//! 2. Per date, the top-K stocks by that volume
//! 3. Inverted to stock → ranked dates, then each stock's minute bars inside
//!    the morning window on exactly those dates
//!
//! Outputs: the window dump with its keys file, plus the rank map as JSON.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Instant;

use dartlab_core::data::{
    collect_stocks, ChartField, ChartQuery, ChartSource, ColumnarDump, StockDirectory,
};
use dartlab_core::domain::PivotSet;
use dartlab_core::matcher::{collect_bars, walk, RowFilter};
use dartlab_core::ranking::{VolumeRankMap, VolumeRanker, VolumeSeries};

use crate::config::OpeningVolumeConfig;
use crate::runner::{CollectContext, RunError};
use crate::stats::CollectionStats;

#[derive(Debug)]
pub struct OpeningVolumeRun {
    pub ranks: VolumeRankMap,
    pub rank_path: PathBuf,
    pub dump: ColumnarDump,
    /// Codes written to the window dump.
    pub codes: Vec<String>,
    /// Volume pass and window pass, in that order.
    pub volume_stats: CollectionStats,
    pub window_stats: CollectionStats,
}

pub fn collect_opening_volume<S, D>(
    source: &mut S,
    directory: &D,
    config: &OpeningVolumeConfig,
    root: &Path,
    ctx: CollectContext<'_>,
) -> Result<OpeningVolumeRun, RunError>
where
    S: ChartSource + ?Sized,
    D: StockDirectory + ?Sized,
{
    let codes = directory.listed_codes();
    tracing::info!(stocks = codes.len(), since = config.start_date, top_k = config.top_k, "opening volume pass");

    let (series, volume_stats) = opening_volumes(source, &codes, config, ctx);
    let ranks = VolumeRanker::new(config.top_k).rank(&series);
    let rank_path = root.join(format!("{}_rank.json", config.name));
    ranks.save(&rank_path)?;
    tracing::info!(
        stocks = series.stock_count(),
        dates = ranks.len(),
        path = %rank_path.display(),
        "rank map saved"
    );

    let targets = ranks.invert();
    let (dump, written, window_stats) = dump_window(source, &targets, config, root, ctx)?;

    Ok(OpeningVolumeRun {
        ranks,
        rank_path,
        dump,
        codes: written,
        volume_stats,
        window_stats,
    })
}

/// Opening-bar volume per stock per date.
fn opening_volumes<S>(
    source: &mut S,
    codes: &[String],
    config: &OpeningVolumeConfig,
    ctx: CollectContext<'_>,
) -> (VolumeSeries, CollectionStats)
where
    S: ChartSource + ?Sized,
{
    let started = Instant::now();
    let minute = config.opening_minute;
    let filter = RowFilter::since(config.start_date).with_times(minute..minute + 1);
    let mut series = VolumeSeries::new();
    let mut stats = CollectionStats::new();

    let summary = collect_stocks(source, ctx.limit, ctx.sleeper, codes, ctx.progress, |pager, code| {
        let query = ChartQuery::opening_volume(code);
        let (Some(date_col), Some(volume_col)) =
            (query.column(ChartField::DATE), query.column(ChartField::VOLUME))
        else {
            return Ok(0);
        };
        let outcome = walk(pager, &query, &filter, |row| {
            let volume = row.value(volume_col)?;
            Some((row.int(date_col)?, volume.max(0.0) as u64))
        })?;
        stats.add_pages(outcome.stats);
        if outcome.items.is_empty() {
            stats.empty += 1;
        }
        let kept = outcome.items.len();
        series.insert_series(code, outcome.items);
        Ok(kept)
    });
    stats.absorb(&summary);
    stats.elapsed = started.elapsed();
    stats.log_summary("opening_volume");
    (series, stats)
}

/// Minute bars inside the window on each stock's ranked dates.
fn dump_window<S>(
    source: &mut S,
    targets: &BTreeMap<String, PivotSet>,
    config: &OpeningVolumeConfig,
    root: &Path,
    ctx: CollectContext<'_>,
) -> Result<(ColumnarDump, Vec<String>, CollectionStats), RunError>
where
    S: ChartSource + ?Sized,
{
    let started = Instant::now();
    let dump = ColumnarDump::new(root, &config.name);
    let codes: Vec<String> = targets.keys().cloned().collect();
    let mut stats = CollectionStats::new();
    let mut written = Vec::new();

    let summary = collect_stocks(source, ctx.limit, ctx.sleeper, &codes, ctx.progress, |pager, code| {
        let Some(pivots) = targets.get(code) else {
            return Ok(0);
        };
        let filter = RowFilter::pivots(pivots).with_times(config.window_start..config.window_end);
        let outcome = collect_bars(pager, &ChartQuery::minute_bars(code), &filter)?;
        stats.add_pages(outcome.stats);
        if outcome.items.is_empty() {
            stats.empty += 1;
            return Ok(0);
        }
        dump.write_stock(code, &outcome.items)?;
        written.push(code.to_string());
        Ok(outcome.items.len())
    });
    stats.absorb(&summary);

    dump.write_keys(&written)?;
    stats.elapsed = started.elapsed();
    stats.log_summary("opening_window");
    Ok((dump, written, stats))
}
