//! Full minute history for every listed stock.

use std::path::Path;
use std::time::Instant;

use dartlab_core::data::{collect_stocks, ChartQuery, ChartSource, ColumnarDump, StockDirectory};
use dartlab_core::matcher::{collect_bars, RowFilter};

use crate::config::MinuteDumpConfig;
use crate::runner::{CollectContext, RunError};
use crate::stats::CollectionStats;

/// Result of a dump run.
#[derive(Debug)]
pub struct DumpRun {
    pub dump: ColumnarDump,
    /// Codes with at least one bar written, in collection order.
    pub codes: Vec<String>,
    pub stats: CollectionStats,
}

/// Pull minute bars down to the floor date for every KOSPI and KOSDAQ
/// stock and dump them in chronological order.
///
/// The keys file lists only the stocks that were written.
pub fn dump_minutes<S, D>(
    source: &mut S,
    directory: &D,
    config: &MinuteDumpConfig,
    root: &Path,
    ctx: CollectContext<'_>,
) -> Result<DumpRun, RunError>
where
    S: ChartSource + ?Sized,
    D: StockDirectory + ?Sized,
{
    let started = Instant::now();
    let dump = ColumnarDump::new(root, &config.name);
    let codes = directory.listed_codes();
    tracing::info!(stocks = codes.len(), floor = config.floor_date, dump = %config.name, "minute dump started");

    let filter = RowFilter::since(config.floor_date);
    let mut stats = CollectionStats::new();
    let mut written = Vec::new();

    let summary = collect_stocks(source, ctx.limit, ctx.sleeper, &codes, ctx.progress, |pager, code| {
        let query = ChartQuery::minute_bars(code);
        let outcome = collect_bars(pager, &query, &filter)?;
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
    stats.log_summary("minute_dump");
    Ok(DumpRun {
        dump,
        codes: written,
        stats,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use dartlab_core::data::{
        ChartField, ChartRow, Granularity, Market, RateLimit, ReplaySource, Sleeper, StockMeta,
        Universe,
    };
    use std::time::Duration;

    struct NoSleep;
    impl Sleeper for NoSleep {
        fn sleep(&self, _: Duration) {}
    }

    fn universe(codes: &[(&str, Market)]) -> Universe {
        let mut u = Universe::default();
        for (code, market) in codes {
            u.insert(
                code,
                StockMeta {
                    name: code.to_string(),
                    lot_size: 1,
                    market: *market,
                    section_kind: 1,
                    listed_date: 0,
                },
            );
        }
        u
    }

    fn bars(dates: &[u32]) -> Vec<ChartRow> {
        let mut rows = Vec::new();
        for &d in dates {
            for m in [1002.0, 1001.0, 1000.0] {
                rows.push(ChartRow(vec![d as f64, m, 10.0, 11.0, 9.0, 10.5, 100.0]));
            }
        }
        rows
    }

    #[test]
    fn dumps_listed_stocks_down_to_the_floor() {
        let dir = tempfile::tempdir().unwrap();
        let u = universe(&[
            ("A000001", Market::Kospi),
            ("A000002", Market::Kosdaq),
            ("A000003", Market::Kospi),
        ]);
        let mut src = ReplaySource::new(4);
        src.insert_rows("A000001", Granularity::Minute, &ChartField::MINUTE_BAR, bars(&[20190305, 20190304, 20190301]));
        src.insert_rows("A000002", Granularity::Minute, &ChartField::MINUTE_BAR, bars(&[20190305]));
        // A000003 has only older bars: nothing to keep.
        src.insert_rows("A000003", Granularity::Minute, &ChartField::MINUTE_BAR, bars(&[20190228]));

        let config = MinuteDumpConfig {
            floor_date: 20190304,
            name: "minute_data".into(),
        };
        let ctx = CollectContext::live(RateLimit::default()).with_sleeper(&NoSleep);
        let run = dump_minutes(&mut src, &u, &config, dir.path(), ctx).unwrap();

        // KOSPI codes come first.
        assert_eq!(run.codes, vec!["A000001", "A000002"]);
        assert_eq!(run.stats.total, 3);
        assert_eq!(run.stats.empty, 1);
        assert_eq!(run.stats.rows, 9);

        let cols = run.dump.read_stock("A000001").unwrap();
        assert_eq!(cols.len(), 6);
        assert_eq!(cols.dates.first(), Some(&20190304));
        assert_eq!(cols.minutes[..3], [1000, 1001, 1002]);
        assert_eq!(run.dump.read_keys().unwrap(), run.codes);
    }
}
