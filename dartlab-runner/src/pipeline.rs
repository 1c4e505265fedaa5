//! Disclosure → price annotation pipeline.
//!
//! `LOAD → FILTER → RESOLVE → FETCH → ANNOTATE → PERSIST`:
//! 1. Load every category's disclosure file (malformed rows skipped)
//! 2. Keep rows matching the category's title filter and the trading-hours rule
//! 3. Resolve company ids to stock codes through the cache; drop failures
//! 4. Per stock, pull minute bars and day snapshots for the union of pivots
//! 5. Attach the bars inside the match window, merged with the day snapshot
//! 6. Write category → rows as JSON
//!
//! Every loaded row is persisted; only eligible, resolved rows carry a stock
//! code, and only those with bars in the window carry prices. Nothing is
//! resumable: a crash loses everything but the code cache.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::time::Instant;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use dartlab_core::data::{
    collect_stocks, read_disclosures, ChartSource, CodeLookup, DataError, StockCodeCache,
};
use dartlab_core::domain::{DaySnapshot, DisclosureRow, MatchedPrice, PivotSet, PriceBar};
use dartlab_core::matcher::{
    match_day_snapshots, match_pivot_bars, Eligibility, TimeWindowMatcher, TradingHours,
};

use crate::config::{CategoryConfig, PipelineConfig};
use crate::runner::{write_json, CollectContext, RunError};
use crate::stats::CollectionStats;

/// A disclosure row as persisted by the pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnnotatedDisclosure {
    #[serde(flatten)]
    pub row: DisclosureRow,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub stock_code: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub prices: Vec<MatchedPrice>,
}

impl AnnotatedDisclosure {
    fn new(row: DisclosureRow) -> Self {
        Self {
            row,
            stock_code: None,
            prices: Vec::new(),
        }
    }
}

/// Rows loaded for one category, before any filtering.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CategoryRows {
    pub name: String,
    /// Keep only titles containing this text.
    pub title_contains: Option<String>,
    pub rows: Vec<DisclosureRow>,
    /// Rows the loader could not parse.
    pub skipped: usize,
}

/// Per-category counts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CategoryReport {
    pub name: String,
    pub loaded: usize,
    pub skipped: usize,
    pub title_mismatch: usize,
    pub outside_hours: usize,
    pub too_old: usize,
    pub unresolved: usize,
    /// Rows handed to the fetch stage.
    pub queued: usize,
    /// Rows that ended up with at least one price.
    pub matched: usize,
}

/// What a pipeline run produced.
#[derive(Debug, Default)]
pub struct PipelineOutcome {
    pub categories: BTreeMap<String, Vec<AnnotatedDisclosure>>,
    pub reports: Vec<CategoryReport>,
    /// Broker-side counters: one attempt per stock.
    pub stats: CollectionStats,
    /// Stocks whose pull failed, with the reason.
    pub failed_stocks: Vec<(String, String)>,
    pub output: Option<PathBuf>,
}

/// Bars and snapshots pulled for one stock, keyed by pivot date.
#[derive(Debug, Default)]
struct StockPrices {
    bars: BTreeMap<u32, Vec<PriceBar>>,
    days: BTreeMap<u32, DaySnapshot>,
}

/// The disclosure → price pipeline over one configuration.
pub struct CollectionPipeline<'c> {
    config: &'c PipelineConfig,
    now: NaiveDateTime,
    matcher: TimeWindowMatcher,
}

impl<'c> CollectionPipeline<'c> {
    pub fn new(config: &'c PipelineConfig) -> Self {
        Self {
            config,
            now: chrono::Local::now().naive_local(),
            matcher: TimeWindowMatcher::new(chrono::Duration::minutes(config.window_minutes)),
        }
    }

    /// Reference time for the age rule.
    pub fn with_now(mut self, now: NaiveDateTime) -> Self {
        self.now = now;
        self
    }

    fn hours(&self) -> &TradingHours {
        &self.config.trading_hours
    }

    /// LOAD: read each configured category, or every file in the
    /// disclosure directory when none are configured.
    pub fn load(&self) -> Result<Vec<CategoryRows>, RunError> {
        let dir = &self.config.disclosure_dir;
        let categories: Vec<CategoryConfig> = if self.config.categories.is_empty() {
            let mut names: Vec<String> = std::fs::read_dir(dir)
                .map_err(DataError::Io)?
                .filter_map(|entry| entry.ok())
                .filter(|entry| entry.path().is_file())
                .filter_map(|entry| entry.file_name().into_string().ok())
                .filter(|name| !name.starts_with('.'))
                .collect();
            names.sort();
            names
                .into_iter()
                .map(|name| CategoryConfig {
                    name,
                    file: None,
                    title_contains: None,
                })
                .collect()
        } else {
            self.config.categories.clone()
        };
        if categories.is_empty() {
            return Err(RunError::NoDisclosures(dir.clone()));
        }

        let mut loaded = Vec::with_capacity(categories.len());
        for category in categories {
            let file = read_disclosures(&dir.join(category.file_name()))?;
            tracing::info!(
                category = %category.name,
                rows = file.rows.len(),
                skipped = file.skipped,
                "category loaded"
            );
            loaded.push(CategoryRows {
                name: category.name,
                title_contains: category.title_contains,
                rows: file.rows,
                skipped: file.skipped,
            });
        }
        Ok(loaded)
    }

    /// Run every stage and write the result to `output` when given.
    pub fn run<S, L>(
        &self,
        source: &mut S,
        cache: &mut StockCodeCache<L>,
        ctx: CollectContext<'_>,
        output: Option<&Path>,
    ) -> Result<PipelineOutcome, RunError>
    where
        S: ChartSource + ?Sized,
        L: CodeLookup,
    {
        let categories = self.load()?;
        let mut outcome = self.process(categories, source, cache, ctx)?;
        if let Some(path) = output {
            write_json(path, &outcome.categories, "annotated disclosures")?;
            outcome.output = Some(path.to_path_buf());
        }
        Ok(outcome)
    }

    /// FILTER through ANNOTATE over already loaded categories.
    pub fn process<S, L>(
        &self,
        categories: Vec<CategoryRows>,
        source: &mut S,
        cache: &mut StockCodeCache<L>,
        ctx: CollectContext<'_>,
    ) -> Result<PipelineOutcome, RunError>
    where
        S: ChartSource + ?Sized,
        L: CodeLookup,
    {
        let started = Instant::now();
        let mut outcome = PipelineOutcome::default();

        // FILTER + RESOLVE. `queue` holds (category, row index, stock code).
        let mut annotated: Vec<(String, Vec<AnnotatedDisclosure>)> = Vec::new();
        let mut queue: Vec<(usize, usize, String)> = Vec::new();
        let mut pivots: BTreeMap<String, PivotSet> = BTreeMap::new();

        for (ci, category) in categories.into_iter().enumerate() {
            let mut report = CategoryReport {
                name: category.name.clone(),
                loaded: category.rows.len(),
                skipped: category.skipped,
                ..CategoryReport::default()
            };
            let mut rows = Vec::with_capacity(category.rows.len());

            for (ri, row) in category.rows.into_iter().enumerate() {
                let keep = self.admit(&row, category.title_contains.as_deref(), &mut report);
                let mut entry = AnnotatedDisclosure::new(row);
                if keep {
                    match cache.get(&entry.row.company_id) {
                        Some(code) => {
                            if let Some(event) = entry.row.to_event() {
                                pivots.entry(code.clone()).or_default().insert(event.pivot());
                            }
                            queue.push((ci, ri, code.clone()));
                            entry.stock_code = Some(code);
                            report.queued += 1;
                        }
                        None => report.unresolved += 1,
                    }
                }
                rows.push(entry);
            }

            tracing::info!(
                category = %report.name,
                queued = report.queued,
                unresolved = report.unresolved,
                outside_hours = report.outside_hours,
                too_old = report.too_old,
                "category filtered"
            );
            annotated.push((category.name, rows));
            outcome.reports.push(report);
        }

        // FETCH
        let codes: Vec<String> = pivots.keys().cloned().collect();
        let mut fetched: HashMap<String, StockPrices> = HashMap::new();
        let mut stats = CollectionStats::new();
        let summary = collect_stocks(
            source,
            ctx.limit,
            ctx.sleeper,
            &codes,
            ctx.progress,
            |pager, code| {
                let Some(stock_pivots) = pivots.get(code) else {
                    return Ok(0);
                };
                // Each walk restarts the pager's counters.
                let bars = match_pivot_bars(pager, code, stock_pivots)?;
                stats.add_pages(pager.stats());
                let days = match_day_snapshots(pager, code, stock_pivots)?;
                stats.add_pages(pager.stats());

                let rows = bars.values().map(Vec::len).sum::<usize>();
                if rows == 0 {
                    stats.empty += 1;
                }
                fetched.insert(code.to_string(), StockPrices { bars, days });
                Ok(rows)
            },
        );
        stats.absorb(&summary);
        outcome.failed_stocks = summary
            .errors
            .iter()
            .map(|(code, e)| (code.clone(), e.to_string()))
            .collect();

        // ANNOTATE
        for (ci, ri, code) in queue {
            let Some(prices) = fetched.get(&code) else {
                continue;
            };
            let entry = &mut annotated[ci].1[ri];
            let Some(event) = entry.row.to_event() else {
                continue;
            };
            let pivot = event.pivot();
            let bars = prices.bars.get(&pivot).map(Vec::as_slice).unwrap_or(&[]);
            entry.prices = self
                .matcher
                .matched_prices(event.disclosed_at, bars, prices.days.get(&pivot));
            if !entry.prices.is_empty() {
                outcome.reports[ci].matched += 1;
            }
        }

        for report in &outcome.reports {
            tracing::info!(category = %report.name, matched = report.matched, "category annotated");
        }
        stats.elapsed = started.elapsed();
        stats.log_summary("pipeline");
        outcome.stats = stats;
        outcome.categories = annotated.into_iter().collect();
        Ok(outcome)
    }

    /// Title and trading-hours predicates, counting rejections.
    fn admit(&self, row: &DisclosureRow, title_contains: Option<&str>, report: &mut CategoryReport) -> bool {
        if let Some(needle) = title_contains {
            if !row.title.contains(needle) {
                report.title_mismatch += 1;
                return false;
            }
        }
        let Some(event) = row.to_event() else {
            report.outside_hours += 1;
            return false;
        };
        match self.hours().classify(event.disclosed_at, self.now) {
            Eligibility::Eligible => true,
            Eligibility::OutsideHours => {
                report.outside_hours += 1;
                false
            }
            Eligibility::TooOld => {
                report.too_old += 1;
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dartlab_core::data::{
        ChartField, ChartRow, Granularity, RateLimit, ReplaySource, Sleeper,
    };
    use dartlab_core::domain::DisclosureEvent;
    use std::time::Duration;

    struct NoSleep;
    impl Sleeper for NoSleep {
        fn sleep(&self, _: Duration) {}
    }

    fn row(company_id: &str, title: &str, day: u32, hour: u32, minute: u32) -> DisclosureRow {
        DisclosureEvent {
            title: title.into(),
            href: format!("/dsaf001/main.do?rcpNo=201903{day:02}{hour:02}{minute:02}"),
            company: company_id.into(),
            company_id: company_id.into(),
            disclosed_at: chrono::NaiveDate::from_ymd_opt(2019, 3, day)
                .unwrap()
                .and_hms_opt(hour, minute, 0)
                .unwrap(),
        }
        .to_row()
    }

    fn minute_rows(date: u32, from: u32, count: u32) -> Vec<ChartRow> {
        (0..count)
            .rev()
            .map(|i| {
                let m = from + i;
                ChartRow(vec![date as f64, m as f64, 100.0, 101.0, 99.0, 100.5, (10 * i) as f64])
            })
            .collect()
    }

    fn source() -> ReplaySource {
        paged_source(50)
    }

    fn paged_source(page_size: usize) -> ReplaySource {
        let mut src = ReplaySource::new(page_size);
        let mut minutes = minute_rows(20190305, 1000, 20);
        minutes.extend(minute_rows(20190304, 1000, 20));
        src.insert_rows("A005930", Granularity::Minute, &ChartField::MINUTE_BAR, minutes);
        src.insert_rows(
            "A005930",
            Granularity::Day,
            &ChartField::DAY_SNAPSHOT,
            vec![
                ChartRow(vec![20190305.0, 5_969_782_550.0, 264_000.0, 56.8, 0.2, 120.0]),
                ChartRow(vec![20190304.0, 5_969_782_550.0, 262_000.0, 56.7, 0.3, 110.0]),
            ],
        );
        src
    }

    fn now() -> NaiveDateTime {
        chrono::NaiveDate::from_ymd_opt(2019, 6, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap()
    }

    fn lookup(id: &str) -> Option<String> {
        match id {
            "00126380" => Some("005930".to_string()),
            _ => None,
        }
    }

    #[test]
    fn annotates_rows_inside_the_window() {
        let config = PipelineConfig::default();
        let pipeline = CollectionPipeline::new(&config).with_now(now());
        let categories = vec![CategoryRows {
            name: "supply".into(),
            title_contains: None,
            rows: vec![
                row("00126380", "Supply contract", 5, 10, 3),
                row("00126380", "Evening notice", 5, 17, 0),
                row("99999999", "Unlisted filer", 5, 10, 0),
            ],
            skipped: 1,
        }];
        let mut src = source();
        let mut cache = StockCodeCache::in_memory(lookup);
        let ctx = CollectContext::live(RateLimit::default()).with_sleeper(&NoSleep);

        let outcome = pipeline.process(categories, &mut src, &mut cache, ctx).unwrap();

        let rows = &outcome.categories["supply"];
        assert_eq!(rows.len(), 3, "every loaded row is kept");
        // 10:03 + 7 minutes → bars 10:03..=10:10.
        assert_eq!(rows[0].stock_code.as_deref(), Some("005930"));
        assert_eq!(rows[0].prices.len(), 8);
        assert!(rows[0].prices.iter().all(|p| p.bar.date == 20190305));
        assert_eq!(rows[0].prices[0].market_cap, Some(264_000.0));
        assert!(rows[1].stock_code.is_none() && rows[1].prices.is_empty());
        assert!(rows[2].stock_code.is_none());

        let report = &outcome.reports[0];
        assert_eq!(report.loaded, 3);
        assert_eq!(report.skipped, 1);
        assert_eq!(report.outside_hours, 1);
        assert_eq!(report.unresolved, 1);
        assert_eq!(report.queued, 1);
        assert_eq!(report.matched, 1);
        assert_eq!(outcome.stats.success, 1);
        // The evening row never reached the lookup.
        assert_eq!(cache.lookups(), 2);
    }

    #[test]
    fn one_pull_per_stock_for_many_rows() {
        let config = PipelineConfig::default();
        let pipeline = CollectionPipeline::new(&config).with_now(now());
        let categories = vec![
            CategoryRows {
                name: "a".into(),
                rows: vec![row("00126380", "x", 5, 10, 0), row("00126380", "y", 4, 10, 15)],
                ..CategoryRows::default()
            },
            CategoryRows {
                name: "b".into(),
                rows: vec![row("00126380", "z", 4, 10, 1)],
                ..CategoryRows::default()
            },
        ];
        let mut src = source();
        let mut cache = StockCodeCache::in_memory(lookup);
        let ctx = CollectContext::live(RateLimit::default()).with_sleeper(&NoSleep);

        let outcome = pipeline.process(categories, &mut src, &mut cache, ctx).unwrap();

        assert_eq!(outcome.stats.total, 1);
        assert_eq!(cache.lookups(), 1);
        assert_eq!(outcome.categories["a"][1].prices.len(), 5, "10:15..=10:19 only");
        let z = &outcome.categories["b"][0].prices;
        assert_eq!(z.len(), 8);
        assert_eq!(z.iter().map(|p| p.bar.minute).min(), Some(1001));
        assert_eq!(outcome.reports[1].matched, 1);
    }

    #[test]
    fn page_counts_cover_both_walks() {
        let config = PipelineConfig::default();
        let pipeline = CollectionPipeline::new(&config).with_now(now());
        let categories = vec![CategoryRows {
            name: "supply".into(),
            rows: vec![row("00126380", "Supply contract", 4, 10, 3)],
            ..CategoryRows::default()
        }];
        let mut src = paged_source(5);
        let mut cache = StockCodeCache::in_memory(lookup);
        let ctx = CollectContext::live(RateLimit::default()).with_sleeper(&NoSleep);

        let outcome = pipeline.process(categories, &mut src, &mut cache, ctx).unwrap();

        // Eight minute pages down to 2019-03-04, one day page.
        assert_eq!(src.served().len(), 9);
        assert_eq!(outcome.stats.pages, src.served().len());
    }

    #[test]
    fn title_filter_and_age_rule() {
        let config = PipelineConfig::default();
        let far_future = chrono::NaiveDate::from_ymd_opt(2030, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        let pipeline = CollectionPipeline::new(&config).with_now(far_future);
        let categories = vec![CategoryRows {
            name: "treasury".into(),
            title_contains: Some("Treasury".into()),
            rows: vec![row("00126380", "Supply", 5, 10, 0), row("00126380", "Treasury stock", 5, 10, 0)],
            ..CategoryRows::default()
        }];
        let mut src = source();
        let mut cache = StockCodeCache::in_memory(lookup);
        let ctx = CollectContext::live(RateLimit::default()).with_sleeper(&NoSleep);

        let outcome = pipeline.process(categories, &mut src, &mut cache, ctx).unwrap();
        let report = &outcome.reports[0];
        assert_eq!(report.title_mismatch, 1);
        assert_eq!(report.too_old, 1);
        assert_eq!(report.queued, 0);
        assert_eq!(outcome.stats.total, 0);
        assert!(src.served().is_empty());
    }

    #[test]
    fn failed_stock_keeps_code_without_prices() {
        let config = PipelineConfig::default();
        let pipeline = CollectionPipeline::new(&config).with_now(now());
        let categories = vec![CategoryRows {
            name: "supply".into(),
            rows: vec![row("00126380", "Supply contract", 5, 10, 3)],
            ..CategoryRows::default()
        }];
        let mut src = source().fail_on_page(1, 4, "request limit");
        let mut cache = StockCodeCache::in_memory(lookup);
        let ctx = CollectContext::live(RateLimit::default()).with_sleeper(&NoSleep);

        let outcome = pipeline.process(categories, &mut src, &mut cache, ctx).unwrap();
        assert_eq!(outcome.stats.errors, 1);
        assert_eq!(outcome.failed_stocks[0].0, "005930");
        let entry = &outcome.categories["supply"][0];
        assert_eq!(entry.stock_code.as_deref(), Some("005930"));
        assert!(entry.prices.is_empty());
    }

    #[test]
    fn annotated_row_serializes_flat() {
        let mut entry = AnnotatedDisclosure::new(row("00126380", "Supply", 5, 10, 3));
        let plain = serde_json::to_value(&entry).unwrap();
        assert!(plain.get("prices").is_none());
        assert!(plain.get("stock_code").is_none());
        assert_eq!(plain["hour"], 10);

        entry.stock_code = Some("005930".into());
        let json = serde_json::to_string(&entry).unwrap();
        let back: AnnotatedDisclosure = serde_json::from_str(&json).unwrap();
        assert_eq!(back, entry);
    }
}
