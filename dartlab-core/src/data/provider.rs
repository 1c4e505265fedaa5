//! Chart source trait and structured error types.
//!
//! The ChartSource trait abstracts over the broker chart feed: a stateful,
//! single-cursor service that answers a query one bounded page at a time and
//! must be re-invoked to continue. Implementations are swapped for replayed
//! or synthetic data in tests and offline runs.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Upper bound on rows requested per query.
pub const DEFAULT_MAX_ROWS: u32 = 100_000;

/// Structured error types for data operations.
#[derive(Debug, Error)]
pub enum DataError {
    #[error("source status {code}: {message}")]
    Source { code: i32, message: String },

    #[error("network unreachable: {0}")]
    NetworkUnreachable(String),

    #[error("HTTP {status} for {url}")]
    HttpStatus { status: u16, url: String },

    #[error("response format changed: {0}")]
    ResponseFormatChanged(String),

    #[error("cache error: {0}")]
    CacheError(String),

    #[error("validation error: {0}")]
    ValidationError(String),

    #[error("parquet I/O error: {0}")]
    ParquetError(String),

    #[error("no dump for '{code}' in '{name}'")]
    NoDump { name: String, code: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("data error: {0}")]
    Other(String),
}

impl DataError {
    /// True for a non-zero status reported by the chart feed itself.
    pub fn is_source_status(&self) -> bool {
        matches!(self, DataError::Source { .. })
    }
}

/// Bar granularity understood by the chart feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Granularity {
    Tick,
    Minute,
    Day,
    Week,
    Month,
}

impl Granularity {
    /// Single-character code sent to the feed.
    pub fn code(self) -> char {
        match self {
            Granularity::Tick => 'T',
            Granularity::Minute => 'm',
            Granularity::Day => 'D',
            Granularity::Week => 'W',
            Granularity::Month => 'M',
        }
    }
}

/// Field index in the chart feed's column numbering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChartField(pub u16);

impl ChartField {
    pub const DATE: Self = Self(0);
    pub const TIME: Self = Self(1);
    pub const OPEN: Self = Self(2);
    pub const HIGH: Self = Self(3);
    pub const LOW: Self = Self(4);
    pub const CLOSE: Self = Self(5);
    pub const VOLUME: Self = Self(8);
    pub const LISTED_SHARES: Self = Self(12);
    pub const MARKET_CAP: Self = Self(13);
    pub const FOREIGN_RATIO: Self = Self(17);
    pub const TURNOVER_RATIO: Self = Self(25);
    pub const TRANSACTION_RATIO: Self = Self(26);

    pub const MINUTE_BAR: [Self; 7] = [
        Self::DATE,
        Self::TIME,
        Self::OPEN,
        Self::HIGH,
        Self::LOW,
        Self::CLOSE,
        Self::VOLUME,
    ];
    pub const DAY_SNAPSHOT: [Self; 6] = [
        Self::DATE,
        Self::LISTED_SHARES,
        Self::MARKET_CAP,
        Self::FOREIGN_RATIO,
        Self::TURNOVER_RATIO,
        Self::TRANSACTION_RATIO,
    ];
    pub const TICK: [Self; 4] = [Self::DATE, Self::TIME, Self::OPEN, Self::VOLUME];
    pub const OPENING_VOLUME: [Self; 3] = [Self::DATE, Self::TIME, Self::VOLUME];
}

/// Chart-feed stock code: six digits prefixed with `A`.
pub fn chart_code(code: &str) -> String {
    let code = code.trim();
    if code.starts_with('A') {
        code.to_string()
    } else {
        format!("A{code}")
    }
}

/// One query against the chart feed.
///
/// `fields` is kept sorted and deduplicated because the feed returns columns
/// in ascending field order regardless of request order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChartQuery {
    pub code: String,
    pub granularity: Granularity,
    pub fields: Vec<ChartField>,
    pub max_rows: u32,
    /// Request split/dividend adjusted prices.
    pub adjusted: bool,
}

impl ChartQuery {
    pub fn new(code: &str, granularity: Granularity, fields: &[ChartField]) -> Self {
        let mut fields = fields.to_vec();
        fields.sort();
        fields.dedup();
        Self {
            code: chart_code(code),
            granularity,
            fields,
            max_rows: DEFAULT_MAX_ROWS,
            adjusted: true,
        }
    }

    /// Minute OHLCV bars.
    pub fn minute_bars(code: &str) -> Self {
        Self::new(code, Granularity::Minute, &ChartField::MINUTE_BAR)
    }

    /// Day-level aggregates (shares, market cap, foreign ratio, turnover).
    pub fn day_snapshots(code: &str) -> Self {
        Self::new(code, Granularity::Day, &ChartField::DAY_SNAPSHOT)
    }

    /// Tick prints: date, time, price, volume.
    pub fn ticks(code: &str) -> Self {
        Self::new(code, Granularity::Tick, &ChartField::TICK)
    }

    /// Minute volume only, for volume ranking.
    pub fn opening_volume(code: &str) -> Self {
        Self::new(code, Granularity::Minute, &ChartField::OPENING_VOLUME)
    }

    pub fn with_max_rows(mut self, max_rows: u32) -> Self {
        self.max_rows = max_rows.min(DEFAULT_MAX_ROWS);
        self
    }

    /// Column index of a field within returned rows.
    pub fn column(&self, field: ChartField) -> Option<usize> {
        self.fields.binary_search(&field).ok()
    }
}

/// One row of a page, values aligned to the query's field order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChartRow(pub Vec<f64>);

impl ChartRow {
    pub fn value(&self, column: usize) -> Option<f64> {
        self.0.get(column).copied()
    }

    /// Integer view of a column (dates, times, counts).
    pub fn int(&self, column: usize) -> Option<u32> {
        self.value(column)
            .filter(|v| v.is_finite() && *v >= 0.0)
            .map(|v| v as u32)
    }
}

/// A bounded chunk of rows plus the feed's continuation flag.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChartPage {
    pub rows: Vec<ChartRow>,
    pub has_more: bool,
}

/// Trait for chart feeds (broker connection, replayed dumps, synthetic data).
///
/// A source has exactly one cursor. `request` resets it to the newest row of
/// a new query; `request_next` continues the last query. Taking `&mut self`
/// makes concurrent use of one source impossible.
pub trait ChartSource {
    /// Human-readable name of this source.
    fn name(&self) -> &str;

    /// Start a new query and return its first page.
    fn request(&mut self, query: &ChartQuery) -> Result<ChartPage, DataError>;

    /// Return the next page of the current query.
    fn request_next(&mut self) -> Result<ChartPage, DataError>;

    /// Remaining request budget before the feed enforces a cool-down.
    fn remaining_requests(&self) -> u32;
}

impl<S: ChartSource + ?Sized> ChartSource for &mut S {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn request(&mut self, query: &ChartQuery) -> Result<ChartPage, DataError> {
        (**self).request(query)
    }

    fn request_next(&mut self) -> Result<ChartPage, DataError> {
        (**self).request_next()
    }

    fn remaining_requests(&self) -> u32 {
        (**self).remaining_requests()
    }
}

/// Progress callback for multi-stock operations.
pub trait CollectProgress {
    /// Called when starting to collect a stock.
    fn on_start(&self, code: &str, index: usize, total: usize);

    /// Called when a stock completes.
    fn on_complete(&self, code: &str, index: usize, total: usize, result: &Result<usize, DataError>);

    /// Called when the entire batch is done.
    fn on_batch_complete(&self, succeeded: usize, failed: usize, total: usize);
}

/// Progress reporter that writes to the tracing log.
pub struct LogProgress;

impl CollectProgress for LogProgress {
    fn on_start(&self, code: &str, index: usize, total: usize) {
        tracing::debug!(code, progress = format!("{}/{}", index + 1, total), "collecting");
    }

    fn on_complete(
        &self,
        code: &str,
        _index: usize,
        _total: usize,
        result: &Result<usize, DataError>,
    ) {
        match result {
            Ok(rows) => tracing::debug!(code, rows, "collected"),
            Err(e) => tracing::warn!(code, error = %e, "collection failed"),
        }
    }

    fn on_batch_complete(&self, succeeded: usize, failed: usize, total: usize) {
        tracing::info!(succeeded, failed, total, "batch complete");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_sorts_and_dedups_fields() {
        let q = ChartQuery::new(
            "005930",
            Granularity::Minute,
            &[ChartField::VOLUME, ChartField::DATE, ChartField::VOLUME, ChartField::TIME],
        );
        assert_eq!(q.fields, vec![ChartField::DATE, ChartField::TIME, ChartField::VOLUME]);
        assert_eq!(q.column(ChartField::VOLUME), Some(2));
        assert_eq!(q.column(ChartField::OPEN), None);
    }

    #[test]
    fn chart_code_prefix_is_idempotent() {
        assert_eq!(chart_code("005930"), "A005930");
        assert_eq!(chart_code("A005930"), "A005930");
    }

    #[test]
    fn max_rows_is_capped() {
        let q = ChartQuery::minute_bars("005930").with_max_rows(500_000);
        assert_eq!(q.max_rows, DEFAULT_MAX_ROWS);
    }

    #[test]
    fn row_int_rejects_negative_and_nan() {
        let row = ChartRow(vec![20190301.0, -1.0, f64::NAN]);
        assert_eq!(row.int(0), Some(20190301));
        assert_eq!(row.int(1), None);
        assert_eq!(row.int(2), None);
        assert_eq!(row.int(3), None);
    }
}
