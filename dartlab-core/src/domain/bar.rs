//! Price bars and same-day aggregates as returned by the chart feed.

use super::pivot::bar_datetime;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// One OHLCV record for a stock at a given granularity.
///
/// `date` is `YYYYMMDD`, `minute` is `HHMM` (zero for day bars). The feed
/// returns bars newest first; anything persisted is reversed to
/// chronological order.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriceBar {
    pub date: u32,
    pub minute: u32,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: u64,
}

impl PriceBar {
    /// Timestamp of the bar, `None` if the encoded date/minute is impossible.
    pub fn timestamp(&self) -> Option<NaiveDateTime> {
        bar_datetime(self.date, self.minute)
    }

    /// Join key within a single pull.
    pub fn key(&self) -> (u32, u32) {
        (self.date, self.minute)
    }
}

/// Same-day aggregate fields for a stock.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DaySnapshot {
    pub date: u32,
    /// Listed shares outstanding.
    pub listed_shares: u64,
    pub market_cap: f64,
    /// Foreign ownership ratio (%).
    pub foreign_ratio: f64,
    /// Share turnover ratio (%).
    pub turnover_ratio: f64,
    pub transaction_ratio: f64,
}

/// A bar matched to a disclosure, merged with that day's aggregates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchedPrice {
    #[serde(flatten)]
    pub bar: PriceBar,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub listed_shares: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub market_cap: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub foreign_ratio: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub turnover_ratio: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub transaction_ratio: Option<f64>,
}

impl MatchedPrice {
    pub fn new(bar: PriceBar, day: Option<&DaySnapshot>) -> Self {
        Self {
            bar,
            listed_shares: day.map(|d| d.listed_shares),
            market_cap: day.map(|d| d.market_cap),
            foreign_ratio: day.map(|d| d.foreign_ratio),
            turnover_ratio: day.map(|d| d.turnover_ratio),
            transaction_ratio: day.map(|d| d.transaction_ratio),
        }
    }
}
