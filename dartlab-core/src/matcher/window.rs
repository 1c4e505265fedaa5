//! Disclosure → bar time alignment and trading-hours eligibility.

use crate::domain::{DaySnapshot, MatchedPrice, PriceBar};
use chrono::{Duration, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};

/// Matches a disclosure at `T` to bars stamped `T'` with
/// `T <= T' <= T + window`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeWindowMatcher {
    window: Duration,
}

impl Default for TimeWindowMatcher {
    fn default() -> Self {
        Self::new(Duration::minutes(7))
    }
}

impl TimeWindowMatcher {
    pub fn new(window: Duration) -> Self {
        Self { window }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    pub fn matches(&self, at: NaiveDateTime, bar: &PriceBar) -> bool {
        match bar.timestamp() {
            Some(ts) => at <= ts && ts - at <= self.window,
            None => false,
        }
    }

    /// Bars inside the window, in the order given.
    pub fn matching<'b>(&self, at: NaiveDateTime, bars: &'b [PriceBar]) -> Vec<&'b PriceBar> {
        bars.iter().filter(|b| self.matches(at, b)).collect()
    }

    /// Bars inside the window, each merged with the day's aggregates.
    pub fn matched_prices(
        &self,
        at: NaiveDateTime,
        bars: &[PriceBar],
        day: Option<&DaySnapshot>,
    ) -> Vec<MatchedPrice> {
        self.matching(at, bars)
            .into_iter()
            .map(|b| MatchedPrice::new(*b, day))
            .collect()
    }
}

/// Why a disclosure is or is not looked up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Eligibility {
    Eligible,
    /// Before the open, at or after the close, or inside the closing auction.
    OutsideHours,
    /// Older than the feed's minute-bar history.
    TooOld,
}

/// Regular-session rule for price lookups.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TradingHours {
    #[serde(with = "hhmm")]
    pub open: NaiveTime,
    #[serde(with = "hhmm")]
    pub close: NaiveTime,
    /// Disclosures at or after this time are excluded as well.
    #[serde(with = "hhmm_opt")]
    pub auction_cutoff: Option<NaiveTime>,
    pub max_age_days: i64,
}

impl Default for TradingHours {
    fn default() -> Self {
        Self {
            open: NaiveTime::from_hms_opt(9, 0, 0).unwrap_or_default(),
            close: NaiveTime::from_hms_opt(16, 0, 0).unwrap_or_default(),
            auction_cutoff: None,
            max_age_days: 730,
        }
    }
}

impl TradingHours {
    pub fn classify(&self, at: NaiveDateTime, now: NaiveDateTime) -> Eligibility {
        let time = at.time();
        if time < self.open || time >= self.close {
            return Eligibility::OutsideHours;
        }
        if self.auction_cutoff.is_some_and(|cut| time >= cut) {
            return Eligibility::OutsideHours;
        }
        let midnight = at.date().and_time(NaiveTime::MIN);
        if now - midnight > Duration::days(self.max_age_days) {
            return Eligibility::TooOld;
        }
        Eligibility::Eligible
    }

    pub fn is_eligible(&self, at: NaiveDateTime, now: NaiveDateTime) -> bool {
        self.classify(at, now) == Eligibility::Eligible
    }
}

mod hhmm {
    use chrono::NaiveTime;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(t: &NaiveTime, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&t.format("%H:%M").to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<NaiveTime, D::Error> {
        let s = String::deserialize(d)?;
        NaiveTime::parse_from_str(&s, "%H:%M").map_err(serde::de::Error::custom)
    }
}

mod hhmm_opt {
    use chrono::NaiveTime;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(t: &Option<NaiveTime>, s: S) -> Result<S::Ok, S::Error> {
        match t {
            Some(t) => s.serialize_some(&t.format("%H:%M").to_string()),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<NaiveTime>, D::Error> {
        Option::<String>::deserialize(d)?
            .map(|s| NaiveTime::parse_from_str(&s, "%H:%M").map_err(serde::de::Error::custom))
            .transpose()
    }
}
