//! Pivots: integer-encoded dates and minutes used as join keys.
//!
//! The chart feed reports dates as `YYYYMMDD` and bar times as `HHMM`, both
//! as plain integers. Everything that joins disclosures to bars works on
//! these encodings directly so no conversion happens inside the walk loop.

use chrono::{Datelike, NaiveDate, NaiveDateTime, NaiveTime, Timelike};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Encode a calendar date as `YYYYMMDD`.
pub fn pivot_date(date: NaiveDate) -> u32 {
    date.year() as u32 * 10_000 + date.month() * 100 + date.day()
}

/// Decode a `YYYYMMDD` integer. Returns `None` for impossible dates.
pub fn date_from_pivot(pivot: u32) -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt((pivot / 10_000) as i32, (pivot / 100) % 100, pivot % 100)
}

/// Encode a wall-clock time as `HHMM`.
pub fn pivot_minute(time: NaiveTime) -> u32 {
    time.hour() * 100 + time.minute()
}

/// Decode an `HHMM` integer. Returns `None` for impossible times.
pub fn time_from_minute(minute: u32) -> Option<NaiveTime> {
    NaiveTime::from_hms_opt(minute / 100, minute % 100, 0)
}

/// Combine a `YYYYMMDD` date and an `HHMM` minute into a timestamp.
pub fn bar_datetime(date: u32, minute: u32) -> Option<NaiveDateTime> {
    Some(date_from_pivot(date)?.and_time(time_from_minute(minute)?))
}

/// A deduplicated, sorted set of pivot dates.
///
/// `min()` is the earliest date of interest; a newest-to-oldest walk can stop
/// as soon as it has passed below it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PivotSet {
    dates: BTreeSet<u32>,
}

impl PivotSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, date: u32) -> bool {
        self.dates.insert(date)
    }

    pub fn contains(&self, date: u32) -> bool {
        self.dates.contains(&date)
    }

    /// Earliest pivot, if any.
    pub fn min(&self) -> Option<u32> {
        self.dates.first().copied()
    }

    /// Latest pivot, if any.
    pub fn max(&self) -> Option<u32> {
        self.dates.last().copied()
    }

    pub fn len(&self) -> usize {
        self.dates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dates.is_empty()
    }

    /// Pivots in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = u32> + '_ {
        self.dates.iter().copied()
    }

    pub(crate) fn as_set(&self) -> &BTreeSet<u32> {
        &self.dates
    }
}

impl FromIterator<u32> for PivotSet {
    fn from_iter<I: IntoIterator<Item = u32>>(iter: I) -> Self {
        Self {
            dates: iter.into_iter().collect(),
        }
    }
}

impl Extend<u32> for PivotSet {
    fn extend<I: IntoIterator<Item = u32>>(&mut self, iter: I) {
        self.dates.extend(iter);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn date_encoding_roundtrip() {
        let d = NaiveDate::from_ymd_opt(2019, 3, 7).unwrap();
        assert_eq!(pivot_date(d), 20190307);
        assert_eq!(date_from_pivot(20190307), Some(d));
    }

    #[test]
    fn impossible_dates_and_minutes_decode_to_none() {
        assert!(date_from_pivot(20190230).is_none());
        assert!(time_from_minute(961).is_none());
        assert!(bar_datetime(20190301, 2500).is_none());
    }

    #[test]
    fn bar_datetime_combines_date_and_minute() {
        let dt = bar_datetime(20190301, 901).unwrap();
        assert_eq!(dt.to_string(), "2019-03-01 09:01:00");
    }

    #[test]
    fn pivot_set_dedups_and_tracks_min() {
        let set: PivotSet = [20190305, 20190301, 20190305, 20190303].into_iter().collect();
        assert_eq!(set.len(), 3);
        assert_eq!(set.min(), Some(20190301));
        assert_eq!(set.max(), Some(20190305));
        assert_eq!(set.iter().collect::<Vec<_>>(), vec![20190301, 20190303, 20190305]);
    }

    #[test]
    fn empty_pivot_set_has_no_min() {
        assert!(PivotSet::new().min().is_none());
    }
}
