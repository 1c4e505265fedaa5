//! Per-date top-K volume ranking across stocks.
//!
//! Each stock contributes a sparse date → volume series. For every date seen
//! in any series, the stocks trading on that date are ranked by volume,
//! highest first, ties broken by stock code ascending, and the first `top_k`
//! are kept. The result can be inverted into the dates each stock needs
//! minute data for.

use crate::data::provider::DataError;
use crate::domain::PivotSet;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::Path;

/// Stock → date → volume.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VolumeSeries {
    stocks: BTreeMap<String, BTreeMap<u32, u64>>,
}

impl VolumeSeries {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one observation. A repeated `(code, date)` keeps the first
    /// value, matching newest-first collection where the first seen wins.
    pub fn record(&mut self, code: &str, date: u32, volume: u64) {
        self.stocks
            .entry(code.to_string())
            .or_default()
            .entry(date)
            .or_insert(volume);
    }

    /// Add a whole series for one stock. An empty series still registers
    /// the stock.
    pub fn insert_series(&mut self, code: &str, series: impl IntoIterator<Item = (u32, u64)>) {
        let entry = self.stocks.entry(code.to_string()).or_default();
        for (date, volume) in series {
            entry.entry(date).or_insert(volume);
        }
    }

    pub fn get(&self, code: &str, date: u32) -> Option<u64> {
        self.stocks.get(code)?.get(&date).copied()
    }

    /// Union of dates across all stocks, ascending.
    pub fn dates(&self) -> BTreeSet<u32> {
        self.stocks
            .values()
            .flat_map(|s| s.keys().copied())
            .collect()
    }

    pub fn stock_count(&self) -> usize {
        self.stocks.len()
    }
}

/// Date → stock codes, highest volume first.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VolumeRankMap {
    ranks: BTreeMap<u32, Vec<String>>,
}

impl VolumeRankMap {
    pub fn get(&self, date: u32) -> Option<&[String]> {
        self.ranks.get(&date).map(|v| v.as_slice())
    }

    pub fn dates(&self) -> impl Iterator<Item = u32> + '_ {
        self.ranks.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.ranks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ranks.is_empty()
    }

    /// Stock → the dates on which it ranked.
    pub fn invert(&self) -> BTreeMap<String, PivotSet> {
        let mut out: BTreeMap<String, PivotSet> = BTreeMap::new();
        for (&date, codes) in &self.ranks {
            for code in codes {
                out.entry(code.clone()).or_default().insert(date);
            }
        }
        out
    }

    pub fn save(&self, path: &Path) -> Result<(), DataError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| DataError::Other(format!("rank map serialization: {e}")))?;
        fs::write(path, json)?;
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self, DataError> {
        let content = fs::read_to_string(path)?;
        serde_json::from_str(&content)
            .map_err(|e| DataError::Other(format!("rank map parse: {e}")))
    }
}

/// Keeps the `top_k` highest-volume stocks per date.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VolumeRanker {
    top_k: usize,
}

impl VolumeRanker {
    pub fn new(top_k: usize) -> Self {
        Self { top_k }
    }

    pub fn top_k(&self) -> usize {
        self.top_k
    }

    pub fn rank(&self, series: &VolumeSeries) -> VolumeRankMap {
        let mut ranks = BTreeMap::new();
        for date in series.dates() {
            let mut entries: Vec<(&str, u64)> = series
                .stocks
                .iter()
                .filter_map(|(code, s)| s.get(&date).map(|&v| (code.as_str(), v)))
                .collect();
            entries.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
            let top: Vec<String> = entries
                .into_iter()
                .take(self.top_k)
                .map(|(c, _)| c.to_string())
                .collect();
            ranks.insert(date, top);
        }
        VolumeRankMap { ranks }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;

    fn abc() -> VolumeSeries {
        let mut s = VolumeSeries::new();
        s.record("A", 20190301, 10);
        s.record("B", 20190301, 30);
        s.record("C", 20190301, 20);
        s
    }

    #[test]
    fn top_two_of_three() {
        let map = VolumeRanker::new(2).rank(&abc());
        assert_eq!(map.get(20190301).unwrap(), &["B".to_string(), "C".to_string()]);
    }

    #[test]
    fn ties_break_by_code() {
        let mut s = VolumeSeries::new();
        s.record("Z", 20190301, 5);
        s.record("M", 20190301, 5);
        s.record("A", 20190301, 1);
        let map = VolumeRanker::new(2).rank(&s);
        assert_eq!(map.get(20190301).unwrap(), &["M".to_string(), "Z".to_string()]);
    }

    #[test]
    fn tied_leaders_fill_top_two() {
        let mut s = VolumeSeries::new();
        s.record("A", 20190301, 100);
        s.record("B", 20190301, 200);
        s.record("C", 20190301, 200);
        assert_eq!(s.stock_count(), 3);

        let map = VolumeRanker::new(2).rank(&s);
        let top = map.get(20190301).unwrap();
        let set: BTreeSet<&str> = top.iter().map(String::as_str).collect();
        assert_eq!(set, BTreeSet::from(["B", "C"]));
        assert_eq!(top, &["B".to_string(), "C".to_string()]);
    }

    #[test]
    fn stock_missing_a_date_is_absent() {
        let mut s = abc();
        s.record("A", 20190304, 99);
        let map = VolumeRanker::new(5).rank(&s);
        assert_eq!(map.get(20190304).unwrap(), &["A".to_string()]);
        assert_eq!(map.get(20190301).unwrap().len(), 3);
    }

    #[test]
    fn first_observation_wins() {
        let mut s = VolumeSeries::new();
        s.record("A", 20190301, 7);
        s.record("A", 20190301, 9);
        assert_eq!(s.get("A", 20190301), Some(7));
    }

    #[test]
    fn invert_collects_dates_per_stock() {
        let mut s = abc();
        s.record("B", 20190304, 1);
        let inverted = VolumeRanker::new(2).rank(&s).invert();
        assert_eq!(inverted["B"].iter().collect::<Vec<_>>(), vec![20190301, 20190304]);
        assert!(!inverted.contains_key("A"));
    }

    #[test]
    fn save_and_load() {
        let path = env::temp_dir().join(format!("dartlab_rank_{}.json", std::process::id()));
        let map = VolumeRanker::new(2).rank(&abc());
        map.save(&path).unwrap();
        let text = fs::read_to_string(&path).unwrap();
        assert!(text.contains("\"20190301\""));
        assert_eq!(VolumeRankMap::load(&path).unwrap(), map);
        let _ = fs::remove_file(&path);
    }
}
