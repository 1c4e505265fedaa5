//! Stock directory: which codes are listed on which market, and their
//! reference data.
//!
//! The broker exposes this through its code manager; offline it is a TOML
//! file with one table per stock code.

use super::provider::DataError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Exchange a stock is listed on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Market {
    Kospi,
    Kosdaq,
}

impl Market {
    pub const ALL: [Market; 2] = [Market::Kospi, Market::Kosdaq];
}

/// Reference data for one listed stock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockMeta {
    pub name: String,
    /// Trading lot size in shares.
    #[serde(default = "default_lot_size")]
    pub lot_size: u32,
    pub market: Market,
    #[serde(default)]
    pub section_kind: u32,
    /// Listing date as `YYYYMMDD`, 0 when unknown.
    #[serde(default)]
    pub listed_date: u32,
}

fn default_lot_size() -> u32 {
    1
}

/// Source of listed codes and their metadata.
pub trait StockDirectory {
    /// Codes listed on `market`, in directory order.
    fn codes(&self, market: Market) -> Vec<String>;

    fn meta(&self, code: &str) -> Option<StockMeta>;

    /// KOSPI codes followed by KOSDAQ codes.
    fn listed_codes(&self) -> Vec<String> {
        Market::ALL.iter().flat_map(|&m| self.codes(m)).collect()
    }
}

/// TOML-backed stock directory.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Universe {
    #[serde(default)]
    pub stocks: BTreeMap<String, StockMeta>,
}

impl Universe {
    pub fn from_file(path: &Path) -> Result<Self, DataError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self, DataError> {
        toml::from_str(content).map_err(|e| DataError::Other(format!("parse universe TOML: {e}")))
    }

    pub fn to_toml(&self) -> Result<String, DataError> {
        toml::to_string_pretty(self).map_err(|e| DataError::Other(format!("serialize universe: {e}")))
    }

    pub fn insert(&mut self, code: &str, meta: StockMeta) {
        self.stocks.insert(code.to_string(), meta);
    }

    pub fn len(&self) -> usize {
        self.stocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stocks.is_empty()
    }
}

impl StockDirectory for Universe {
    fn codes(&self, market: Market) -> Vec<String> {
        self.stocks
            .iter()
            .filter(|(_, m)| m.market == market)
            .map(|(c, _)| c.clone())
            .collect()
    }

    fn meta(&self, code: &str) -> Option<StockMeta> {
        self.stocks.get(code).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
[stocks.A005930]
name = "삼성전자"
market = "kospi"
listed_date = 19750611

[stocks.A035720]
name = "카카오"
market = "kospi"
lot_size = 1

[stocks.A091990]
name = "셀트리온헬스케어"
market = "kosdaq"
"#;

    #[test]
    fn parses_and_splits_by_market() {
        let u = Universe::from_toml(SAMPLE).unwrap();
        assert_eq!(u.len(), 3);
        assert_eq!(u.codes(Market::Kospi), vec!["A005930", "A035720"]);
        assert_eq!(u.codes(Market::Kosdaq), vec!["A091990"]);
        assert_eq!(u.listed_codes(), vec!["A005930", "A035720", "A091990"]);
    }

    #[test]
    fn defaults_fill_missing_fields() {
        let u = Universe::from_toml(SAMPLE).unwrap();
        let meta = u.meta("A091990").unwrap();
        assert_eq!(meta.lot_size, 1);
        assert_eq!(meta.listed_date, 0);
        assert_eq!(u.meta("A005930").unwrap().listed_date, 19750611);
        assert!(u.meta("A000000").is_none());
    }

    #[test]
    fn toml_roundtrip() {
        let u = Universe::from_toml(SAMPLE).unwrap();
        let back = Universe::from_toml(&u.to_toml().unwrap()).unwrap();
        assert_eq!(u, back);
    }
}
