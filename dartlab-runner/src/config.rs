//! Serializable collector configuration.
//!
//! One TOML file drives every collector. Each section has defaults, so a
//! partial file (or none at all) works; `validate()` rejects values that
//! would make a run meaningless.

use chrono::NaiveDate;
use dartlab_core::dart::{ReportKind, DART_ROOT, DEFAULT_PAGE_SIZE};
use dartlab_core::data::{ChartField, Granularity, RateLimit};
use dartlab_core::matcher::TradingHours;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Environment variable consulted when `[dart] api_key` is not set.
pub const API_KEY_ENV: &str = "DART_API_KEY";

/// Errors from loading or validating a configuration file.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Top-level configuration for every collector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CollectorConfig {
    /// Directory all outputs are written under.
    pub export_dir: PathBuf,
    /// Stock directory TOML (see `Universe`).
    pub universe: PathBuf,
    pub rate_limit: RateLimitConfig,
    pub dart: DartConfig,
    pub listing: ListingConfig,
    pub pipeline: PipelineConfig,
    pub minute_dump: MinuteDumpConfig,
    pub series: SeriesConfig,
    pub opening_volume: OpeningVolumeConfig,
    pub stock_meta: StockMetaConfig,
    pub reports: ReportsConfig,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            export_dir: PathBuf::from("export"),
            universe: PathBuf::from("config/universe.toml"),
            rate_limit: RateLimitConfig::default(),
            dart: DartConfig::default(),
            listing: ListingConfig::default(),
            pipeline: PipelineConfig::default(),
            minute_dump: MinuteDumpConfig::default(),
            series: SeriesConfig::default(),
            opening_volume: OpeningVolumeConfig::default(),
            stock_meta: StockMetaConfig::default(),
            reports: ReportsConfig::default(),
        }
    }
}

impl CollectorConfig {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content)
    }

    /// Parse and validate.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.rate_limit.cooldown_secs == 0 && self.rate_limit.threshold > 0 {
            return Err(invalid("rate_limit.cooldown_secs must be positive"));
        }
        if self.listing.page_size == 0 {
            return Err(invalid("listing.page_size must be positive"));
        }
        if self.listing.days < 0 {
            return Err(invalid("listing.days must not be negative"));
        }
        let hours = &self.pipeline.trading_hours;
        if hours.open >= hours.close {
            return Err(invalid("pipeline.trading_hours: open must be before close"));
        }
        if self.pipeline.window_minutes <= 0 {
            return Err(invalid("pipeline.window_minutes must be positive"));
        }
        for category in &self.pipeline.categories {
            if category.name.trim().is_empty() {
                return Err(invalid("pipeline.categories: name must not be empty"));
            }
        }
        if self.series.fields.is_empty() {
            return Err(invalid("series.fields must name at least one field"));
        }
        self.series.field_map()?;
        if self.series.max_rows == 0 {
            return Err(invalid("series.max_rows must be positive"));
        }
        let ov = &self.opening_volume;
        if ov.top_k == 0 {
            return Err(invalid("opening_volume.top_k must be positive"));
        }
        if ov.window_start >= ov.window_end {
            return Err(invalid(format!(
                "opening_volume window {}..{} is empty",
                ov.window_start, ov.window_end
            )));
        }
        if self.reports.kinds.is_empty() {
            return Err(invalid("reports.kinds must name at least one kind"));
        }
        for (label, date) in [
            ("minute_dump.floor_date", self.minute_dump.floor_date),
            ("opening_volume.start_date", ov.start_date),
        ] {
            if dartlab_core::domain::date_from_pivot(date).is_none() {
                return Err(invalid(format!("{label} {date} is not a YYYYMMDD date")));
            }
        }
        Ok(())
    }

    /// Resolve a file name against `export_dir`.
    pub fn export_path(&self, name: &str) -> PathBuf {
        self.export_dir.join(name)
    }
}

fn invalid(msg: impl Into<String>) -> ConfigError {
    ConfigError::Invalid(msg.into())
}

/// Broker request budget handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Cool down when fewer requests than this remain.
    pub threshold: u32,
    pub cooldown_secs: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            threshold: 2,
            cooldown_secs: 15,
        }
    }
}

impl RateLimitConfig {
    pub fn to_rate_limit(self) -> RateLimit {
        RateLimit::new(self.threshold, Duration::from_secs(self.cooldown_secs))
    }
}

/// DART portal access.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DartConfig {
    pub root: String,
    /// Pause between listing page requests.
    pub listing_delay_secs: u64,
    /// Pause after every company API call.
    pub lookup_delay_secs: u64,
    /// Company API key. Falls back to `DART_API_KEY`.
    pub api_key: Option<String>,
}

impl Default for DartConfig {
    fn default() -> Self {
        Self {
            root: DART_ROOT.to_string(),
            listing_delay_secs: 3,
            lookup_delay_secs: 2,
            api_key: None,
        }
    }
}

impl DartConfig {
    /// Configured key, else the environment variable. Blank values count as
    /// unset.
    pub fn api_key(&self) -> Option<String> {
        self.api_key
            .clone()
            .or_else(|| std::env::var(API_KEY_ENV).ok())
            .filter(|k| !k.trim().is_empty())
    }
}

/// DART daily listing walk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ListingConfig {
    /// First (newest) day to list. Defaults to today.
    pub from: Option<NaiveDate>,
    /// Calendar days to walk back from `from`.
    pub days: i64,
    pub page_size: u32,
    pub output: String,
}

impl Default for ListingConfig {
    fn default() -> Self {
        Self {
            from: None,
            days: 30,
            page_size: DEFAULT_PAGE_SIZE,
            output: "dart_list.tsv".to_string(),
        }
    }
}

/// One named group of disclosures.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryConfig {
    pub name: String,
    /// File under the disclosure directory. Defaults to `name`.
    #[serde(default)]
    pub file: Option<String>,
    /// Keep only rows whose title contains this text.
    #[serde(default)]
    pub title_contains: Option<String>,
}

impl CategoryConfig {
    pub fn file_name(&self) -> &str {
        self.file.as_deref().unwrap_or(&self.name)
    }
}

/// Disclosure → price annotation pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub disclosure_dir: PathBuf,
    pub code_cache: PathBuf,
    pub output: String,
    /// Minutes after a disclosure during which bars are matched.
    pub window_minutes: i64,
    pub trading_hours: TradingHours,
    /// Empty: every file in `disclosure_dir` is its own category.
    pub categories: Vec<CategoryConfig>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            disclosure_dir: PathBuf::from("model"),
            code_cache: PathBuf::from("config/stock_code.json"),
            output: "dart_report.json".to_string(),
            window_minutes: 7,
            trading_hours: TradingHours::default(),
            categories: Vec::new(),
        }
    }
}

/// Full minute history for every listed stock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MinuteDumpConfig {
    /// Oldest date kept, `YYYYMMDD`.
    pub floor_date: u32,
    pub name: String,
}

impl Default for MinuteDumpConfig {
    fn default() -> Self {
        Self {
            floor_date: 20180101,
            name: "minute_data".to_string(),
        }
    }
}

/// Arbitrary field series for one stock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SeriesConfig {
    pub code: String,
    pub granularity: Granularity,
    /// Row budget across all pages.
    pub max_rows: u32,
    /// Stop below this date, `YYYYMMDD`.
    pub since: Option<u32>,
    /// Feed field index → output column name.
    pub fields: BTreeMap<String, String>,
    pub name: String,
}

impl Default for SeriesConfig {
    fn default() -> Self {
        let fields = [("0", "date"), ("5", "close"), ("8", "volume")]
            .into_iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Self {
            code: "A005930".to_string(),
            granularity: Granularity::Day,
            max_rows: 10_000,
            since: None,
            fields,
            name: "series".to_string(),
        }
    }
}

impl SeriesConfig {
    /// Field map with parsed indices, ordered by field index.
    pub fn field_map(&self) -> Result<Vec<(ChartField, String)>, ConfigError> {
        let mut map = Vec::with_capacity(self.fields.len());
        for (index, name) in &self.fields {
            let field = index
                .trim()
                .parse::<u16>()
                .map_err(|_| invalid(format!("series.fields: '{index}' is not a field index")))?;
            if name.trim().is_empty() {
                return Err(invalid(format!("series.fields: field {field} has no name")));
            }
            if map.iter().any(|(_, n)| n == name) {
                return Err(invalid(format!("series.fields: duplicate output name '{name}'")));
            }
            map.push((ChartField(field), name.clone()));
        }
        map.sort_by_key(|(f, _)| *f);
        Ok(map)
    }
}

/// Opening-volume ranking and the morning-window dump built from it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OpeningVolumeConfig {
    /// Oldest date ranked, `YYYYMMDD`.
    pub start_date: u32,
    pub top_k: usize,
    /// Bar carrying the opening volume, `HHMM`.
    pub opening_minute: u32,
    /// Dumped minute window `[start, end)`, `HHMM`.
    pub window_start: u32,
    pub window_end: u32,
    pub name: String,
}

impl Default for OpeningVolumeConfig {
    fn default() -> Self {
        Self {
            start_date: 20180101,
            top_k: 50,
            opening_minute: 901,
            window_start: 901,
            window_end: 1100,
            name: "ninetoten".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StockMetaConfig {
    pub output: String,
}

impl Default for StockMetaConfig {
    fn default() -> Self {
        Self {
            output: "stock_meta.json".to_string(),
        }
    }
}

/// Structured fields read from the documents behind listed filings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportsConfig {
    /// Listing file under the export dir the filings are read from.
    pub input: String,
    pub kinds: Vec<ReportKind>,
    /// Pause before every filing after the first.
    pub delay_secs: u64,
}

impl Default for ReportsConfig {
    fn default() -> Self {
        Self {
            input: "dart_list.tsv".to_string(),
            kinds: ReportKind::ALL.to_vec(),
            delay_secs: 2,
        }
    }
}
