//! Columnar Parquet dump with Hive-style partitioning.
//!
//! Layout:
//! - `{root}/{name}/code={CODE}/bars.parquet` minute/tick bars as parallel
//!   columns `dates, minutes, opens, highs, lows, closes, volumes`
//! - `{root}/{name}/code={CODE}/series.parquet` named `f64` columns
//! - `{root}/{name}/code={CODE}/meta.json` sidecar (row count, date range, hash)
//! - `{root}/{name}.keys` newline-delimited codes present in the dump
//!
//! Every file is written to `.tmp` and renamed into place. A Parquet file
//! that fails validation on read is quarantined (`.quarantined`).

use super::provider::DataError;
use crate::domain::PriceBar;
use chrono::NaiveDateTime;
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

const BAR_COLUMNS: [&str; 7] = [
    "dates", "minutes", "opens", "highs", "lows", "closes", "volumes",
];

/// Metadata sidecar for one dumped stock.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DumpMeta {
    pub code: String,
    /// `bars` or `series`.
    pub kind: String,
    pub rows: usize,
    pub first_date: Option<u32>,
    pub last_date: Option<u32>,
    pub data_hash: String,
    pub written_at: NaiveDateTime,
}

/// Parallel arrays of a bar series, chronological.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OhlcvColumns {
    pub dates: Vec<u32>,
    pub minutes: Vec<u32>,
    pub opens: Vec<f64>,
    pub highs: Vec<f64>,
    pub lows: Vec<f64>,
    pub closes: Vec<f64>,
    pub volumes: Vec<u64>,
}

impl OhlcvColumns {
    pub fn from_bars(bars: &[PriceBar]) -> Self {
        Self {
            dates: bars.iter().map(|b| b.date).collect(),
            minutes: bars.iter().map(|b| b.minute).collect(),
            opens: bars.iter().map(|b| b.open).collect(),
            highs: bars.iter().map(|b| b.high).collect(),
            lows: bars.iter().map(|b| b.low).collect(),
            closes: bars.iter().map(|b| b.close).collect(),
            volumes: bars.iter().map(|b| b.volume).collect(),
        }
    }

    pub fn to_bars(&self) -> Vec<PriceBar> {
        (0..self.len())
            .map(|i| PriceBar {
                date: self.dates[i],
                minute: self.minutes[i],
                open: self.opens[i],
                high: self.highs[i],
                low: self.lows[i],
                close: self.closes[i],
                volume: self.volumes[i],
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.dates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dates.is_empty()
    }
}

/// Named `f64` columns of equal length, in output order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SeriesColumns {
    columns: Vec<(String, Vec<f64>)>,
}

impl SeriesColumns {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a column. Fails if the name is taken or the length differs
    /// from the columns already present.
    pub fn push(&mut self, name: &str, values: Vec<f64>) -> Result<(), DataError> {
        if self.columns.iter().any(|(n, _)| n == name) {
            return Err(DataError::ValidationError(format!("duplicate column '{name}'")));
        }
        if let Some((first, v)) = self.columns.first() {
            if v.len() != values.len() {
                return Err(DataError::ValidationError(format!(
                    "column '{name}' has {} rows, '{first}' has {}",
                    values.len(),
                    v.len()
                )));
            }
        }
        self.columns.push((name.to_string(), values));
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&[f64]> {
        self.columns
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_slice())
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|(n, _)| n.as_str())
    }

    /// Row count (zero when there are no columns).
    pub fn len(&self) -> usize {
        self.columns.first().map_or(0, |(_, v)| v.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn width(&self) -> usize {
        self.columns.len()
    }
}

/// One named dump under a root directory.
#[derive(Debug, Clone)]
pub struct ColumnarDump {
    root: PathBuf,
    name: String,
}

impl ColumnarDump {
    pub fn new(root: impl Into<PathBuf>, name: &str) -> Self {
        Self {
            root: root.into(),
            name: name.to_string(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// `{root}/{name}/`
    pub fn dir(&self) -> PathBuf {
        self.root.join(&self.name)
    }

    /// `{root}/{name}.keys`
    pub fn keys_path(&self) -> PathBuf {
        self.root.join(format!("{}.keys", self.name))
    }

    fn code_dir(&self, code: &str) -> PathBuf {
        self.dir().join(format!("code={code}"))
    }

    fn meta_path(&self, code: &str) -> PathBuf {
        self.code_dir(code).join("meta.json")
    }

    /// Write one stock's bars, as pulled (newest first). They are stored in
    /// chronological order; prints sharing a timestamp end up oldest first.
    pub fn write_stock(&self, code: &str, bars: &[PriceBar]) -> Result<DumpMeta, DataError> {
        if bars.is_empty() {
            return Err(DataError::CacheError(format!("no bars to dump for {code}")));
        }
        let mut sorted = bars.to_vec();
        sorted.reverse();
        sorted.sort_by_key(|b| b.key());

        let columns = OhlcvColumns::from_bars(&sorted);
        let df = ohlcv_to_dataframe(&columns)?;
        let dir = self.code_dir(code);
        fs::create_dir_all(&dir)
            .map_err(|e| DataError::CacheError(format!("failed to create dir: {e}")))?;
        write_parquet_atomic(&df, &dir.join("bars.parquet"))?;

        let hash_input = serde_json::to_vec(&sorted)
            .map_err(|e| DataError::CacheError(format!("hash serialization: {e}")))?;
        let meta = DumpMeta {
            code: code.to_string(),
            kind: "bars".into(),
            rows: sorted.len(),
            first_date: sorted.first().map(|b| b.date),
            last_date: sorted.last().map(|b| b.date),
            data_hash: blake3::hash(&hash_input).to_hex().to_string(),
            written_at: chrono::Local::now().naive_local(),
        };
        self.write_meta(&meta)?;
        tracing::debug!(dump = %self.name, code, rows = meta.rows, "stock dumped");
        Ok(meta)
    }

    /// Read one stock's bars back as parallel arrays.
    pub fn read_stock(&self, code: &str) -> Result<OhlcvColumns, DataError> {
        let path = self.code_dir(code).join("bars.parquet");
        if !path.exists() {
            return Err(self.no_dump(code));
        }
        let df = load_validated(&path, &BAR_COLUMNS)?;
        dataframe_to_ohlcv(&df)
    }

    /// Write one stock's named series.
    pub fn write_series(&self, code: &str, series: &SeriesColumns) -> Result<DumpMeta, DataError> {
        if series.width() == 0 || series.is_empty() {
            return Err(DataError::CacheError(format!("no series to dump for {code}")));
        }
        let columns: Vec<Column> = series
            .columns
            .iter()
            .map(|(name, values)| Column::new(name.as_str().into(), values.as_slice()))
            .collect();
        let df = DataFrame::new(columns)
            .map_err(|e| DataError::ParquetError(format!("dataframe creation: {e}")))?;

        let dir = self.code_dir(code);
        fs::create_dir_all(&dir)
            .map_err(|e| DataError::CacheError(format!("failed to create dir: {e}")))?;
        write_parquet_atomic(&df, &dir.join("series.parquet"))?;

        let hash_input = serde_json::to_vec(series)
            .map_err(|e| DataError::CacheError(format!("hash serialization: {e}")))?;
        let meta = DumpMeta {
            code: code.to_string(),
            kind: "series".into(),
            rows: series.len(),
            first_date: None,
            last_date: None,
            data_hash: blake3::hash(&hash_input).to_hex().to_string(),
            written_at: chrono::Local::now().naive_local(),
        };
        self.write_meta(&meta)?;
        Ok(meta)
    }

    pub fn read_series(&self, code: &str) -> Result<SeriesColumns, DataError> {
        let path = self.code_dir(code).join("series.parquet");
        if !path.exists() {
            return Err(self.no_dump(code));
        }
        let df = load_validated(&path, &[])?;
        let mut series = SeriesColumns::new();
        for column in df.get_columns() {
            let ca = column.f64().map_err(|e| {
                DataError::ParquetError(format!("{} column type: {e}", column.name()))
            })?;
            let values = ca.into_iter().map(|v| v.unwrap_or(f64::NAN)).collect();
            series.push(column.name().as_str(), values)?;
        }
        Ok(series)
    }

    /// Write the keys file listing the codes in this dump.
    pub fn write_keys(&self, codes: &[String]) -> Result<(), DataError> {
        fs::create_dir_all(&self.root)
            .map_err(|e| DataError::CacheError(format!("failed to create dir: {e}")))?;
        let mut body = codes.join("\n");
        if !body.is_empty() {
            body.push('\n');
        }
        write_atomic(&self.keys_path(), body.as_bytes())
    }

    pub fn read_keys(&self) -> Result<Vec<String>, DataError> {
        let path = self.keys_path();
        let content = fs::read_to_string(&path)
            .map_err(|e| DataError::CacheError(format!("keys file {}: {e}", path.display())))?;
        Ok(content
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(String::from)
            .collect())
    }

    /// Sidecar for a dumped stock, if present and readable.
    pub fn meta(&self, code: &str) -> Option<DumpMeta> {
        let content = fs::read_to_string(self.meta_path(code)).ok()?;
        serde_json::from_str(&content).ok()
    }

    fn write_meta(&self, meta: &DumpMeta) -> Result<(), DataError> {
        let json = serde_json::to_string_pretty(meta)
            .map_err(|e| DataError::CacheError(format!("meta serialization: {e}")))?;
        write_atomic(&self.meta_path(&meta.code), json.as_bytes())
    }

    fn no_dump(&self, code: &str) -> DataError {
        DataError::NoDump {
            name: self.name.clone(),
            code: code.to_string(),
        }
    }
}

// ── Parquet I/O helpers ─────────────────────────────────────────────

fn ohlcv_to_dataframe(columns: &OhlcvColumns) -> Result<DataFrame, DataError> {
    let dates: Vec<i32> = columns.dates.iter().map(|&d| d as i32).collect();
    let minutes: Vec<i32> = columns.minutes.iter().map(|&m| m as i32).collect();

    DataFrame::new(vec![
        Column::new("dates".into(), dates),
        Column::new("minutes".into(), minutes),
        Column::new("opens".into(), columns.opens.as_slice()),
        Column::new("highs".into(), columns.highs.as_slice()),
        Column::new("lows".into(), columns.lows.as_slice()),
        Column::new("closes".into(), columns.closes.as_slice()),
        Column::new("volumes".into(), columns.volumes.as_slice()),
    ])
    .map_err(|e| DataError::ParquetError(format!("dataframe creation: {e}")))
}

fn dataframe_to_ohlcv(df: &DataFrame) -> Result<OhlcvColumns, DataError> {
    let map_err = |e: PolarsError| DataError::ParquetError(format!("column read: {e}"));
    let ints = |name: &str| -> Result<Vec<u32>, DataError> {
        let ca = df.column(name).map_err(map_err)?.i32().map_err(map_err)?;
        ca.into_iter()
            .enumerate()
            .map(|(i, v)| {
                v.map(|v| v as u32)
                    .ok_or_else(|| DataError::ParquetError(format!("null {name} at row {i}")))
            })
            .collect()
    };
    let floats = |name: &str| -> Result<Vec<f64>, DataError> {
        let ca = df.column(name).map_err(map_err)?.f64().map_err(map_err)?;
        Ok(ca.into_iter().map(|v| v.unwrap_or(f64::NAN)).collect())
    };
    let volumes = df
        .column("volumes")
        .map_err(map_err)?
        .u64()
        .map_err(map_err)?
        .into_iter()
        .map(|v| v.unwrap_or(0))
        .collect();

    Ok(OhlcvColumns {
        dates: ints("dates")?,
        minutes: ints("minutes")?,
        opens: floats("opens")?,
        highs: floats("highs")?,
        lows: floats("lows")?,
        closes: floats("closes")?,
        volumes,
    })
}

fn write_parquet_atomic(df: &DataFrame, path: &Path) -> Result<(), DataError> {
    let tmp_path = path.with_extension("parquet.tmp");
    let file = fs::File::create(&tmp_path)
        .map_err(|e| DataError::ParquetError(format!("create file: {e}")))?;
    ParquetWriter::new(file)
        .finish(&mut df.clone())
        .map_err(|e| DataError::ParquetError(format!("write parquet: {e}")))?;
    fs::rename(&tmp_path, path).map_err(|e| {
        let _ = fs::remove_file(&tmp_path);
        DataError::CacheError(format!("atomic rename failed: {e}"))
    })
}

fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), DataError> {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp_path = PathBuf::from(tmp);
    fs::write(&tmp_path, bytes).map_err(|e| DataError::CacheError(format!("write: {e}")))?;
    fs::rename(&tmp_path, path).map_err(|e| {
        let _ = fs::remove_file(&tmp_path);
        DataError::CacheError(format!("atomic rename failed: {e}"))
    })
}

/// Read a Parquet file, quarantining it if it is unreadable, empty, or
/// missing one of `required` columns.
fn load_validated(path: &Path, required: &[&str]) -> Result<DataFrame, DataError> {
    let result = fs::File::open(path)
        .map_err(|e| DataError::ParquetError(format!("open: {e}")))
        .and_then(|file| {
            ParquetReader::new(file)
                .finish()
                .map_err(|e| DataError::ParquetError(format!("read: {e}")))
        })
        .and_then(|df| {
            if df.height() == 0 {
                return Err(DataError::ValidationError("empty parquet file".into()));
            }
            if let Some(missing) = required.iter().find(|c| df.column(c).is_err()) {
                return Err(DataError::ValidationError(format!("missing column '{missing}'")));
            }
            Ok(df)
        });

    if let Err(e) = &result {
        let quarantine = path.with_extension("parquet.quarantined");
        tracing::warn!(path = %path.display(), error = %e, "quarantining corrupt dump file");
        let _ = fs::rename(path, &quarantine);
    }
    result
}
