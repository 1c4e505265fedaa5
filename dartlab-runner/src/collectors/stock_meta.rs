//! Reference data for every listed stock, as one JSON object keyed by code.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use dartlab_core::data::{StockDirectory, StockMeta};

use crate::runner::{write_json, RunError};

#[derive(Debug)]
pub struct StockMetaRun {
    pub stocks: BTreeMap<String, StockMeta>,
    /// Listed codes the directory had no metadata for.
    pub missing: Vec<String>,
    pub output: PathBuf,
}

pub fn collect_stock_meta<D>(directory: &D, output: &Path) -> Result<StockMetaRun, RunError>
where
    D: StockDirectory + ?Sized,
{
    let mut stocks = BTreeMap::new();
    let mut missing = Vec::new();
    for code in directory.listed_codes() {
        match directory.meta(&code) {
            Some(meta) => {
                stocks.insert(code, meta);
            }
            None => {
                tracing::warn!(code = %code, "listed code has no metadata, skipped");
                missing.push(code);
            }
        }
    }

    write_json(output, &stocks, "stock metadata")?;
    tracing::info!(stocks = stocks.len(), missing = missing.len(), "stock metadata collected");
    Ok(StockMetaRun {
        stocks,
        missing,
        output: output.to_path_buf(),
    })
}
