//! Persistent company-id → stock-code cache.
//!
//! Lookups hit the portal's company API, which is slow and rate limited, so
//! every answer is remembered on disk, failures included. A `null` entry is a
//! permanent failure: it is never looked up again.

use super::provider::DataError;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Resolves a company id to a stock code. `None` means the company has no
/// listed stock or the lookup failed.
pub trait CodeLookup {
    fn lookup(&mut self, company_id: &str) -> Option<String>;
}

impl<F> CodeLookup for F
where
    F: FnMut(&str) -> Option<String>,
{
    fn lookup(&mut self, company_id: &str) -> Option<String> {
        self(company_id)
    }
}

/// Memoizing cache in front of a [`CodeLookup`].
pub struct StockCodeCache<L: CodeLookup> {
    path: Option<PathBuf>,
    entries: BTreeMap<String, Option<String>>,
    lookup: L,
    lookups: usize,
}

impl<L: CodeLookup> StockCodeCache<L> {
    /// Open the cache file at `path`. A missing or unreadable file starts an
    /// empty cache; the file is created on the first save.
    pub fn open(path: impl Into<PathBuf>, lookup: L) -> Self {
        let path = path.into();
        let entries = match fs::read_to_string(&path) {
            Ok(content) => match serde_json::from_str(&content) {
                Ok(entries) => entries,
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "unreadable code cache, starting empty");
                    BTreeMap::new()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "cannot read code cache, starting empty");
                BTreeMap::new()
            }
        };
        tracing::debug!(path = %path.display(), entries = entries.len(), "code cache opened");
        Self {
            path: Some(path),
            entries,
            lookup,
            lookups: 0,
        }
    }

    /// A cache that never touches disk.
    pub fn in_memory(lookup: L) -> Self {
        Self {
            path: None,
            entries: BTreeMap::new(),
            lookup,
            lookups: 0,
        }
    }

    /// Cached answer for `company_id`, looking it up (and saving) on a miss.
    ///
    /// A save failure is logged and the answer still returned; the entry
    /// stays in memory and goes out with the next successful save.
    pub fn get(&mut self, company_id: &str) -> Option<String> {
        if let Some(hit) = self.entries.get(company_id) {
            return hit.clone();
        }
        self.lookups += 1;
        let code = self
            .lookup
            .lookup(company_id)
            .filter(|c| !c.trim().is_empty());
        if code.is_none() {
            tracing::debug!(company_id, "company has no stock code, cached as permanent miss");
        }
        self.put(company_id, code.clone());
        if let Err(e) = self.save() {
            tracing::warn!(error = %e, "failed to persist code cache");
        }
        code
    }

    /// Store an answer without saving.
    pub fn put(&mut self, company_id: &str, code: Option<String>) {
        self.entries.insert(company_id.to_string(), code);
    }

    /// Whether `company_id` has an answer (positive or permanent failure).
    pub fn contains(&self, company_id: &str) -> bool {
        self.entries.contains_key(company_id)
    }

    /// Write the cache as a flat JSON object, atomically.
    pub fn save(&self) -> Result<(), DataError> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .map_err(|e| DataError::CacheError(format!("failed to create dir: {e}")))?;
        }
        let json = serde_json::to_string_pretty(&self.entries)
            .map_err(|e| DataError::CacheError(format!("cache serialization: {e}")))?;
        let tmp_path = path.with_extension("json.tmp");
        fs::write(&tmp_path, json)
            .map_err(|e| DataError::CacheError(format!("cache write: {e}")))?;
        fs::rename(&tmp_path, path).map_err(|e| {
            let _ = fs::remove_file(&tmp_path);
            DataError::CacheError(format!("atomic rename failed: {e}"))
        })
    }

    /// Number of lookups issued through this cache.
    pub fn lookups(&self) -> usize {
        self.lookups
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }
}
