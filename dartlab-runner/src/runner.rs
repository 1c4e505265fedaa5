//! Shared plumbing for the collectors: the run error, request pacing, and
//! JSON output.

use std::path::{Path, PathBuf};

use serde::Serialize;
use thiserror::Error;

use dartlab_core::data::{CollectProgress, DataError, LogProgress, RateLimit, Sleeper};

use crate::config::ConfigError;

/// Errors from a collector run.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    #[error("data error: {0}")]
    Data(#[from] DataError),

    #[error("failed to write {path}: {source}")]
    Output {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to serialize {what}: {source}")]
    Serialize {
        what: String,
        source: serde_json::Error,
    },

    #[error("DART API key missing: set [dart] api_key or DART_API_KEY")]
    MissingApiKey,

    #[error("no disclosure files under {0}")]
    NoDisclosures(PathBuf),
}

/// How a collector paces and reports its broker requests.
#[derive(Clone, Copy)]
pub struct CollectContext<'a> {
    pub limit: RateLimit,
    /// `None` sleeps on the calling thread.
    pub sleeper: Option<&'a dyn Sleeper>,
    pub progress: &'a dyn CollectProgress,
}

impl CollectContext<'static> {
    /// Real sleeps, progress to the log.
    pub fn live(limit: RateLimit) -> Self {
        Self {
            limit,
            sleeper: None,
            progress: &LogProgress,
        }
    }
}

impl<'a> CollectContext<'a> {
    pub fn with_sleeper(mut self, sleeper: &'a dyn Sleeper) -> Self {
        self.sleeper = Some(sleeper);
        self
    }

    pub fn with_progress(mut self, progress: &'a dyn CollectProgress) -> Self {
        self.progress = progress;
        self
    }
}

/// Write `value` as pretty JSON through a temp file and rename.
pub fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T, what: &str) -> Result<(), RunError> {
    let json = serde_json::to_vec_pretty(value).map_err(|source| RunError::Serialize {
        what: what.to_string(),
        source,
    })?;
    ensure_parent(path)?;

    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);
    let output_err = |source| RunError::Output {
        path: path.to_path_buf(),
        source,
    };
    std::fs::write(&tmp, json).map_err(output_err)?;
    std::fs::rename(&tmp, path).map_err(|e| {
        let _ = std::fs::remove_file(&tmp);
        output_err(e)
    })?;
    tracing::info!(path = %path.display(), what, "written");
    Ok(())
}

/// Create the parent directory of `path` if it has one.
pub fn ensure_parent(path: &Path) -> Result<(), RunError> {
    match path.parent().filter(|p| !p.as_os_str().is_empty()) {
        Some(parent) => std::fs::create_dir_all(parent).map_err(|source| RunError::Output {
            path: parent.to_path_buf(),
            source,
        }),
        None => Ok(()),
    }
}
