//! Collection statistics.

use dartlab_core::data::{CollectSummary, PageStats};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Counters for one collector run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CollectionStats {
    /// Stocks (or days, for the listing) attempted.
    pub total: usize,
    pub success: usize,
    pub errors: usize,
    /// Attempted but nothing to keep.
    pub empty: usize,
    /// Rows written.
    pub rows: usize,
    pub pages: usize,
    pub cooldowns: usize,
    #[serde(skip)]
    pub elapsed: Duration,
}

impl CollectionStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Success rate in percent.
    pub fn success_rate(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            (self.success as f64 / self.total as f64) * 100.0
        }
    }

    pub fn add_pages(&mut self, pages: PageStats) {
        self.pages += pages.pages;
        self.cooldowns += pages.cooldowns;
    }

    /// Fold a per-stock batch summary in.
    pub fn absorb(&mut self, summary: &CollectSummary) {
        self.total += summary.total;
        self.success += summary.succeeded;
        self.errors += summary.failed;
        self.rows += summary.rows;
    }

    pub fn log_summary(&self, operation: &str) {
        tracing::info!(
            operation,
            total = self.total,
            success = self.success,
            errors = self.errors,
            empty = self.empty,
            rows = self.rows,
            pages = self.pages,
            cooldowns = self.cooldowns,
            success_rate = format!("{:.1}%", self.success_rate()),
            elapsed = format!("{:.1}s", self.elapsed.as_secs_f64()),
            "collection finished"
        );
    }
}
