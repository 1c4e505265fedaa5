//! Page-by-page driver for a [`ChartSource`] with rate-limit backpressure.
//!
//! The chart feed exposes a remaining-request counter. Before every page
//! after the first, the paginator reads it; when it drops below the
//! threshold the calling thread blocks for a fixed cool-down. There is no
//! queue and no retry: a non-zero status ends the pull.

use super::provider::{ChartPage, ChartQuery, ChartSource, DataError};
use std::time::Duration;

/// Cool-down policy applied between pages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimit {
    /// Cool down when fewer than this many requests remain.
    pub threshold: u32,
    pub cooldown: Duration,
}

impl RateLimit {
    pub fn new(threshold: u32, cooldown: Duration) -> Self {
        Self {
            threshold,
            cooldown,
        }
    }
}

impl Default for RateLimit {
    /// Two remaining requests, fifteen seconds.
    fn default() -> Self {
        Self::new(2, Duration::from_secs(15))
    }
}

/// Blocking pause. Swapped out in tests so cool-downs can be observed.
pub trait Sleeper {
    fn sleep(&self, duration: Duration);
}

/// Sleeps the current thread.
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// Counters for one paginated pull.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PageStats {
    pub pages: usize,
    pub rows: usize,
    pub cooldowns: usize,
}

/// Drives one query across pages of an exclusively borrowed source.
pub struct Paginator<'s, S: ChartSource + ?Sized> {
    source: &'s mut S,
    limit: RateLimit,
    sleeper: &'s dyn Sleeper,
    has_more: bool,
    stats: PageStats,
}

static THREAD_SLEEPER: ThreadSleeper = ThreadSleeper;

impl<'s, S: ChartSource + ?Sized> Paginator<'s, S> {
    pub fn new(source: &'s mut S, limit: RateLimit) -> Self {
        Self::with_sleeper(source, limit, &THREAD_SLEEPER)
    }

    pub fn with_sleeper(source: &'s mut S, limit: RateLimit, sleeper: &'s dyn Sleeper) -> Self {
        Self {
            source,
            limit,
            sleeper,
            has_more: false,
            stats: PageStats::default(),
        }
    }

    /// Start `query` and return its first page. No budget check is made
    /// before the first page.
    pub fn first(&mut self, query: &ChartQuery) -> Result<ChartPage, DataError> {
        self.stats = PageStats::default();
        self.has_more = false;
        let page = self.source.request(query).map_err(|e| {
            tracing::warn!(source = self.source.name(), code = %query.code, error = %e, "first page failed");
            e
        })?;
        self.record(&page);
        Ok(page)
    }

    /// Next page of the current query, or `None` once the source reports no
    /// more pages. Blocks for the cool-down first if the budget is low.
    pub fn next_page(&mut self) -> Result<Option<ChartPage>, DataError> {
        if !self.has_more {
            return Ok(None);
        }

        let remaining = self.source.remaining_requests();
        if remaining < self.limit.threshold {
            tracing::debug!(
                remaining,
                cooldown_secs = self.limit.cooldown.as_secs_f64(),
                "request budget low, cooling down"
            );
            self.sleeper.sleep(self.limit.cooldown);
            self.stats.cooldowns += 1;
        }

        let page = self.source.request_next().map_err(|e| {
            tracing::warn!(source = self.source.name(), page = self.stats.pages + 1, error = %e, "page request failed");
            e
        })?;
        self.record(&page);
        Ok(Some(page))
    }

    /// Whether the source reported more pages after the last one.
    pub fn has_more(&self) -> bool {
        self.has_more
    }

    pub fn stats(&self) -> PageStats {
        self.stats
    }

    fn record(&mut self, page: &ChartPage) {
        self.has_more = page.has_more;
        self.stats.pages += 1;
        self.stats.rows += page.rows.len();
    }
}
