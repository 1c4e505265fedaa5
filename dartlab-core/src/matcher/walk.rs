//! Newest-to-oldest walk over a paginated chart query.
//!
//! The feed always answers newest first, so once a row older than the floor
//! date shows up nothing further back can be of interest: the walk finishes
//! the current page and requests no more.

use crate::data::paginator::{PageStats, Paginator};
use crate::data::provider::{ChartField, ChartQuery, ChartRow, ChartSource, DataError, Granularity};
use crate::domain::{DaySnapshot, PivotSet, PriceBar};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::ops::Range;

/// Which rows of a walk are kept.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RowFilter {
    /// Oldest date of interest. Reaching a row below it ends the walk.
    pub floor: Option<u32>,
    /// Keep only these dates.
    pub dates: Option<BTreeSet<u32>>,
    /// Keep only bar times inside this `HHMM` range.
    pub times: Option<Range<u32>>,
}

impl RowFilter {
    /// Every row, no early exit.
    pub fn all() -> Self {
        Self::default()
    }

    /// Rows on the given pivot dates; the walk stops below the earliest.
    pub fn pivots(pivots: &PivotSet) -> Self {
        Self {
            floor: pivots.min(),
            dates: Some(pivots.as_set().clone()),
            times: None,
        }
    }

    /// Rows on or after `date`.
    pub fn since(date: u32) -> Self {
        Self {
            floor: Some(date),
            ..Self::default()
        }
    }

    pub fn with_times(mut self, times: Range<u32>) -> Self {
        self.times = Some(times);
        self
    }

    fn accepts(&self, date: u32, time: Option<u32>) -> bool {
        if self.floor.is_some_and(|f| date < f) {
            return false;
        }
        if let Some(dates) = &self.dates {
            if !dates.contains(&date) {
                return false;
            }
        }
        match (&self.times, time) {
            (Some(range), Some(t)) => range.contains(&t),
            (Some(_), None) => false,
            (None, _) => true,
        }
    }
}

/// Rows kept by a walk plus what it cost.
#[derive(Debug, Clone, PartialEq)]
pub struct WalkOutcome<T> {
    /// Kept items in source order (newest first).
    pub items: Vec<T>,
    pub stats: PageStats,
    /// The walk stopped because it passed below the floor.
    pub early_exit: bool,
    pub duplicates: usize,
    /// Rows the decoder rejected.
    pub malformed: usize,
}

/// Pull `query` page by page and keep the rows `filter` accepts.
///
/// The query must include the date field. Rows that repeat an earlier
/// `(date, time)` are dropped unless the query is for ticks, where repeated
/// timestamps are normal. `decode` returning `None` skips the row.
pub fn walk<S, T, F>(
    pager: &mut Paginator<'_, S>,
    query: &ChartQuery,
    filter: &RowFilter,
    mut decode: F,
) -> Result<WalkOutcome<T>, DataError>
where
    S: ChartSource + ?Sized,
    F: FnMut(&ChartRow) -> Option<T>,
{
    let date_col = query.column(ChartField::DATE).ok_or_else(|| {
        DataError::ValidationError(format!("query for {} has no date field", query.code))
    })?;
    let time_col = query.column(ChartField::TIME);
    let dedup = query.granularity != Granularity::Tick;

    let mut outcome = WalkOutcome {
        items: Vec::new(),
        stats: PageStats::default(),
        early_exit: false,
        duplicates: 0,
        malformed: 0,
    };
    let mut seen: HashSet<(u32, Option<u32>)> = HashSet::new();

    let mut page = Some(pager.first(query)?);
    while let Some(current) = page.take() {
        for row in &current.rows {
            let Some(date) = row.int(date_col) else {
                outcome.malformed += 1;
                continue;
            };
            if filter.floor.is_some_and(|f| date < f) {
                outcome.early_exit = true;
                break;
            }
            let time = time_col.and_then(|c| row.int(c));
            if !filter.accepts(date, time) {
                continue;
            }
            if dedup && !seen.insert((date, time)) {
                outcome.duplicates += 1;
                continue;
            }
            match decode(row) {
                Some(item) => outcome.items.push(item),
                None => outcome.malformed += 1,
            }
        }
        if outcome.early_exit {
            break;
        }
        page = pager.next_page()?;
    }

    outcome.stats = pager.stats();
    tracing::debug!(
        code = %query.code,
        granularity = %query.granularity.code(),
        pages = outcome.stats.pages,
        kept = outcome.items.len(),
        early_exit = outcome.early_exit,
        duplicates = outcome.duplicates,
        "walk finished"
    );
    Ok(outcome)
}

/// Decoder for bar rows of `query`.
///
/// Missing high/low/close columns fall back to the open column (tick
/// queries carry a single price). Day-level queries have no time column and
/// decode with minute 0.
pub fn bar_decoder(query: &ChartQuery) -> impl Fn(&ChartRow) -> Option<PriceBar> {
    let col = |f| query.column(f);
    let date = col(ChartField::DATE);
    let time = col(ChartField::TIME);
    let open = col(ChartField::OPEN).or(col(ChartField::CLOSE));
    let high = col(ChartField::HIGH).or(open);
    let low = col(ChartField::LOW).or(open);
    let close = col(ChartField::CLOSE).or(open);
    let volume = col(ChartField::VOLUME);

    move |row: &ChartRow| {
        let price = |c: Option<usize>| c.and_then(|c| row.value(c)).filter(|v| v.is_finite());
        Some(PriceBar {
            date: row.int(date?)?,
            minute: match time {
                Some(c) => row.int(c)?,
                None => 0,
            },
            open: price(open)?,
            high: price(high)?,
            low: price(low)?,
            close: price(close)?,
            volume: volume.and_then(|c| row.value(c)).map_or(0, |v| v.max(0.0) as u64),
        })
    }
}

/// Decoder for day snapshot rows of `query`.
pub fn snapshot_decoder(query: &ChartQuery) -> impl Fn(&ChartRow) -> Option<DaySnapshot> {
    let col = |f| query.column(f);
    let date = col(ChartField::DATE);
    let shares = col(ChartField::LISTED_SHARES);
    let cap = col(ChartField::MARKET_CAP);
    let foreign = col(ChartField::FOREIGN_RATIO);
    let turnover = col(ChartField::TURNOVER_RATIO);
    let transaction = col(ChartField::TRANSACTION_RATIO);

    move |row: &ChartRow| {
        let value = |c: Option<usize>| c.and_then(|c| row.value(c)).filter(|v| v.is_finite());
        Some(DaySnapshot {
            date: row.int(date?)?,
            listed_shares: value(shares)?.max(0.0) as u64,
            market_cap: value(cap)?,
            foreign_ratio: value(foreign)?,
            turnover_ratio: value(turnover)?,
            transaction_ratio: value(transaction)?,
        })
    }
}

/// All bars of `query` accepted by `filter`, newest first.
pub fn collect_bars<S: ChartSource + ?Sized>(
    pager: &mut Paginator<'_, S>,
    query: &ChartQuery,
    filter: &RowFilter,
) -> Result<WalkOutcome<PriceBar>, DataError> {
    walk(pager, query, filter, bar_decoder(query))
}

/// Minute bars of `code` on the pivot dates, grouped by date. Bars keep
/// source order (newest first) within a date.
pub fn match_pivot_bars<S: ChartSource + ?Sized>(
    pager: &mut Paginator<'_, S>,
    code: &str,
    pivots: &PivotSet,
) -> Result<BTreeMap<u32, Vec<PriceBar>>, DataError> {
    if pivots.is_empty() {
        return Ok(BTreeMap::new());
    }
    let query = ChartQuery::minute_bars(code);
    let outcome = collect_bars(pager, &query, &RowFilter::pivots(pivots))?;
    let mut by_date: BTreeMap<u32, Vec<PriceBar>> = BTreeMap::new();
    for bar in outcome.items {
        by_date.entry(bar.date).or_default().push(bar);
    }
    Ok(by_date)
}

/// Day snapshots of `code` on the pivot dates.
pub fn match_day_snapshots<S: ChartSource + ?Sized>(
    pager: &mut Paginator<'_, S>,
    code: &str,
    pivots: &PivotSet,
) -> Result<BTreeMap<u32, DaySnapshot>, DataError> {
    if pivots.is_empty() {
        return Ok(BTreeMap::new());
    }
    let query = ChartQuery::day_snapshots(code);
    let outcome = walk(pager, &query, &RowFilter::pivots(pivots), snapshot_decoder(&query))?;
    Ok(outcome.items.into_iter().map(|s| (s.date, s)).collect())
}
