//! Property tests for collection invariants.
//!
//! Uses proptest to verify:
//! 1. Early exit: a pivot walk keeps exactly the brute-force matches and
//!    never requests a page past the first one that crosses the floor
//! 2. Window matching: the matched set does not depend on bar order
//! 3. Ranking bounds: at most K stocks per date, none outranked by a
//!    stock left out
//! 4. Cache permanence: one lookup per distinct company id

use proptest::prelude::*;
use std::collections::{BTreeSet, HashSet};
use std::time::Duration;

use dartlab_core::data::code_cache::StockCodeCache;
use dartlab_core::data::paginator::{Paginator, RateLimit, Sleeper};
use dartlab_core::data::provider::{ChartField, ChartRow, Granularity};
use dartlab_core::data::replay::ReplaySource;
use dartlab_core::domain::{PivotSet, PriceBar};
use dartlab_core::matcher::{match_pivot_bars, TimeWindowMatcher};
use dartlab_core::ranking::{VolumeRanker, VolumeSeries};

struct NoSleep;
impl Sleeper for NoSleep {
    fn sleep(&self, _: Duration) {}
}

const DATES: [u32; 8] = [
    20190304, 20190305, 20190306, 20190307, 20190308, 20190311, 20190312, 20190313,
];

/// `per_day` minute rows per date, newest first.
fn feed(per_day: u32) -> Vec<ChartRow> {
    let mut rows = Vec::new();
    for &d in DATES.iter().rev() {
        for m in (0..per_day).rev() {
            rows.push(ChartRow(vec![
                d as f64,
                (901 + m) as f64,
                100.0,
                100.0,
                100.0,
                100.0,
                m as f64,
            ]));
        }
    }
    rows
}

// ── Strategies (proptest) ────────────────────────────────────────────

fn arb_pivots() -> impl Strategy<Value = PivotSet> {
    proptest::sample::subsequence(DATES.to_vec(), 1..=4).prop_map(|v| v.into_iter().collect())
}

fn arb_bar() -> impl Strategy<Value = PriceBar> {
    (0u32..3, 0u32..120).prop_map(|(day, offset)| {
        let minute = 9 * 60 + offset;
        PriceBar {
            date: 20190304 + day,
            minute: (minute / 60) * 100 + minute % 60,
            open: 1.0,
            high: 1.0,
            low: 1.0,
            close: 1.0,
            volume: offset as u64,
        }
    })
}

// ── 1. Early exit ────────────────────────────────────────────────────

proptest! {
    #[test]
    fn pivot_walk_matches_brute_force(
        pivots in arb_pivots(),
        page_size in 1usize..40,
        per_day in 1u32..12,
    ) {
        let rows = feed(per_day);
        let floor = pivots.min().unwrap();
        let expected: usize = rows
            .iter()
            .filter(|r| pivots.contains(r.int(0).unwrap()))
            .count();
        // Index of the first row below the floor, if any.
        let cut = rows.iter().position(|r| r.int(0).unwrap() < floor);

        let mut src = ReplaySource::new(page_size);
        src.insert_rows("A005930", Granularity::Minute, &ChartField::MINUTE_BAR, rows.clone());
        let by_date = {
            let mut pager = Paginator::with_sleeper(&mut src, RateLimit::default(), &NoSleep);
            match_pivot_bars(&mut pager, "005930", &pivots).unwrap()
        };

        let kept: usize = by_date.values().map(Vec::len).sum();
        prop_assert_eq!(kept, expected);
        prop_assert!(by_date.keys().all(|d| pivots.contains(*d)));

        let pages_needed = match cut {
            Some(i) => i / page_size + 1,
            None => rows.len().div_ceil(page_size),
        };
        prop_assert_eq!(src.served().len(), pages_needed);
    }
}

// ── 2. Window matching ───────────────────────────────────────────────

proptest! {
    #[test]
    fn window_matching_is_order_independent(
        bars in proptest::collection::vec(arb_bar(), 0..60),
        at_offset in 0i64..120,
    ) {
        let at = chrono::NaiveDate::from_ymd_opt(2019, 3, 5).unwrap().and_hms_opt(9, 0, 0).unwrap()
            + chrono::Duration::minutes(at_offset);
        let matcher = TimeWindowMatcher::default();

        let forward: HashSet<(u32, u32, u64)> = matcher
            .matching(at, &bars)
            .into_iter()
            .map(|b| (b.date, b.minute, b.volume))
            .collect();
        let mut reversed = bars.clone();
        reversed.reverse();
        let backward: HashSet<(u32, u32, u64)> = matcher
            .matching(at, &reversed)
            .into_iter()
            .map(|b| (b.date, b.minute, b.volume))
            .collect();
        prop_assert_eq!(&forward, &backward);

        for b in matcher.matching(at, &bars) {
            let ts = b.timestamp().unwrap();
            prop_assert!(ts >= at && ts - at <= chrono::Duration::minutes(7));
        }
    }
}

// ── 3. Ranking bounds ────────────────────────────────────────────────

proptest! {
    #[test]
    fn ranking_keeps_top_k(
        obs in proptest::collection::vec((0usize..6, 0u32..4, 0u64..50), 0..80),
        top_k in 1usize..5,
    ) {
        let mut series = VolumeSeries::new();
        for (stock, day, volume) in &obs {
            series.record(&format!("A00000{stock}"), 20190301 + day, *volume);
        }
        let ranks = VolumeRanker::new(top_k).rank(&series);
        prop_assert_eq!(ranks.len(), series.dates().len());

        for date in ranks.dates() {
            let kept = ranks.get(date).unwrap();
            prop_assert!(kept.len() <= top_k);
            let kept_set: BTreeSet<&String> = kept.iter().collect();
            let min_kept = kept.iter().filter_map(|c| series.get(c, date)).min().unwrap();
            for stock in 0..6 {
                let code = format!("A00000{stock}");
                if let Some(v) = series.get(&code, date) {
                    if !kept_set.contains(&code) {
                        prop_assert!(v <= min_kept);
                    }
                }
            }
            let volumes: Vec<u64> = kept.iter().filter_map(|c| series.get(c, date)).collect();
            prop_assert!(volumes.windows(2).all(|w| w[0] >= w[1]));
        }
    }
}

// ── 4. Cache permanence ──────────────────────────────────────────────

proptest! {
    #[test]
    fn one_lookup_per_distinct_id(ids in proptest::collection::vec(0u8..10, 0..40)) {
        let mut cache = StockCodeCache::in_memory(|id: &str| {
            id.ends_with(['0', '2', '4']).then(|| format!("00{id}"))
        });
        for id in &ids {
            let got = cache.get(&format!("co{id}"));
            prop_assert_eq!(got.is_some(), matches!(id, 0 | 2 | 4));
        }
        let distinct: HashSet<&u8> = ids.iter().collect();
        prop_assert_eq!(cache.lookups(), distinct.len());
    }
}
