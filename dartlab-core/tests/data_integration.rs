//! Integration tests for the data layer: synthetic feed, pivot walks,
//! columnar dump and replay, code cache and disclosure files working
//! together through the public API.

use chrono::NaiveDate;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use dartlab_core::data::{
    chart_code, read_disclosures, write_disclosures, ChartQuery, ChartSource, ColumnarDump,
    DataError, Paginator, RateLimit, ReplaySource, Sleeper, StockCodeCache, SyntheticMarket,
};
use dartlab_core::domain::{DisclosureEvent, PivotSet};
use dartlab_core::matcher::{collect_bars, match_day_snapshots, match_pivot_bars, RowFilter};

static TEST_COUNTER: AtomicU64 = AtomicU64::new(0);

fn temp_root(tag: &str) -> PathBuf {
    let id = TEST_COUNTER.fetch_add(1, Ordering::SeqCst);
    let dir = std::env::temp_dir().join(format!("dartlab_{tag}_{}_{id}", std::process::id()));
    let _ = std::fs::remove_dir_all(&dir);
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

struct NoSleep;
impl Sleeper for NoSleep {
    fn sleep(&self, _: Duration) {}
}

fn market() -> SyntheticMarket {
    SyntheticMarket::new(42, NaiveDate::from_ymd_opt(2019, 3, 15).unwrap(), 10).without_ticks()
}

fn codes() -> Vec<String> {
    vec!["005930".to_string(), "000660".to_string()]
}

#[test]
fn pivot_walk_over_synthetic_feed_stops_early() {
    let market = market();
    let dates = market.trading_dates();
    let mut source = market.source(&codes(), 200);

    // The two most recent trading days.
    let pivots: PivotSet = dates[dates.len() - 2..].iter().copied().collect();
    let by_date = {
        let mut pager = Paginator::with_sleeper(&mut source, RateLimit::default(), &NoSleep);
        match_pivot_bars(&mut pager, "005930", &pivots).unwrap()
    };

    assert_eq!(by_date.len(), 2);
    for (date, bars) in &by_date {
        assert!(pivots.contains(*date));
        assert_eq!(bars.len(), SyntheticMarket::session_minutes().len());
        // Newest first within a date.
        assert!(bars.windows(2).all(|w| w[0].minute > w[1].minute));
    }

    // Two days of 390 bars at 200 rows a page, plus the page that crosses
    // the floor. Ten days would take 20 pages.
    let pages = source.served().len();
    assert!(pages <= 5, "walk kept paging: {pages} pages");
}

#[test]
fn day_snapshots_cover_each_pivot() {
    let market = market();
    let dates = market.trading_dates();
    let mut source = market.source(&codes(), 3);
    let pivots: PivotSet = [dates[0], dates[4], dates[9]].into_iter().collect();

    let snaps = {
        let mut pager = Paginator::with_sleeper(&mut source, RateLimit::default(), &NoSleep);
        match_day_snapshots(&mut pager, "000660", &pivots).unwrap()
    };
    assert_eq!(snaps.len(), 3);
    for (date, snap) in &snaps {
        assert_eq!(*date, snap.date);
        assert!(snap.listed_shares > 0);
        assert!(snap.market_cap > 0.0);
    }
}

#[test]
fn dump_then_replay_serves_the_same_bars() {
    let root = temp_root("dump_replay");
    let market = market();
    let mut live = market.source(&codes(), 500);
    let dump = ColumnarDump::new(&root, "minutes");

    let mut written = Vec::new();
    for code in codes() {
        let bars = {
            let mut pager = Paginator::with_sleeper(&mut live, RateLimit::default(), &NoSleep);
            let q = ChartQuery::minute_bars(&code);
            collect_bars(&mut pager, &q, &RowFilter::all()).unwrap().items
        };
        let meta = dump.write_stock(&code, &bars).unwrap();
        assert_eq!(meta.rows, bars.len());
        assert_eq!(meta.first_date, Some(market.trading_dates()[0]));
        written.push((code, bars));
    }
    dump.write_keys(&codes()).unwrap();

    let mut replay = ReplaySource::from_dump(&dump, 500).unwrap();
    assert_eq!(replay.codes(), vec![chart_code("000660"), chart_code("005930")]);
    for (code, original) in &written {
        let replayed = {
            let mut pager = Paginator::with_sleeper(&mut replay, RateLimit::default(), &NoSleep);
            let q = ChartQuery::minute_bars(code);
            collect_bars(&mut pager, &q, &RowFilter::all()).unwrap().items
        };
        assert_eq!(&replayed, original, "replay differs for {code}");
    }

    let _ = std::fs::remove_dir_all(&root);
}

#[test]
fn missing_dump_stock_is_reported_by_code() {
    let root = temp_root("dump_missing");
    let dump = ColumnarDump::new(&root, "minutes");
    dump.write_keys(&["005930".to_string()]).unwrap();

    let err = ReplaySource::from_dump(&dump, 10).unwrap_err();
    match err {
        DataError::NoDump { code, .. } => assert_eq!(code, "005930"),
        other => panic!("expected NoDump, got {other:?}"),
    }
    let _ = std::fs::remove_dir_all(&root);
}

#[test]
fn code_cache_survives_reopen() {
    let root = temp_root("code_cache");
    let path = root.join("codes.json");

    let mut first = StockCodeCache::open(&path, |id: &str| match id {
        "00126380" => Some("005930".to_string()),
        _ => None,
    });
    assert_eq!(first.get("00126380").as_deref(), Some("005930"));
    assert_eq!(first.get("99999999"), None);
    assert_eq!(first.lookups(), 2);

    // Reopened cache answers from disk, including the permanent miss.
    let mut second = StockCodeCache::open(&path, |_: &str| -> Option<String> {
        panic!("lookup must not run for cached ids")
    });
    assert_eq!(second.len(), 2);
    assert_eq!(second.get("00126380").as_deref(), Some("005930"));
    assert_eq!(second.get("99999999"), None);
    assert_eq!(second.lookups(), 0);

    let _ = std::fs::remove_dir_all(&root);
}

#[test]
fn disclosure_file_round_trip_on_disk() {
    let root = temp_root("disclosures");
    let path = root.join("list.tsv");
    let at = NaiveDate::from_ymd_opt(2019, 3, 5)
        .unwrap()
        .and_hms_opt(9, 3, 0)
        .unwrap();
    let events = vec![
        DisclosureEvent {
            title: "Supply contract\r\n".into(),
            href: "/dsaf001/main.do?rcpNo=20190305000001".into(),
            company: "Samsung".into(),
            company_id: "00126380".into(),
            disclosed_at: at,
        },
        DisclosureEvent {
            title: "Treasury stock".into(),
            href: "/dsaf001/main.do?rcpNo=20190305000002".into(),
            company: "Hynix".into(),
            company_id: "00164779".into(),
            disclosed_at: at + chrono::Duration::minutes(12),
        },
    ];
    write_disclosures(&path, &events).unwrap();

    let file = read_disclosures(&path).unwrap();
    assert_eq!(file.skipped, 0);
    assert_eq!(file.rows.len(), 2);
    let back: Vec<DisclosureEvent> = file.rows.iter().filter_map(|r| r.to_event()).collect();
    assert_eq!(back[0].title, "Supply contract");
    assert_eq!(back[1].disclosed_at, events[1].disclosed_at);
    assert_eq!(back[0].pivot(), 20190305);

    let _ = std::fs::remove_dir_all(&root);
}

#[test]
fn source_budget_counts_down() {
    let mut source = market().source(&codes(), 10).with_budget(5);
    assert_eq!(source.remaining_requests(), 5);
    let q = ChartQuery::minute_bars("005930");
    source.request(&q).unwrap();
    source.request_next().unwrap();
    assert_eq!(source.remaining_requests(), 3);
}
