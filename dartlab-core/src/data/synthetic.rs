//! Deterministic synthetic market for offline runs and tests.
//!
//! Each stock gets its own RNG, seeded from the master seed and the stock
//! code through BLAKE3, so a stock's series does not depend on which other
//! stocks are generated alongside it. Output is loaded into a
//! [`ReplaySource`] and served exactly like recorded data.

use super::provider::{chart_code, ChartField, ChartRow, Granularity};
use super::replay::ReplaySource;
use super::universe::{Market, StockMeta, Universe};
use crate::domain::pivot_date;
use chrono::{Datelike, Duration, NaiveDate, Weekday};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Field layout of generated day rows.
pub const DAY_FIELDS: [ChartField; 11] = [
    ChartField::DATE,
    ChartField::OPEN,
    ChartField::HIGH,
    ChartField::LOW,
    ChartField::CLOSE,
    ChartField::VOLUME,
    ChartField::LISTED_SHARES,
    ChartField::MARKET_CAP,
    ChartField::FOREIGN_RATIO,
    ChartField::TURNOVER_RATIO,
    ChartField::TRANSACTION_RATIO,
];

/// Generated series for one stock, newest first.
#[derive(Debug, Clone, Default)]
pub struct SyntheticSeries {
    pub minutes: Vec<ChartRow>,
    pub days: Vec<ChartRow>,
    pub ticks: Vec<ChartRow>,
}

/// Seeded random-walk market over a fixed run of trading days.
#[derive(Debug, Clone)]
pub struct SyntheticMarket {
    seed: u64,
    end: NaiveDate,
    trading_days: usize,
    ticks: bool,
}

impl SyntheticMarket {
    /// `trading_days` weekdays ending at `end` (inclusive when `end` is a
    /// weekday).
    pub fn new(seed: u64, end: NaiveDate, trading_days: usize) -> Self {
        Self {
            seed,
            end,
            trading_days,
            ticks: true,
        }
    }

    /// Skip tick generation (ticks dominate memory for long runs).
    pub fn without_ticks(mut self) -> Self {
        self.ticks = false;
        self
    }

    /// Trading dates as `YYYYMMDD`, oldest first.
    pub fn trading_dates(&self) -> Vec<u32> {
        let mut dates = Vec::with_capacity(self.trading_days);
        let mut day = self.end;
        while dates.len() < self.trading_days {
            if !matches!(day.weekday(), Weekday::Sat | Weekday::Sun) {
                dates.push(pivot_date(day));
            }
            day -= Duration::days(1);
        }
        dates.reverse();
        dates
    }

    /// Regular session minutes as `HHMM`, 09:01 through 15:30.
    pub fn session_minutes() -> Vec<u32> {
        (9 * 60 + 1..=15 * 60 + 30)
            .map(|m| (m / 60) * 100 + m % 60)
            .collect()
    }

    fn rng_for(&self, code: &str) -> StdRng {
        let mut hasher = blake3::Hasher::new();
        hasher.update(&self.seed.to_le_bytes());
        hasher.update(code.as_bytes());
        let hash = hasher.finalize();
        let mut seed = [0u8; 32];
        seed.copy_from_slice(hash.as_bytes());
        StdRng::from_seed(seed)
    }

    /// Generate every series for `code`.
    pub fn series(&self, code: &str) -> SyntheticSeries {
        let code = chart_code(code);
        let mut rng = self.rng_for(&code);
        let minutes_of_day = Self::session_minutes();

        let listed_shares: f64 = rng.gen_range(1_000_000u64..50_000_000) as f64;
        let mut price: f64 = rng.gen_range(5_000u32..100_000) as f64;
        let mut foreign_ratio: f64 = rng.gen_range(1.0..50.0);

        let mut out = SyntheticSeries::default();
        for date in self.trading_dates() {
            let day_open = price;
            let (mut day_high, mut day_low) = (price, price);
            let mut day_volume = 0.0;

            for &minute in &minutes_of_day {
                let open = price;
                let close = (open * (1.0 + rng.gen_range(-0.004..0.004))).round().max(1.0);
                let high = open.max(close) + rng.gen_range(0.0..open * 0.002).round();
                let low = (open.min(close) - rng.gen_range(0.0..open * 0.002).round()).max(1.0);
                // Opening auction prints land on the first bar.
                let volume = f64::from(if minute == 901 {
                    rng.gen_range(5_000u32..200_000)
                } else {
                    rng.gen_range(0u32..20_000)
                });

                if self.ticks {
                    for _ in 0..rng.gen_range(0..3) {
                        let px = rng.gen_range(low..=high).round();
                        let qty = rng.gen_range(1u32..500) as f64;
                        out.ticks
                            .push(ChartRow(vec![date as f64, minute as f64, px, qty]));
                    }
                }
                out.minutes.push(ChartRow(vec![
                    date as f64,
                    minute as f64,
                    open,
                    high,
                    low,
                    close,
                    volume,
                ]));

                day_high = day_high.max(high);
                day_low = day_low.min(low);
                day_volume += volume;
                price = close;
            }

            foreign_ratio = (foreign_ratio + rng.gen_range(-0.3..0.3)).clamp(0.0, 100.0);
            let turnover = day_volume / listed_shares * 100.0;
            out.days.push(ChartRow(vec![
                date as f64,
                day_open,
                day_high,
                day_low,
                price,
                day_volume,
                listed_shares,
                (price * listed_shares / 1_000_000.0).round(),
                (foreign_ratio * 100.0).round() / 100.0,
                (turnover * 100.0).round() / 100.0,
                rng.gen_range(50.0..150.0f64).round(),
            ]));
        }

        out.minutes.reverse();
        out.days.reverse();
        out.ticks.reverse();
        out
    }

    /// Replay source holding minute, day and tick series for `codes`.
    pub fn source(&self, codes: &[String], page_size: usize) -> ReplaySource {
        let mut source = ReplaySource::new(page_size).named("synthetic");
        for code in codes {
            let code = chart_code(code);
            let series = self.series(&code);
            source.insert_rows(&code, Granularity::Minute, &ChartField::MINUTE_BAR, series.minutes);
            source.insert_rows(&code, Granularity::Day, &DAY_FIELDS, series.days);
            if self.ticks {
                source.insert_rows(&code, Granularity::Tick, &ChartField::TICK, series.ticks);
            }
        }
        tracing::debug!(stocks = codes.len(), days = self.trading_days, "synthetic market generated");
        source
    }

    /// Directory of `count` synthetic stocks alternating between markets.
    pub fn universe(count: usize) -> Universe {
        let mut universe = Universe::default();
        for i in 0..count {
            let market = if i % 2 == 0 { Market::Kospi } else { Market::Kosdaq };
            universe.insert(
                &format!("A9{:05}", i + 1),
                StockMeta {
                    name: format!("SYN{:03}", i + 1),
                    lot_size: 1,
                    market,
                    section_kind: 1,
                    listed_date: 20000101,
                },
            );
        }
        universe
    }
}
