//! Time alignment of disclosures to price bars.
//!
//! - [`walk`]: paginated newest-to-oldest pull with early exit and dedup
//! - [`window`]: the disclosure → bar time window and trading-hours rule

pub mod walk;
pub mod window;

pub use walk::{
    bar_decoder, collect_bars, match_day_snapshots, match_pivot_bars, snapshot_decoder, walk,
    RowFilter, WalkOutcome,
};
pub use window::{Eligibility, TimeWindowMatcher, TradingHours};
