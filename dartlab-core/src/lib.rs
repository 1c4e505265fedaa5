//! DartLab Core: disclosure and chart-feed collection primitives.
//!
//! - Domain types (disclosures, bars, day snapshots, pivots)
//! - Chart-source contract with rate-limited pagination
//! - Newest-to-oldest walks with early exit, and the disclosure time window
//! - Per-date volume ranking
//! - Stock-code cache, columnar dump, disclosure files
//! - DART portal listing, disclosure documents and company lookup

pub mod dart;
pub mod data;
pub mod domain;
pub mod matcher;
pub mod ranking;

#[cfg(test)]
mod tests {
    use super::*;

    /// Compile-time check: plain data types can cross threads, so a future
    /// writer thread needs no retrofit.
    #[allow(dead_code)]
    fn assert_send_sync() {
        fn require_send<T: Send>() {}
        fn require_sync<T: Sync>() {}

        require_send::<domain::DisclosureEvent>();
        require_sync::<domain::DisclosureEvent>();
        require_send::<domain::PriceBar>();
        require_sync::<domain::PriceBar>();
        require_send::<domain::DaySnapshot>();
        require_sync::<domain::DaySnapshot>();
        require_send::<domain::MatchedPrice>();
        require_sync::<domain::MatchedPrice>();
        require_send::<domain::PivotSet>();
        require_sync::<domain::PivotSet>();

        require_send::<data::ChartQuery>();
        require_sync::<data::ChartQuery>();
        require_send::<data::DataError>();
        require_sync::<data::DataError>();
        require_send::<data::ReplaySource>();
        require_send::<data::ColumnarDump>();
        require_send::<ranking::VolumeRankMap>();
        require_sync::<ranking::VolumeRankMap>();
        require_send::<matcher::TradingHours>();
        require_sync::<matcher::TradingHours>();
    }

    /// The chart source is driven through `&mut self` only: a shared
    /// reference cannot start or continue a query.
    #[test]
    fn chart_source_needs_exclusive_access() {
        fn _start(src: &mut dyn data::ChartSource, q: &data::ChartQuery) {
            let _ = src.request(q);
            let _ = src.request_next();
        }
        fn _peek(src: &dyn data::ChartSource) -> u32 {
            src.remaining_requests()
        }
    }
}
