//! Batch collectors over the chart feed and the DART portal.
//!
//! Every broker collector walks stocks one at a time through a single
//! exclusively borrowed [`ChartSource`](dartlab_core::data::ChartSource);
//! a failing stock is logged and counted, and the batch moves on.

pub mod listing;
pub mod minute_dump;
pub mod opening_volume;
pub mod report;
pub mod series;
pub mod stock_meta;

pub use listing::{collect_listing, ListingRun};
pub use minute_dump::{dump_minutes, DumpRun};
pub use opening_volume::{collect_opening_volume, OpeningVolumeRun};
pub use report::{collect_reports, ReportRun};
pub use series::{collect_series, SeriesRun};
pub use stock_meta::{collect_stock_meta, StockMetaRun};
