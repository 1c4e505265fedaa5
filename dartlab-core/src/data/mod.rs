//! Data access: chart sources, pagination, persistence.

pub mod code_cache;
pub mod disclosure;
pub mod download;
pub mod dump;
pub mod paginator;
pub mod provider;
pub mod replay;
pub mod synthetic;
pub mod universe;

pub use code_cache::{CodeLookup, StockCodeCache};
pub use disclosure::{read_disclosures, write_disclosures, DisclosureFile};
pub use download::{collect_stocks, CollectSummary};
pub use dump::{ColumnarDump, DumpMeta, OhlcvColumns, SeriesColumns};
pub use paginator::{PageStats, Paginator, RateLimit, Sleeper, ThreadSleeper};
pub use provider::{
    chart_code, ChartField, ChartPage, ChartQuery, ChartRow, ChartSource, CollectProgress,
    DataError, Granularity, LogProgress, DEFAULT_MAX_ROWS,
};
pub use replay::ReplaySource;
pub use synthetic::SyntheticMarket;
pub use universe::{Market, StockDirectory, StockMeta, Universe};
