//! DART disclosure portal: the daily filing list, disclosure documents and
//! the company API.

pub mod company;
pub mod listing;
pub mod report;

pub use company::DartCompanyLookup;
pub use listing::{
    DartPortal, HtmlListingParser, ListingFetch, ListingOutcome, ListingPage, ListingParser,
    ListingWalker, DART_ROOT, DEFAULT_PAGE_SIZE,
};
pub use report::{
    write_report_table, DocumentLocator, DocumentRef, ReportFetch, ReportFields, ReportKind,
    ReportParser, ReportReader, ReportRecord,
};
