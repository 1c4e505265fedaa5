//! DartLab Runner: collection orchestration on top of `dartlab-core`.
//!
//! This crate provides:
//! - TOML configuration with defaults for every section
//! - The disclosure → price annotation pipeline
//! - Batch collectors: minute dump, field series, opening-volume ranking,
//!   stock metadata, DART listing, disclosure documents
//! - Per-run collection statistics

pub mod collectors;
pub mod config;
pub mod pipeline;
pub mod runner;
pub mod stats;

pub use collectors::{
    collect_listing, collect_opening_volume, collect_reports, collect_series, collect_stock_meta,
    dump_minutes, DumpRun, ListingRun, OpeningVolumeRun, ReportRun, SeriesRun, StockMetaRun,
};
pub use config::{CollectorConfig, ConfigError, API_KEY_ENV};
pub use pipeline::{
    AnnotatedDisclosure, CategoryReport, CategoryRows, CollectionPipeline, PipelineOutcome,
};
pub use runner::{write_json, CollectContext, RunError};
pub use stats::CollectionStats;
