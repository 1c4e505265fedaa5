//! DartLab CLI: disclosure listing, price annotation and chart dump commands.
//!
//! Commands:
//! - `list`: walk the DART daily filing list and write it as TSV
//! - `annotate`: attach post-disclosure minute bars to every listed filing
//! - `dump-minutes`: full minute history for every listed stock
//! - `series`: configured field series for one stock
//! - `opening-volume`: rank stocks by opening volume, dump their morning window
//! - `meta`: stock directory metadata as JSON
//!
//! Chart commands need a feed: `--replay <dump>` serves a dump written by an
//! earlier run, `--synthetic` a seeded random market.

use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use dartlab_core::dart::{
    DartCompanyLookup, DartPortal, HtmlListingParser, ListingWalker, ReportKind, ReportReader,
};
use dartlab_core::data::{
    CodeLookup, ColumnarDump, ReplaySource, StockCodeCache, StockDirectory, SyntheticMarket,
    Universe,
};
use dartlab_runner::{
    collect_listing, collect_opening_volume, collect_reports, collect_series, collect_stock_meta,
    dump_minutes, CollectContext, CollectionPipeline, CollectionStats, CollectorConfig, RunError,
};

/// Config file read when `--config` is not given, if present.
const DEFAULT_CONFIG: &str = "dartlab.toml";

/// Stocks in the synthetic directory when no universe file exists.
const SYNTHETIC_STOCKS: usize = 20;

#[derive(Parser)]
#[command(
    name = "dartlab",
    about = "DartLab CLI: DART disclosures stitched to Korean chart data"
)]
struct Cli {
    /// Path to a TOML config file. Defaults to ./dartlab.toml when present.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log filter (e.g. `debug`, `dartlab_core=trace`). Overrides RUST_LOG.
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Walk the DART daily filing list and write it as TSV.
    List {
        /// Newest day to list (YYYY-MM-DD). Defaults to today.
        #[arg(long)]
        from: Option<String>,

        /// Calendar days to walk back.
        #[arg(long)]
        days: Option<i64>,

        /// Output file. Defaults to `[listing] output` under the export dir.
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Read the documents behind listed filings into one table per kind.
    Reports {
        /// Report kinds, comma separated (e.g. `treasury_stock,convertible_bond`).
        /// Defaults to `[reports] kinds`.
        #[arg(long, value_delimiter = ',')]
        kind: Vec<String>,
    },
    /// Attach the minute bars following each disclosure.
    Annotate {
        #[command(flatten)]
        source: SourceArgs,

        /// Resolve company ids from the code cache only; no company API calls.
        /// Required with `--synthetic`, whose codes the company API never
        /// returns: seed the cache with synthetic codes first.
        #[arg(long, default_value_t = false)]
        cached_only: bool,
    },
    /// Dump minute bars down to the floor date for every listed stock.
    DumpMinutes {
        #[command(flatten)]
        source: SourceArgs,
    },
    /// Pull the configured field series for one stock.
    Series {
        #[command(flatten)]
        source: SourceArgs,

        /// Stock code. Defaults to `[series] code`.
        #[arg(long)]
        code: Option<String>,
    },
    /// Rank stocks by opening volume and dump their morning window.
    OpeningVolume {
        #[command(flatten)]
        source: SourceArgs,
    },
    /// Write stock directory metadata as JSON.
    Meta {
        /// Use the synthetic directory instead of the universe file.
        #[arg(long, default_value_t = false)]
        synthetic: bool,
    },
}

/// Where chart data comes from.
#[derive(Args)]
struct SourceArgs {
    /// Replay the named dump under the export dir.
    #[arg(long, conflicts_with = "synthetic")]
    replay: Option<String>,

    /// Serve a seeded synthetic market.
    #[arg(long, default_value_t = false)]
    synthetic: bool,

    /// Synthetic market seed.
    #[arg(long, default_value_t = 42)]
    seed: u64,

    /// Synthetic trading days ending today.
    #[arg(long, default_value_t = 60)]
    trading_days: usize,

    /// Rows served per page.
    #[arg(long, default_value_t = 500)]
    page_size: usize,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    dotenvy::dotenv().ok();
    init_logging(cli.log_level.as_deref());

    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::List { from, days, output } => run_list(config, from, days, output),
        Commands::Reports { kind } => run_reports(config, &kind),
        Commands::Annotate {
            source,
            cached_only,
        } => run_annotate(&config, &source, cached_only),
        Commands::DumpMinutes { source } => run_dump_minutes(&config, &source),
        Commands::Series { source, code } => run_series(config, &source, code),
        Commands::OpeningVolume { source } => run_opening_volume(&config, &source),
        Commands::Meta { synthetic } => run_meta(&config, synthetic),
    }
}

fn init_logging(level: Option<&str>) {
    let filter = match level {
        Some(level) => EnvFilter::new(level),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("dartlab=info")),
    };
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

fn load_config(path: Option<&Path>) -> Result<CollectorConfig> {
    match path {
        Some(path) => CollectorConfig::from_file(path)
            .with_context(|| format!("loading config {}", path.display())),
        None if Path::new(DEFAULT_CONFIG).exists() => {
            CollectorConfig::from_file(Path::new(DEFAULT_CONFIG))
                .with_context(|| format!("loading config {DEFAULT_CONFIG}"))
        }
        None => {
            tracing::info!("no config file, using defaults");
            Ok(CollectorConfig::default())
        }
    }
}

fn today() -> NaiveDate {
    chrono::Local::now().date_naive()
}

fn context(config: &CollectorConfig) -> CollectContext<'static> {
    CollectContext::live(config.rate_limit.to_rate_limit())
}

/// The universe file, or the synthetic directory when asked for and no file
/// exists.
fn load_directory(config: &CollectorConfig, synthetic: bool) -> Result<Universe> {
    if config.universe.exists() {
        return Universe::from_file(&config.universe)
            .with_context(|| format!("loading universe {}", config.universe.display()));
    }
    if synthetic {
        tracing::warn!(path = %config.universe.display(), "no universe file, using the synthetic directory");
        return Ok(SyntheticMarket::universe(SYNTHETIC_STOCKS));
    }
    bail!(
        "universe file {} not found; set `universe` in the config",
        config.universe.display()
    )
}

fn open_source(config: &CollectorConfig, args: &SourceArgs, codes: &[String]) -> Result<ReplaySource> {
    if let Some(name) = &args.replay {
        let dump = ColumnarDump::new(&config.export_dir, name);
        let source = ReplaySource::from_dump(&dump, args.page_size)
            .with_context(|| format!("opening dump '{name}' under {}", config.export_dir.display()))?;
        tracing::info!(dump = %name, stocks = source.codes().len(), "replaying dump");
        return Ok(source);
    }
    if args.synthetic {
        let market = SyntheticMarket::new(args.seed, today(), args.trading_days);
        return Ok(market.source(codes, args.page_size));
    }
    bail!("no chart feed available: the broker client is not part of this build, pass --replay <dump> or --synthetic")
}

fn run_list(
    mut config: CollectorConfig,
    from: Option<String>,
    days: Option<i64>,
    output: Option<PathBuf>,
) -> Result<()> {
    if let Some(from) = from {
        config.listing.from = Some(NaiveDate::parse_from_str(&from, "%Y-%m-%d")?);
    }
    if let Some(days) = days {
        config.listing.days = days;
    }
    config.validate()?;
    let output = output.unwrap_or_else(|| config.export_path(&config.listing.output));

    let portal = DartPortal::new(&config.dart.root)?;
    let mut walker = ListingWalker::new(portal, HtmlListingParser::new()?)
        .with_page_size(config.listing.page_size)
        .with_delay(Duration::from_secs(config.dart.listing_delay_secs));
    let run = collect_listing(&mut walker, &config.listing, today(), &output)?;

    println!();
    println!("=== DART Listing ===");
    println!("From:           {}", run.from);
    println!("Days walked:    {}", run.outcome.days);
    println!("Pages:          {}", run.outcome.pages);
    println!("Filings:        {}", run.outcome.events.len());
    println!("Skipped rows:   {}", run.outcome.skipped_rows);
    println!("Written to:     {}", run.output.display());
    Ok(())
}

fn parse_kinds(names: &[String]) -> Result<Vec<ReportKind>> {
    names
        .iter()
        .map(|name| {
            ReportKind::from_name(name.trim()).with_context(|| {
                let known: Vec<&str> = ReportKind::ALL.iter().map(|k| k.name()).collect();
                format!("unknown report kind '{name}', expected one of {}", known.join(", "))
            })
        })
        .collect()
}

fn run_reports(mut config: CollectorConfig, kinds: &[String]) -> Result<()> {
    if !kinds.is_empty() {
        config.reports.kinds = parse_kinds(kinds)?;
    }
    config.validate()?;

    let portal = DartPortal::new(&config.dart.root)?;
    let mut reader =
        ReportReader::new(portal)?.with_delay(Duration::from_secs(config.reports.delay_secs));
    let now = chrono::Local::now().naive_local();
    let runs = collect_reports(
        &mut reader,
        &config.reports,
        &config.pipeline.trading_hours,
        now,
        &config.export_dir,
    )?;

    println!();
    println!("=== Disclosure Documents ===");
    println!(
        "{:<18} {:>8} {:>7} {:>7} {:>10}",
        "Kind", "Records", "Hours", "Old", "Unreadable"
    );
    println!("{}", "-".repeat(54));
    for run in &runs {
        println!(
            "{:<18} {:>8} {:>7} {:>7} {:>10}",
            run.kind.name(),
            run.records.len(),
            run.outside_hours,
            run.too_old,
            run.unreadable
        );
    }
    for run in &runs {
        println!("Written to:     {}", run.output.display());
    }
    Ok(())
}

fn run_annotate(config: &CollectorConfig, args: &SourceArgs, cached_only: bool) -> Result<()> {
    check_annotate_source(args, cached_only)?;
    let codes = if args.synthetic {
        load_directory(config, true)?.listed_codes()
    } else {
        Vec::new()
    };
    let mut source = open_source(config, args, &codes)?;

    if cached_only {
        let lookup = |company_id: &str| -> Option<String> {
            tracing::debug!(company_id, "not in the code cache");
            None
        };
        return annotate_with(config, &mut source, lookup);
    }
    let api_key = config.dart.api_key().ok_or(RunError::MissingApiKey)?;
    let lookup = DartCompanyLookup::new(&config.dart.root, &api_key)?
        .with_delay(Duration::from_secs(config.dart.lookup_delay_secs));
    annotate_with(config, &mut source, lookup)
}

/// A synthetic market only lists `A9000xx` codes, so live company lookups
/// would resolve every filing to a stock it does not serve.
fn check_annotate_source(args: &SourceArgs, cached_only: bool) -> Result<()> {
    if args.synthetic && !cached_only {
        bail!("annotate --synthetic needs --cached-only and a code cache seeded with synthetic codes");
    }
    Ok(())
}

fn annotate_with<L: CodeLookup>(config: &CollectorConfig, source: &mut ReplaySource, lookup: L) -> Result<()> {
    let mut cache = StockCodeCache::open(&config.pipeline.code_cache, lookup);
    let pipeline = CollectionPipeline::new(&config.pipeline);
    let output = config.export_path(&config.pipeline.output);
    let outcome = pipeline.run(source, &mut cache, context(config), Some(&output))?;

    println!();
    println!("=== Disclosure Annotation ===");
    println!(
        "{:<24} {:>7} {:>7} {:>8} {:>7} {:>10} {:>7}",
        "Category", "Loaded", "Queued", "Matched", "Hours", "Unresolved", "Old"
    );
    println!("{}", "-".repeat(78));
    for r in &outcome.reports {
        println!(
            "{:<24} {:>7} {:>7} {:>8} {:>7} {:>10} {:>7}",
            r.name, r.loaded, r.queued, r.matched, r.outside_hours, r.unresolved, r.too_old
        );
    }
    print_stats(&outcome.stats);
    for (code, err) in &outcome.failed_stocks {
        println!("FAILED {code}: {err}");
    }
    println!("Codes cached:   {} ({} looked up)", cache.len(), cache.lookups());
    println!("Written to:     {}", output.display());
    Ok(())
}

fn run_dump_minutes(config: &CollectorConfig, args: &SourceArgs) -> Result<()> {
    let directory = load_directory(config, args.synthetic)?;
    let mut source = open_source(config, args, &directory.listed_codes())?;
    let run = dump_minutes(
        &mut source,
        &directory,
        &config.minute_dump,
        &config.export_dir,
        context(config),
    )?;

    println!();
    println!("=== Minute Dump ===");
    println!("Dump:           {}", run.dump.dir().display());
    println!("Stocks written: {}", run.codes.len());
    print_stats(&run.stats);
    Ok(())
}

fn run_series(mut config: CollectorConfig, args: &SourceArgs, code: Option<String>) -> Result<()> {
    if let Some(code) = code {
        config.series.code = code;
    }
    let mut source = open_source(&config, args, std::slice::from_ref(&config.series.code))?;
    let run = collect_series(&mut source, &config.series, &config.export_dir, context(&config))?;

    println!();
    println!("=== Series {} ===", run.code);
    println!("Columns:        {}", run.columns.names().collect::<Vec<_>>().join(", "));
    println!("Rows:           {}", run.columns.len());
    println!("Dump:           {}", run.dump.dir().display());
    print_stats(&run.stats);
    Ok(())
}

fn run_opening_volume(config: &CollectorConfig, args: &SourceArgs) -> Result<()> {
    let directory = load_directory(config, args.synthetic)?;
    let mut source = open_source(config, args, &directory.listed_codes())?;
    let run = collect_opening_volume(
        &mut source,
        &directory,
        &config.opening_volume,
        &config.export_dir,
        context(config),
    )?;

    println!();
    println!("=== Opening Volume (top {}) ===", config.opening_volume.top_k);
    println!("Dates ranked:   {}", run.ranks.len());
    println!("Rank map:       {}", run.rank_path.display());
    println!("Stocks dumped:  {}", run.codes.len());
    println!("--- Volume pass ---");
    print_stats(&run.volume_stats);
    println!("--- Window pass ---");
    print_stats(&run.window_stats);
    Ok(())
}

fn run_meta(config: &CollectorConfig, synthetic: bool) -> Result<()> {
    let directory = load_directory(config, synthetic)?;
    let output = config.export_path(&config.stock_meta.output);
    let run = collect_stock_meta(&directory, &output)?;

    println!();
    println!("=== Stock Metadata ===");
    println!("Stocks:         {}", run.stocks.len());
    if !run.missing.is_empty() {
        println!("WARNING: {} listed code(s) without metadata", run.missing.len());
    }
    println!("Written to:     {}", run.output.display());
    Ok(())
}

fn print_stats(stats: &CollectionStats) {
    println!(
        "Stocks:         {} ok / {} failed / {} empty of {}",
        stats.success, stats.errors, stats.empty, stats.total
    );
    println!("Rows:           {}", stats.rows);
    println!("Pages:          {} ({} cool-downs)", stats.pages, stats.cooldowns);
    println!("Success rate:   {:.1}%", stats.success_rate());
    println!("Elapsed:        {:.1}s", stats.elapsed.as_secs_f64());
}

#[cfg(test)]
mod tests {
    use super::*;

    fn annotate_args(args: &[&str]) -> (SourceArgs, bool) {
        let cli = Cli::try_parse_from(args).unwrap();
        match cli.command {
            Commands::Annotate {
                source,
                cached_only,
            } => (source, cached_only),
            _ => panic!("expected the annotate command"),
        }
    }

    #[test]
    fn synthetic_annotate_requires_cached_codes() {
        let (source, cached_only) = annotate_args(&["dartlab", "annotate", "--synthetic"]);
        assert!(check_annotate_source(&source, cached_only).is_err());

        let (source, cached_only) =
            annotate_args(&["dartlab", "annotate", "--synthetic", "--cached-only"]);
        assert!(check_annotate_source(&source, cached_only).is_ok());
    }

    #[test]
    fn replayed_annotate_may_look_up_codes() {
        let (source, cached_only) = annotate_args(&["dartlab", "annotate", "--replay", "minute_data"]);
        assert!(check_annotate_source(&source, cached_only).is_ok());
    }

    #[test]
    fn report_kinds_from_flags() {
        let cli = Cli::try_parse_from(["dartlab", "reports", "--kind", "treasury_stock,convertible_bond"])
            .unwrap();
        let Commands::Reports { kind } = cli.command else {
            panic!("expected the reports command");
        };
        assert_eq!(
            parse_kinds(&kind).unwrap(),
            vec![ReportKind::TreasuryStock, ReportKind::ConvertibleBond]
        );
        assert!(parse_kinds(&["cb".to_string()]).is_err());
    }

    #[test]
    fn replay_and_synthetic_conflict() {
        assert!(Cli::try_parse_from(["dartlab", "annotate", "--replay", "x", "--synthetic"]).is_err());
    }
}
