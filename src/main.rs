use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use chrono::{Local, NaiveDate, Utc};
use clap::{Parser, Subcommand};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use rank_tracker::db::DATE_FORMAT;
use rank_tracker::{run_batch, BatchOptions, Config, FileSource, JsonNotifier, Store};

#[derive(Parser)]
#[command(name = "rank-tracker")]
#[command(about = "Track ranked listings over time and report rank changes")]
#[command(version)]
struct Cli {
    /// YAML config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Database path (overrides config)
    #[arg(long, global = true)]
    db: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Ingest one document and report the comparison
    Run {
        /// Listing document, or `-` for stdin
        #[arg(long)]
        input: PathBuf,
        /// Batch date (defaults to today)
        #[arg(long, value_parser = parse_date)]
        date: Option<NaiveDate>,
        /// Write the JSON report here instead of stdout
        #[arg(long)]
        output: Option<PathBuf>,
        /// Skip rows with unparseable numbers instead of aborting
        #[arg(long)]
        lenient: bool,
        #[arg(long)]
        top: Option<usize>,
    },
    /// Show the stored top N for a date
    Top {
        #[arg(long, value_parser = parse_date)]
        date: Option<NaiveDate>,
        #[arg(long)]
        top: Option<usize>,
    },
    /// Show an item's dated rank history
    History { item_id: String },
}

fn parse_date(text: &str) -> std::result::Result<NaiveDate, String> {
    NaiveDate::parse_from_str(text, DATE_FORMAT).map_err(|e| format!("expected YYYY-MM-DD: {e}"))
}

fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    // stdout carries the report; logs go to stderr
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match Config::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("❌ {err}");
            return ExitCode::FAILURE;
        }
    };
    init_logging(&config.logging.level);

    match dispatch(cli, config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{err:#}");
            ExitCode::FAILURE
        }
    }
}

fn dispatch(cli: Cli, mut config: Config) -> Result<()> {
    if let Some(db) = cli.db {
        config.store.path = db;
    }

    match cli.command {
        Commands::Run {
            input,
            date,
            output,
            lenient,
            top,
        } => run_once(&config, input, date, output, lenient, top),
        Commands::Top { date, top } => show_top(&config, date, top),
        Commands::History { item_id } => show_history(&config, &item_id),
    }
}

fn today() -> NaiveDate {
    Local::now().date_naive()
}

fn open_store(config: &Config) -> Result<Store> {
    Store::open(&config.store.path, &config.store.retry)
        .with_context(|| format!("opening store {}", config.store.path.display()))
}

fn run_once(
    config: &Config,
    input: PathBuf,
    date: Option<NaiveDate>,
    output: Option<PathBuf>,
    lenient: bool,
    top: Option<usize>,
) -> Result<()> {
    let mut options = BatchOptions::new(date.unwrap_or_else(today));
    options.top_n = top.unwrap_or(config.report.top_n);
    options.lookback_days = config.report.lookback_days;
    options.parse = config.parse;
    options.parse.lenient |= lenient;

    let source = FileSource::new(input);
    let notifier = match output {
        Some(path) => JsonNotifier::to_file(path),
        None => JsonNotifier::stdout(),
    };

    // Store handle lives for this batch only
    let mut store = open_store(config)?;
    let outcome = run_batch(&source, &mut store, &notifier, &options, Utc::now())
        .with_context(|| format!("batch for {}", options.date))?;

    info!(
        batch = %outcome.batch_id,
        items = outcome.report.summary.item_count,
        new_items = outcome.report.summary.new_count,
        "batch complete"
    );
    Ok(())
}

fn show_top(config: &Config, date: Option<NaiveDate>, top: Option<usize>) -> Result<()> {
    let store = open_store(config)?;
    let date = date.unwrap_or_else(today);
    let rows = store.top_n_for_date(date, top.unwrap_or(config.report.top_n))?;

    if rows.is_empty() {
        println!("No snapshots for {date}");
        return Ok(());
    }

    println!("📊 Top {} for {date}", rows.len());
    for row in rows {
        println!(
            "{:>3}. {} ({}) | {} | ctx {} | in ${}/M out ${}/M",
            row.rank,
            row.item.display_name,
            row.item.id,
            row.item.provider,
            row.item.context_length,
            row.price_in,
            row.price_out,
        );
    }
    Ok(())
}

fn show_history(config: &Config, item_id: &str) -> Result<()> {
    let store = open_store(config)?;
    let item = store
        .item(item_id)?
        .with_context(|| format!("unknown item {item_id}"))?;

    println!(
        "{} ({}) first seen {}, last seen {}",
        item.display_name,
        item.id,
        item.first_seen.format("%Y-%m-%d"),
        item.last_seen.format("%Y-%m-%d")
    );
    for snap in store.rank_history(item_id)? {
        println!("  {}  #{}  metric {}", snap.date, snap.rank, snap.weekly_metric);
    }
    Ok(())
}
