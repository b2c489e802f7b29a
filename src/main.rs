use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::info;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use chart_enrich::aggregate::{aggregate, parse_band};
use chart_enrich::config::{
    PipelineConfig, RetrySettings, DEFAULT_BATCH_SIZE, DEFAULT_CALL_INTERVAL, DEFAULT_MAX_RETRIES,
    DEFAULT_RETRY_DELAY,
};
use chart_enrich::lyrics::LyricFetcher;
use chart_enrich::matcher::MetadataMatcher;
use chart_enrich::models::MAX_RANK;
use chart_enrich::pipeline::Pipeline;
use chart_enrich::progress::{format_duration, set_log_only};
use chart_enrich::providers::{LrclibClient, SpotifyClient};
use chart_enrich::retry::Throttle;
use chart_enrich::safety::{validate_db_path, validate_truncate};
use chart_enrich::sources::{LinesFile, RankSource};
use chart_enrich::store::SongStore;

#[derive(Parser)]
#[command(name = "chart-enrich")]
#[command(about = "Enrich a ranked song chart with track metadata and lyric statistics")]
struct Cli {
    /// SQLite database holding the songs table (created if missing)
    #[arg(long, global = true, default_value = "songs.sqlite3")]
    db: PathBuf,

    /// Hide progress bars and log periodic progress lines instead
    #[arg(long, global = true)]
    log_only: bool,

    /// Write run statistics as JSON to this file
    #[arg(long, global = true)]
    stats_json: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Aggregate both rank bands and enrich every pending entry
    Run {
        #[command(flatten)]
        sources: SourceArgs,

        #[command(flatten)]
        enrich: EnrichArgs,
    },

    /// Retry lookups for stored rows that still carry sentinel values
    Backfill {
        #[command(flatten)]
        enrich: EnrichArgs,
    },

    /// Delete rows ranked below --max-rank
    Truncate {
        #[arg(long, default_value_t = MAX_RANK)]
        max_rank: u32,

        /// Allow removing more rows than are kept
        #[arg(long)]
        force: bool,
    },

    /// Show row counts and schema version
    Status,
}

#[derive(Args)]
struct SourceArgs {
    /// "Artist, Title" lines for the top band (ranks 1..)
    #[arg(long)]
    recent: PathBuf,

    /// "Artist, Title" lines for the band continuing after it
    #[arg(long)]
    older: PathBuf,

    /// The recent band file counts down to rank 1 (reversed on read)
    #[arg(long)]
    recent_descending: bool,

    /// The older band file counts down (reversed on read)
    #[arg(long)]
    older_descending: bool,
}

#[derive(Args)]
struct EnrichArgs {
    #[arg(long, env = "SPOTIFY_CLIENT_ID", hide_env_values = true)]
    spotify_client_id: String,

    #[arg(long, env = "SPOTIFY_CLIENT_SECRET", hide_env_values = true)]
    spotify_client_secret: String,

    #[arg(long, default_value_t = DEFAULT_BATCH_SIZE)]
    batch_size: usize,

    /// Parallel enrichment workers (1 = sequential)
    #[arg(long, default_value_t = 1)]
    workers: usize,

    /// Transient-error retries per entry
    #[arg(long, default_value_t = DEFAULT_MAX_RETRIES)]
    max_retries: u32,

    #[arg(long, default_value_t = DEFAULT_RETRY_DELAY.as_millis() as u64)]
    retry_delay_ms: u64,

    /// Double the retry delay after each retry
    #[arg(long)]
    exponential: bool,

    /// Minimum gap between calls to the same provider
    #[arg(long, default_value_t = DEFAULT_CALL_INTERVAL.as_millis() as u64)]
    call_delay_ms: u64,
}

type LivePipeline = Pipeline<SpotifyClient, LrclibClient>;

fn build_pipeline(args: &EnrichArgs) -> Result<LivePipeline> {
    let retry = RetrySettings {
        max_retries: args.max_retries,
        retry_delay: Duration::from_millis(args.retry_delay_ms),
        exponential: args.exponential,
        call_interval: Duration::from_millis(args.call_delay_ms),
    };
    let config = PipelineConfig {
        batch_size: args.batch_size,
        workers: args.workers,
        ..Default::default()
    };

    let spotify = SpotifyClient::new(&args.spotify_client_id, &args.spotify_client_secret)
        .context("Failed to build Spotify client")?;
    let lrclib = LrclibClient::new().context("Failed to build LRCLIB client")?;

    Ok(Pipeline::new(
        MetadataMatcher::new(spotify, retry.policy(), Arc::new(Throttle::new(retry.call_interval))),
        LyricFetcher::new(lrclib, retry.policy(), Arc::new(Throttle::new(retry.call_interval))),
        config,
    ))
}

fn open_store(db: &Path) -> Result<SongStore> {
    info!("Opening database: {:?}", db);
    SongStore::open(db).with_context(|| format!("Failed to open database {:?}", db))
}

fn run(cli: &Cli, sources: &SourceArgs, enrich: &EnrichArgs) -> Result<()> {
    validate_db_path(&cli.db, &[sources.recent.as_path(), sources.older.as_path()])?;

    let recent = LinesFile::new("recent", &sources.recent, sources.recent_descending);
    let older = LinesFile::new("older", &sources.older, sources.older_descending);
    let entries = aggregate(
        parse_band(recent.name(), &recent.fetch()),
        parse_band(older.name(), &older.fetch()),
    );
    if entries.is_empty() {
        anyhow::bail!("No ranked entries could be read from either source");
    }

    let pipeline = build_pipeline(enrich)?;
    let mut store = open_store(&cli.db)?;
    let stats = pipeline.run(&mut store, &entries)?;
    store.close().context("Failed to close database")?;

    println!("\n{:=<60}", "");
    println!("Enrichment complete!");
    println!("  Entries:   {}", stats.total_entries);
    println!("  Skipped:   {} (already completed)", stats.skipped_completed);
    println!("  Processed: {}", stats.processed);
    println!(
        "  Matched:   {} ({:.1}%, {} via fallback, {} low confidence)",
        stats.metadata_matched,
        stats.match_rate(),
        stats.metadata_fallback_matches,
        stats.low_confidence_matches
    );
    println!("  Unmatched: {}", stats.metadata_unmatched);
    println!("  Lyrics:    {} found, {} missing", stats.lyrics_found, stats.lyrics_missing);
    println!("{:=<60}", "");

    if let Some(path) = &cli.stats_json {
        stats.write_to_file(path)?;
        info!("Stats written to {:?}", path);
    }
    Ok(())
}

fn backfill(cli: &Cli, enrich: &EnrichArgs) -> Result<()> {
    validate_db_path(&cli.db, &[])?;

    let pipeline = build_pipeline(enrich)?;
    let mut store = open_store(&cli.db)?;
    let stats = pipeline.backfill(&mut store)?;
    store.close().context("Failed to close database")?;

    println!("\n{:=<60}", "");
    println!("Backfill complete!");
    println!("  Rows scanned: {}", stats.rows_scanned);
    println!("  Metadata:     {}/{} filled", stats.metadata_filled, stats.metadata_attempted);
    println!("  Lyrics:       {}/{} filled", stats.lyrics_filled, stats.lyrics_attempted);
    println!("  Rows updated: {}", stats.rows_updated);
    println!("{:=<60}", "");

    if let Some(path) = &cli.stats_json {
        stats.write_to_file(path)?;
        info!("Stats written to {:?}", path);
    }
    Ok(())
}

fn truncate(cli: &Cli, max_rank: u32, force: bool) -> Result<()> {
    let store = open_store(&cli.db)?;
    let rows = store.row_count()?;
    validate_truncate(max_rank, rows, force)?;
    let removed = store.truncate(max_rank)?;
    store.close().context("Failed to close database")?;
    println!("Removed {} of {} rows (kept ranks 1..={})", removed, rows, max_rank);
    Ok(())
}

fn status(cli: &Cli) -> Result<()> {
    let store = open_store(&cli.db)?;
    println!("Database:        {}", cli.db.display());
    println!("Schema version:  {}", store.schema_version()?);
    println!("Rows:            {}", store.row_count()?);
    println!("Completed ranks: {}", store.completed_ranks()?.len());
    println!("Needs backfill:  {}", store.backfill_candidates()?.len());
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .from_env_lossy(),
        )
        .init();

    set_log_only(cli.log_only);
    let start = Instant::now();

    match &cli.command {
        Command::Run { sources, enrich } => run(&cli, sources, enrich)?,
        Command::Backfill { enrich } => backfill(&cli, enrich)?,
        Command::Truncate { max_rank, force } => truncate(&cli, *max_rank, *force)?,
        Command::Status => status(&cli)?,
    }

    info!("Done in {}", format_duration(start.elapsed()));
    Ok(())
}
