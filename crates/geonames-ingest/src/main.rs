//! geonames-ingest - load the gazetteer dump into PostgreSQL

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use geonames_common::config::{IngestSettings, Settings};
use geonames_common::logging::{init_logging, LogConfig, LogLevel};
use geonames_ingest::{db, IngestPipeline};
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "geonames-ingest")]
#[command(author, version, about = "Gazetteer ingestion tool")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Settings file (defaults to an optional config.* in the working directory)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Fetch, parse and upsert the dump
    Download(IngestArgs),

    /// Fetch and parse only; nothing is written to the database
    Parse(IngestArgs),

    /// Apply database migrations
    Migrate,
}

#[derive(Args, Debug, Default)]
struct IngestArgs {
    /// Archive URL
    #[arg(long)]
    url: Option<String>,

    /// Local archive cache
    #[arg(long)]
    cache: Option<PathBuf>,

    /// Rows per upsert transaction
    #[arg(long)]
    batch_size: Option<usize>,

    /// Parser threads
    #[arg(long)]
    workers: Option<usize>,
}

impl IngestArgs {
    fn apply(self, mut settings: IngestSettings) -> IngestSettings {
        if let Some(url) = self.url {
            settings.source_url = url;
        }
        if let Some(cache) = self.cache {
            settings.cache_path = cache;
        }
        if let Some(batch_size) = self.batch_size {
            settings.batch_size = batch_size;
        }
        if let Some(workers) = self.workers {
            settings.workers = workers;
        }
        settings
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.verbose {
        LogLevel::Debug
    } else {
        LogLevel::Info
    };

    let log_config = LogConfig::builder()
        .level(log_level)
        .log_file_prefix("geonames-ingest")
        .build();

    // Environment variables take precedence
    let log_config = log_config.merge_env()?;
    init_logging(&log_config)?;

    let settings = Settings::load_from(cli.config.as_deref()).context("Failed to load settings")?;

    let cancel = CancellationToken::new();
    spawn_interrupt_handler(cancel.clone());

    match cli.command {
        Command::Download(args) => {
            let ingest = args.apply(settings.ingest.clone());
            let pipeline = IngestPipeline::new(ingest)?;

            let pool = db::create_pool(&settings.database).await?;
            let result = async {
                db::run_migrations(&pool).await?;
                pipeline.run(&pool, &cancel).await
            }
            .await;
            pool.close().await;

            let report = result?;
            println!(
                "Upserted {} records in {} batches ({} lines dropped, {:.1}s)",
                report.records_written,
                report.batches_committed,
                report.lines_dropped,
                report.elapsed.as_secs_f64()
            );
        },
        Command::Parse(args) => {
            let ingest = args.apply(settings.ingest.clone());
            let pipeline = IngestPipeline::new(ingest)?;
            let output = pipeline.parse(&cancel).await?;

            println!(
                "Parsed {} records from {} lines ({} dropped)",
                output.records.len(),
                output.lines_read,
                output.lines_dropped
            );
        },
        Command::Migrate => {
            let pool = db::create_pool(&settings.database).await?;
            let result = db::run_migrations(&pool).await;
            pool.close().await;
            result?;
        },
    }

    info!("Done");
    Ok(())
}

fn spawn_interrupt_handler(cancel: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, cancelling run");
            cancel.cancel();
        }
    });
}
