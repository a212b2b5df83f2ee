//! IMDb Ingest - dataset synchronization tool

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use imdb_common::logging::{init_logging, LogConfig, LogLevel};
use imdb_ingest::datasets::{DatasetKind, Episode, Rating, Title, TitleAka};
use imdb_ingest::decode::{FieldDeclaration, Row, Schema, TsvDecoder};
use imdb_ingest::source::StagedFile;
use imdb_ingest::store::{ImdbStore, MemoryStore, PgStore};
use imdb_ingest::{SyncConfig, SyncOrchestrator};
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use sqlx::postgres::PgPoolOptions;
use std::io::BufRead;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "imdb-ingest")]
#[command(author, version, about = "IMDb dataset ingestion tool")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Download and ingest every configured dataset once
    Sync {
        /// Ingest into an in-memory store instead of PostgreSQL
        #[arg(long)]
        dry_run: bool,

        /// PostgreSQL connection string
        #[arg(long, env = "DATABASE_URL")]
        database_url: Option<String>,
    },

    /// Decode a local dataset file and print records as JSON lines
    Inspect {
        /// Dataset file (`.tsv` or `.tsv.gz`)
        file: PathBuf,

        /// Decode with a built-in dataset schema
        #[arg(long, conflicts_with = "fields")]
        dataset: Option<DatasetKind>,

        /// Field declaration `name:kind[:column]`, repeatable
        #[arg(long = "field", value_name = "DECL")]
        fields: Vec<FieldDeclaration>,

        /// Raw value treated as absent, repeatable (defaults to `\N`)
        #[arg(long = "empty-value", value_name = "TOKEN")]
        empty_values: Vec<String>,

        /// Stop after this many records
        #[arg(short, long, default_value_t = 10)]
        limit: usize,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let log_level = if cli.verbose {
        LogLevel::Debug
    } else {
        LogLevel::Info
    };
    let log_config = LogConfig::builder()
        .level(log_level)
        .log_file_prefix("imdb-ingest")
        .build();
    let log_config = LogConfig::from_env_or(log_config.clone()).unwrap_or(log_config);
    init_logging(&log_config)?;

    match cli.command {
        Command::Sync {
            dry_run,
            database_url,
        } => {
            let config = SyncConfig::from_env()?;
            if dry_run {
                info!("Dry run: ingesting into memory");
                sync(&config, Arc::new(MemoryStore::new())).await?;
            } else {
                let url = database_url
                    .context("DATABASE_URL is required unless --dry-run is given")?;
                let pool = PgPoolOptions::new()
                    .max_connections(4)
                    .connect(&url)
                    .await
                    .context("Failed to connect to database")?;
                sqlx::migrate!("../../migrations")
                    .run(&pool)
                    .await
                    .context("Failed to run migrations")?;
                sync(&config, Arc::new(PgStore::new(pool))).await?;
            }
        },
        Command::Inspect {
            file,
            dataset,
            fields,
            empty_values,
            limit,
        } => {
            let empty_values = if empty_values.is_empty() {
                vec![imdb_ingest::config::DEFAULT_EMPTY_VALUE.to_string()]
            } else {
                empty_values
            };

            match (dataset, fields.is_empty()) {
                (Some(DatasetKind::Titles), _) => {
                    inspect(&file, Title::schema()?, &empty_values, limit)?
                },
                (Some(DatasetKind::Episodes), _) => {
                    inspect(&file, Episode::schema()?, &empty_values, limit)?
                },
                (Some(DatasetKind::Ratings), _) => {
                    inspect(&file, Rating::schema()?, &empty_values, limit)?
                },
                (Some(DatasetKind::Akas), _) => {
                    inspect(&file, TitleAka::schema()?, &empty_values, limit)?
                },
                (None, false) => inspect(&file, Row::schema(&fields)?, &empty_values, limit)?,
                (None, true) => anyhow::bail!("Either --dataset or at least one --field is required"),
            }
        },
    }

    Ok(())
}

async fn sync<S: ImdbStore>(config: &SyncConfig, store: Arc<S>) -> Result<()> {
    let client = reqwest::Client::builder()
        .user_agent(concat!("imdb-ingest/", env!("CARGO_PKG_VERSION")))
        .build()?;
    let orchestrator = SyncOrchestrator::for_store(config, client, store)?;

    let spinner = create_spinner("Synchronizing")?;
    let mut states = orchestrator.subscribe();
    let watcher = {
        let spinner = spinner.clone();
        tokio::spawn(async move {
            while states.changed().await.is_ok() {
                let state = states.borrow_and_update().clone();
                spinner.set_message(format!("{state:?}"));
            }
        })
    };

    let result = orchestrator.run_sync().await;
    watcher.abort();
    spinner.finish_and_clear();

    let report = result?;
    println!("{}", serde_json::to_string_pretty(&report)?);

    let statistics = orchestrator.statistics().get().await?;
    println!(
        "{}",
        serde_json::to_string_pretty(&statistics.to_json(orchestrator.statistics().spec()))?
    );
    Ok(())
}

fn inspect<R: Serialize>(
    file: &Path,
    schema: Schema<R>,
    empty_values: &[String],
    limit: usize,
) -> Result<()> {
    let decoder = TsvDecoder::new(Arc::new(schema)).with_empty_values(empty_values.iter().cloned());

    let reader: Box<dyn BufRead> = if file.extension().is_some_and(|ext| ext == "gz") {
        Box::new(StagedFile::new("inspect", file).open()?)
    } else {
        Box::new(std::io::BufReader::new(
            std::fs::File::open(file).with_context(|| format!("Failed to open {}", file.display()))?,
        ))
    };

    let spinner = create_spinner(&format!("Decoding {}", file.display()))?;
    let records = decoder.decode(reader)?;
    info!(mode = ?records.mapping().mode(), "Decoding {}", file.display());

    for (decoded, record) in records.take(limit).enumerate() {
        let line = serde_json::to_string(&record?)?;
        spinner.suspend(|| println!("{line}"));
        spinner.set_message(format!("{} records", decoded + 1));
    }
    spinner.finish_and_clear();

    Ok(())
}

fn create_spinner(message: &str) -> Result<ProgressBar> {
    let pb = ProgressBar::new_spinner();
    pb.set_style(ProgressStyle::default_spinner().template("{spinner:.green} {msg}")?);
    pb.set_message(message.to_string());
    pb.enable_steady_tick(Duration::from_millis(100));
    Ok(pb)
}
