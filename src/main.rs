use anyhow::Context;
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use obsq_core::{
    CoreConfig, InMemoryObsStore, ObsUpdateHandler, ProcessOutcome, QueueProcessorError,
    QueueRecord, disposal_strategy_from_env_value,
};

const DEFAULT_STORE_PATH: &str = "obs_store.json";

#[derive(Parser)]
#[command(name = "obsq")]
#[command(about = "Process queued observation updates against a JSON observation store")]
struct Cli {
    /// Observation store snapshot (default: $OBSQ_STORE_PATH or obs_store.json)
    #[arg(long, global = true)]
    store: Option<PathBuf>,
    /// Disposal strategy: update-in-place or void-and-replace (default: $OBSQ_UPDATE_STRATEGY)
    #[arg(long, global = true)]
    strategy: Option<String>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate and apply queue records, writing the store back afterwards
    Process {
        /// Queue files, each holding one record or an array of records
        #[arg(required = true)]
        files: Vec<PathBuf>,
        /// Append rejected records with their failure messages to this JSON file
        #[arg(long)]
        error_queue: Option<PathBuf>,
    },
    /// Validate queue records without changing the store
    Validate {
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
    /// Report whether each queue record is handled by the obs update handler
    Accept {
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
}

/// A rejected record as written to the error queue file.
#[derive(Debug, Serialize, Deserialize)]
struct ErrorQueueEntry {
    record: QueueRecord,
    messages: Vec<String>,
    requires_manual_review: bool,
    rejected_at: DateTime<Utc>,
}

/// Entry point for the obs queue runner.
///
/// # Environment Variables
/// - `OBSQ_STORE_PATH`: observation store snapshot (default: "obs_store.json")
/// - `OBSQ_UPDATE_STRATEGY`: "update-in-place" or "void-and-replace" (default)
/// - `RUST_LOG`: log filter, added to the default `obsq=info`
fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env().add_directive("obsq=info".parse()?),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    let strategy = disposal_strategy_from_env_value(
        cli.strategy
            .or_else(|| std::env::var("OBSQ_UPDATE_STRATEGY").ok()),
    )?;
    let store_path = cli
        .store
        .or_else(|| std::env::var("OBSQ_STORE_PATH").ok().map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_STORE_PATH));

    let cfg = CoreConfig::new(strategy);
    let store = Arc::new(
        InMemoryObsStore::load(&store_path)
            .with_context(|| format!("loading store {}", store_path.display()))?,
    );
    let handler = ObsUpdateHandler::new(&cfg, store.clone(), store.clone());

    match cli.command {
        Commands::Process { files, error_queue } => {
            tracing::info!(
                "++ Processing obs updates with strategy {} against {}",
                strategy,
                store_path.display()
            );
            let records = read_queue_files(&files)?;
            let mut rejected = Vec::new();
            let mut applied = 0usize;

            for record in records {
                match handler.process(&record) {
                    Ok(outcome) => {
                        if !matches!(outcome, ProcessOutcome::Unchanged { .. }) {
                            applied += 1;
                        }
                        println!("{}: {}", record.uuid, describe_outcome(&outcome));
                    }
                    Err(e) => {
                        eprintln!("{e}");
                        rejected.push(error_queue_entry(record, &e));
                    }
                }
            }

            if applied > 0 {
                store
                    .persist(&store_path)
                    .with_context(|| format!("writing store {}", store_path.display()))?;
            }

            println!("applied: {applied}, rejected: {}", rejected.len());

            match error_queue {
                Some(path) => append_error_queue(&path, rejected)?,
                None if !rejected.is_empty() => {
                    anyhow::bail!("{} queue record(s) rejected", rejected.len())
                }
                None => {}
            }
        }
        Commands::Validate { files } => {
            let mut invalid = 0usize;
            for record in read_queue_files(&files)? {
                match handler.validate(&record) {
                    Ok(validated) => println!(
                        "{}: valid, resolves to obs {} (changes: {:?})",
                        record.uuid,
                        validated.resolved.external_id,
                        validated.changes.fields()
                    ),
                    Err(e) => {
                        invalid += 1;
                        println!("{}: invalid", record.uuid);
                        for message in e.messages() {
                            println!("  - {message}");
                        }
                    }
                }
            }
            if invalid > 0 {
                anyhow::bail!("{invalid} queue record(s) failed validation");
            }
        }
        Commands::Accept { files } => {
            for record in read_queue_files(&files)? {
                println!("{}: {}", record.uuid, handler.accept(&record));
            }
        }
    }

    Ok(())
}

fn describe_outcome(outcome: &ProcessOutcome) -> String {
    match outcome {
        ProcessOutcome::Updated { external_id } => format!("updated obs {external_id}"),
        ProcessOutcome::Replaced {
            voided,
            replacement,
        } => format!("voided obs {voided}, saved replacement {replacement}"),
        ProcessOutcome::Unchanged { external_id } => format!("no change to obs {external_id}"),
    }
}

fn error_queue_entry(record: QueueRecord, error: &QueueProcessorError) -> ErrorQueueEntry {
    ErrorQueueEntry {
        record,
        messages: error.messages(),
        requires_manual_review: error.requires_manual_review(),
        rejected_at: Utc::now(),
    }
}

/// Read queue records from files holding either one record or an array of records.
fn read_queue_files(files: &[PathBuf]) -> anyhow::Result<Vec<QueueRecord>> {
    let mut records = Vec::new();
    for path in files {
        let text = fs::read_to_string(path)
            .with_context(|| format!("reading queue file {}", path.display()))?;
        let parsed = parse_queue_file(&text).with_context(|| format!("in {}", path.display()))?;
        records.extend(parsed);
    }
    Ok(records)
}

fn parse_queue_file(text: &str) -> anyhow::Result<Vec<QueueRecord>> {
    let trimmed = text.trim_start();
    if trimmed.starts_with('[') {
        deserialize_with_path(trimmed)
    } else {
        deserialize_with_path(trimmed).map(|record| vec![record])
    }
}

fn deserialize_with_path<T: serde::de::DeserializeOwned>(text: &str) -> anyhow::Result<T> {
    let mut deserializer = serde_json::Deserializer::from_str(text);
    serde_path_to_error::deserialize(&mut deserializer).map_err(|err| {
        anyhow::anyhow!(
            "queue record schema mismatch at {}: {}",
            err.path(),
            err.inner()
        )
    })
}

fn append_error_queue(path: &Path, rejected: Vec<ErrorQueueEntry>) -> anyhow::Result<()> {
    if rejected.is_empty() {
        return Ok(());
    }

    let mut entries: Vec<ErrorQueueEntry> = if path.exists() {
        let text = fs::read_to_string(path)
            .with_context(|| format!("reading error queue {}", path.display()))?;
        serde_json::from_str(&text)
            .with_context(|| format!("parsing error queue {}", path.display()))?
    } else {
        Vec::new()
    };

    tracing::warn!(
        "routing {} rejected record(s) to {}",
        rejected.len(),
        path.display()
    );
    entries.extend(rejected);

    let text = serde_json::to_string_pretty(&entries)?;
    fs::write(path, text).with_context(|| format!("writing error queue {}", path.display()))
}
