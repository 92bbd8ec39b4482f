//! Nodelog: an append-only SQLite event log for peer-to-peer nodes.
//!
//! # Usage
//!
//! ```bash
//! nodelog --db-path ./data/execution.db init
//! nodelog ingest --input events.jsonl --concurrency 16
//! nodelog write --table p2pserver --json '{"type":"peer","name":"node1"}'
//! ```
//!
//! Environment variables can also be used:
//! - `NODELOG_CONFIG`: YAML configuration file
//! - `NODELOG_DB_PATH`: SQLite database path
//! - `RUST_LOG`: Log level (trace, debug, info, warn, error)

use anyhow::Context;
use nodelog::config::{Command, Config};
use nodelog::ingest::run_ingest;
use nodelog::observability::tracing::init_tracing;
use nodelog::storage::record::Record;
use nodelog::{ensure_schema, Writer};
use std::path::Path;
use tokio::io::{AsyncBufRead, BufReader};
use tokio::sync::watch;

/// Spawn a task that flips `shutdown_tx` on SIGINT or SIGTERM.
fn spawn_signal_handler(shutdown_tx: watch::Sender<bool>) {
    tokio::spawn(async move {
        let ctrl_c = tokio::signal::ctrl_c();

        #[cfg(unix)]
        {
            use tokio::signal::unix::{signal, SignalKind};
            let mut sigterm =
                signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");

            tokio::select! {
                _ = ctrl_c => {
                    tracing::info!("Received SIGINT (Ctrl+C), initiating shutdown...");
                }
                _ = sigterm.recv() => {
                    tracing::info!("Received SIGTERM, initiating shutdown...");
                }
            }
        }

        #[cfg(not(unix))]
        {
            ctrl_c.await.expect("failed to listen for ctrl+c");
            tracing::info!("Received Ctrl+C, initiating shutdown...");
        }

        let _ = shutdown_tx.send(true);
    });
}

async fn open_input(input: Option<&Path>) -> anyhow::Result<Box<dyn AsyncBufRead + Unpin + Send>> {
    Ok(match input {
        Some(path) => {
            let file = tokio::fs::File::open(path)
                .await
                .with_context(|| format!("failed to open {}", path.display()))?;
            Box::new(BufReader::new(file))
        }
        None => Box::new(BufReader::new(tokio::io::stdin())),
    })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse configuration from CLI arguments and environment
    let config = Config::parse_args();

    // Initialize tracing/logging
    init_tracing(&config.log_level);

    let policy = config.retry_policy()?;

    // Open the store, creating its directory if needed
    let store = nodelog::initialize(&config)?;
    ensure_schema(&store)?;
    let db_path = store.db_path().to_path_buf();
    let writer = Writer::new(store, policy);

    match config.command {
        Command::Init => {
            tracing::info!(path = %db_path.display(), "Store initialized");
        }
        Command::Ingest { input, concurrency } => {
            let (shutdown_tx, shutdown_rx) = watch::channel(false);
            spawn_signal_handler(shutdown_tx);

            let reader = open_input(input.as_deref()).await?;
            let summary = run_ingest(writer.clone(), reader, concurrency, shutdown_rx).await?;
            let stats = writer.stats();
            tracing::info!(
                written = summary.written,
                rejected = summary.rejected,
                failed = summary.failed,
                retries = stats.retries,
                exhausted = stats.exhausted,
                "Ingest complete"
            );
        }
        Command::Write { table, json } => {
            let value: serde_json::Value =
                serde_json::from_str(&json).context("--json is not valid JSON")?;
            let record = Record::from_json(value)?;
            let row_id =
                tokio::task::spawn_blocking(move || writer.write(&table, &record)).await??;
            println!("{row_id}");
        }
    }

    Ok(())
}
