//! Newline-delimited JSON ingestion.
//!
//! Reads one [`Event`] per line and writes them concurrently through
//! [`Writer::submit`], with at most `concurrency` writes in flight. A
//! shutdown signal stops reading; writes already submitted are awaited.

use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::{watch, Semaphore};
use tokio::task::{JoinError, JoinSet};

use crate::storage::record::Event;
use crate::storage::writer::{WriteError, Writer};

/// Outcome of an ingest run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestSummary {
    /// Non-blank lines read
    pub read: u64,
    /// Events stored
    pub written: u64,
    /// Lines that were not valid events
    pub rejected: u64,
    /// Events the writer refused
    pub failed: u64,
}

impl IngestSummary {
    fn tally(&mut self, result: Result<Result<i64, WriteError>, JoinError>) {
        match result {
            Ok(Ok(_)) => self.written += 1,
            Ok(Err(err)) => {
                tracing::warn!(error = %err, "Event not stored");
                self.failed += 1;
            }
            Err(err) => {
                tracing::error!(error = %err, "Write task failed");
                self.failed += 1;
            }
        }
    }
}

/// Ingest events from `input` until EOF or shutdown.
///
/// # Arguments
///
/// * `writer` - Writer shared by all in-flight tasks
/// * `input` - Line-oriented JSON source
/// * `concurrency` - Maximum writes in flight (at least 1)
/// * `shutdown_rx` - Receiver for shutdown signal
pub async fn run_ingest<R>(
    writer: Writer,
    input: R,
    concurrency: usize,
    mut shutdown_rx: watch::Receiver<bool>,
) -> std::io::Result<IngestSummary>
where
    R: AsyncBufRead + Unpin,
{
    let permits = Arc::new(Semaphore::new(concurrency.max(1)));
    let mut tasks = JoinSet::new();
    let mut summary = IngestSummary::default();
    let mut lines = input.lines();
    let mut shutdown_open = true;

    loop {
        let line = tokio::select! {
            biased;
            changed = shutdown_rx.changed(), if shutdown_open => {
                if changed.is_err() {
                    // Sender dropped: nobody can ask us to stop any more
                    shutdown_open = false;
                    continue;
                }
                if *shutdown_rx.borrow() {
                    tracing::info!("Shutdown signal received, stopping ingest");
                    break;
                }
                continue;
            }
            line = lines.next_line() => line?,
        };

        let Some(line) = line else { break };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        summary.read += 1;

        let event: Event = match serde_json::from_str(line) {
            Ok(event) => event,
            Err(err) => {
                tracing::warn!(line = summary.read, error = %err, "Skipping malformed event");
                summary.rejected += 1;
                continue;
            }
        };

        let Ok(permit) = Arc::clone(&permits).acquire_owned().await else {
            break;
        };
        let writer = writer.clone();
        tasks.spawn(async move {
            let _permit = permit;
            writer.submit(event).await
        });

        while let Some(result) = tasks.try_join_next() {
            summary.tally(result);
        }
    }

    while let Some(result) = tasks.join_next().await {
        summary.tally(result);
    }

    tracing::info!(
        read = summary.read,
        written = summary.written,
        rejected = summary.rejected,
        failed = summary.failed,
        "Ingest finished"
    );
    Ok(summary)
}
