//! Serialized record writer.
//!
//! Every insert, whatever its table, runs under the store's single write
//! lock and inside the contention [`RetryPolicy`]. A failed write leaves no
//! row behind and does not affect later writes.

use rusqlite::ToSql;
use std::sync::Arc;
use thiserror::Error;

use super::contention::RetryPolicy;
use super::handle::StoreHandle;
use super::record::{insert_statement, Event, Record};
use crate::observability::metrics::{StatsSnapshot, WriteStats};

/// Error type for writes.
#[derive(Debug, Error)]
pub enum WriteError {
    #[error("record has no columns")]
    EmptyRecord,

    #[error("failed to acquire store connection: {0}")]
    Pool(#[from] r2d2::Error),

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("store still locked after {attempts} attempts: {source}")]
    RetryExhausted {
        attempts: u32,
        #[source]
        source: rusqlite::Error,
    },

    #[error("write task panicked")]
    TaskPanic,
}

/// Writes events and records into the store.
///
/// Clones share the store, the retry policy and the write counters.
#[derive(Clone)]
pub struct Writer {
    store: StoreHandle,
    policy: RetryPolicy,
    stats: Arc<WriteStats>,
}

impl Writer {
    pub fn new(store: StoreHandle, policy: RetryPolicy) -> Self {
        Self {
            store,
            policy,
            stats: Arc::new(WriteStats::default()),
        }
    }

    pub fn store(&self) -> &StoreHandle {
        &self.store
    }

    /// Counters for all writes made through this writer and its clones.
    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Insert `record` into `table`, returning the new row id.
    ///
    /// Table and column names are not checked here; an unknown name fails
    /// in the store with [`WriteError::Database`].
    #[tracing::instrument(skip(self, record), fields(columns = record.len()))]
    pub fn write(&self, table: &str, record: &Record) -> Result<i64, WriteError> {
        if record.is_empty() {
            return Err(WriteError::EmptyRecord);
        }
        let sql = insert_statement(table, record.columns());
        self.execute(table, &sql, &record.params())
    }

    /// Insert a typed event into its table, returning the new row id.
    pub fn write_event(&self, event: &Event) -> Result<i64, WriteError> {
        let table = event.table();
        self.execute(table.name(), table.insert_sql(), &event.params())
    }

    /// Insert an event from async code without blocking the runtime.
    pub async fn submit(&self, event: Event) -> Result<i64, WriteError> {
        let writer = self.clone();
        tokio::task::spawn_blocking(move || writer.write_event(&event))
            .await
            .map_err(|_| WriteError::TaskPanic)?
    }

    fn execute(&self, table: &str, sql: &str, params: &[&dyn ToSql]) -> Result<i64, WriteError> {
        let _guard = self.store.lock_writes();
        let result = self.store.get().map_err(WriteError::from).and_then(|conn| {
            self.policy.run(|| {
                let mut stmt = conn.prepare_cached(sql)?;
                stmt.execute(params)?;
                Ok(conn.last_insert_rowid())
            })
        });

        match result {
            Ok(done) => {
                self.stats.record_written(done.attempts);
                tracing::debug!(
                    table,
                    row_id = done.value,
                    attempts = done.attempts,
                    "Record written"
                );
                Ok(done.value)
            }
            Err(err) => {
                self.stats.record_failed(&err);
                tracing::warn!(table, error = %err, "Write failed");
                Err(err)
            }
        }
    }
}
