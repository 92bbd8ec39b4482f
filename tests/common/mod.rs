//! Test utilities for nodelog integration tests.
//!
//! Provides:
//! - Temporary database fixtures
//! - Writer setup with a fast retry policy
//! - Row helpers for assertions

#![allow(dead_code)]

use nodelog::config::StoreConfig;
use nodelog::storage::handle::StoreHandle;
use nodelog::{ensure_schema, RetryPolicy, Writer};
use std::path::PathBuf;
use std::time::Duration;
use tempfile::TempDir;

/// Test fixture that manages a temporary database directory.
///
/// The directory is automatically cleaned up when the fixture is dropped.
pub struct TestFixture {
    /// Temporary directory for test database
    pub temp_dir: TempDir,
    /// Path to the database file
    pub db_path: PathBuf,
}

impl TestFixture {
    /// Create a new test fixture with a temporary database directory.
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("failed to create temp dir");
        let db_path = temp_dir.path().join("test.db");
        Self { temp_dir, db_path }
    }

    /// Store configuration for this fixture's database.
    pub fn store_config(&self) -> StoreConfig {
        let mut config = StoreConfig::new(&self.db_path);
        config.max_open_conns = 16;
        config.max_idle_conns = 2;
        config
    }

    /// Open an independent store with the schema in place.
    pub fn open_store(&self) -> StoreHandle {
        let store = StoreHandle::open(&self.store_config()).expect("failed to open store");
        ensure_schema(&store).expect("failed to create schema");
        store
    }

    /// Writer with a short backoff so contention tests stay fast.
    pub fn writer(&self) -> Writer {
        self.writer_with_policy(RetryPolicy::new(3, Duration::from_millis(10)))
    }

    pub fn writer_with_policy(&self, policy: RetryPolicy) -> Writer {
        Writer::new(self.open_store(), policy)
    }
}

impl Default for TestFixture {
    fn default() -> Self {
        Self::new()
    }
}

/// Route library logs to the test writer (errors only).
pub fn init_tracing() {
    nodelog::observability::tracing::init_test_tracing();
}

/// Number of rows in `table`.
pub fn count_rows(store: &StoreHandle, table: &str) -> i64 {
    let conn = store.get().expect("failed to get connection");
    conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| {
        row.get(0)
    })
    .expect("count query failed")
}

/// All ids in `table`, ascending.
pub fn row_ids(store: &StoreHandle, table: &str) -> Vec<i64> {
    let conn = store.get().expect("failed to get connection");
    let mut stmt = conn
        .prepare(&format!("SELECT id FROM {table} ORDER BY id"))
        .expect("prepare failed");
    stmt.query_map([], |row| row.get(0))
        .expect("query failed")
        .collect::<Result<Vec<_>, _>>()
        .expect("row decode failed")
}

/// `created_at` of one row as Unix seconds.
pub fn created_at_secs(store: &StoreHandle, table: &str, id: i64) -> Option<i64> {
    let conn = store.get().expect("failed to get connection");
    conn.query_row(
        &format!("SELECT CAST(strftime('%s', created_at) AS INTEGER) FROM {table} WHERE id = ?1"),
        [id],
        |row| row.get(0),
    )
    .expect("timestamp query failed")
}

/// Current Unix time in whole seconds.
pub fn now_secs() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system time before Unix epoch")
        .as_secs() as i64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixture_creates_temp_dir() {
        let fixture = TestFixture::new();
        assert!(fixture.temp_dir.path().exists());
        assert!(fixture.db_path.ends_with("test.db"));
    }
}
