//! Process-wide handle to the SQLite event store.
//!
//! Uses r2d2 with r2d2_sqlite for pooled connections. The database is
//! switched to WAL once, on a single connection, before the pool opens its
//! idle connections. One write lock per process serializes inserts across
//! all tables and all handles.

use parking_lot::{const_mutex, Mutex, MutexGuard};
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use thiserror::Error;

use super::schema::{apply_connection_pragmas, enable_wal};
use crate::config::StoreConfig;

static STORE: OnceLock<StoreHandle> = OnceLock::new();
static INIT_GUARD: Mutex<()> = const_mutex(());

/// Serializes every insert in the process, whichever handle issues it.
static WRITE_LOCK: Mutex<()> = const_mutex(());

/// Error type for opening the store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to open store at {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: r2d2::Error,
    },

    #[error("failed to enable WAL on {path}: {source}")]
    Wal {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },
}

/// Shared handle to the event store.
///
/// Cloning is cheap; all clones share one connection pool.
#[derive(Clone)]
pub struct StoreHandle {
    inner: Arc<StoreInner>,
}

struct StoreInner {
    pool: Pool<SqliteConnectionManager>,
    db_path: PathBuf,
}

impl std::fmt::Debug for StoreHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreHandle")
            .field("db_path", &self.inner.db_path)
            .finish_non_exhaustive()
    }
}

/// Open the process-wide store, or return it if it is already open.
///
/// Concurrent first calls open exactly one pool. Later calls ignore their
/// configuration and hand back the existing handle.
pub fn initialize(config: &StoreConfig) -> Result<StoreHandle, StoreError> {
    if let Some(handle) = STORE.get() {
        return Ok(handle.clone());
    }

    let _guard = INIT_GUARD.lock();
    if let Some(handle) = STORE.get() {
        return Ok(handle.clone());
    }

    let handle = StoreHandle::open(config)?;
    let stored = STORE.get_or_init(|| handle);
    Ok(stored.clone())
}

/// The process-wide store, if [`initialize`] has succeeded.
pub fn global() -> Option<StoreHandle> {
    STORE.get().cloned()
}

impl StoreHandle {
    /// Open an independent handle with its own pool.
    ///
    /// # Configuration
    ///
    /// - WAL journal mode, set once before the pool is built
    /// - `max_open_conns` bounds the pool size
    /// - `max_idle_conns` connections are opened up front and kept idle
    /// - `synchronous=NORMAL` and the busy timeout on every connection
    pub fn open(config: &StoreConfig) -> Result<Self, StoreError> {
        // Idle connections are opened in parallel; switching the journal
        // mode from each of them would contend for the same lock.
        rusqlite::Connection::open(&config.db_path)
            .and_then(|conn| enable_wal(&conn))
            .map_err(|source| StoreError::Wal {
                path: config.db_path.clone(),
                source,
            })?;

        let manager = SqliteConnectionManager::file(&config.db_path);

        let pool = Pool::builder()
            .max_size(config.max_open_conns)
            .min_idle(Some(config.max_idle_conns))
            .connection_timeout(config.connect_timeout)
            .connection_customizer(Box::new(StoreConnectionCustomizer {
                busy_timeout: config.busy_timeout,
            }))
            .build(manager)
            .map_err(|source| StoreError::Open {
                path: config.db_path.clone(),
                source,
            })?;

        tracing::info!(
            path = %config.db_path.display(),
            max_open = config.max_open_conns,
            max_idle = config.max_idle_conns,
            "Store opened"
        );

        Ok(Self {
            inner: Arc::new(StoreInner {
                pool,
                db_path: config.db_path.clone(),
            }),
        })
    }

    /// Get a connection from the pool.
    pub fn get(&self) -> Result<PooledConnection<SqliteConnectionManager>, r2d2::Error> {
        self.inner.pool.get()
    }

    /// Take the process-wide write lock.
    ///
    /// Shared by every handle, so two handles on one file never race.
    /// Held for the whole of one insert, retries included.
    pub fn lock_writes(&self) -> MutexGuard<'static, ()> {
        WRITE_LOCK.lock()
    }

    /// Get the current pool state for monitoring.
    pub fn state(&self) -> r2d2::State {
        self.inner.pool.state()
    }

    /// Maximum number of connections the pool will open.
    pub fn max_open_conns(&self) -> u32 {
        self.inner.pool.max_size()
    }

    pub fn db_path(&self) -> &Path {
        &self.inner.db_path
    }

    /// Whether two handles share the same pool.
    pub fn same_store(&self, other: &StoreHandle) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

/// Connection customizer that applies the busy timeout and store pragmas.
#[derive(Debug)]
struct StoreConnectionCustomizer {
    busy_timeout: Duration,
}

impl r2d2::CustomizeConnection<rusqlite::Connection, rusqlite::Error>
    for StoreConnectionCustomizer
{
    fn on_acquire(&self, conn: &mut rusqlite::Connection) -> Result<(), rusqlite::Error> {
        conn.busy_timeout(self.busy_timeout)?;
        apply_connection_pragmas(conn)
    }
}
