//! Nodelog: an embedded append-only event log for peer-to-peer nodes.
//!
//! Nodelog persists peer-server and node-discovery events into a local
//! SQLite store in WAL mode. Writes from any number of threads or tasks are
//! serialized through a single write lock, and transient "database is
//! locked" failures are retried with bounded exponential backoff.
//!
//! # Architecture
//!
//! - **Store handle**: one pooled SQLite handle per process
//! - **Schema**: idempotent table and trigger provisioning
//! - **Writer**: typed events or dynamic records, one row per call
//! - **Contention policy**: bounded retry, explicit exhaustion error
//!
//! # Modules
//!
//! - [`config`]: CLI, environment and YAML configuration
//! - [`ingest`]: newline-delimited JSON ingestion for the CLI
//! - [`observability`]: tracing setup and write counters
//! - [`storage`]: SQLite persistence layer

// Lint configuration
#![warn(clippy::all)]
#![allow(
    clippy::module_name_repetitions,    // storage::writer::WriteError is fine
    clippy::must_use_candidate,         // Not all functions need #[must_use]
    clippy::missing_errors_doc,         // Error docs can be verbose
    clippy::missing_panics_doc,         // Panic docs can be verbose
    clippy::needless_raw_string_hashes  // r#""# is fine for SQL
)]

pub mod config;
pub mod ingest;
pub mod observability;
pub mod storage;

use thiserror::Error;

use crate::config::{Config, ConfigError};
use crate::storage::handle::{StoreError, StoreHandle};
use crate::storage::schema::SchemaError;

pub use crate::storage::contention::RetryPolicy;
pub use crate::storage::record::{Event, NodeDiscoveryEvent, PeerServerEvent, Record};
pub use crate::storage::schema::{ensure_schema, Table};
pub use crate::storage::writer::{WriteError, Writer};

/// Startup failures: anything that should stop the process before writes begin.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error("failed to create store directory: {0}")]
    Io(#[from] std::io::Error),
}

/// Resolve the store configuration and open the process-wide store.
///
/// The database's parent directory is created if missing. Repeated calls
/// return the handle opened by the first successful call.
pub fn initialize(config: &Config) -> Result<StoreHandle, Error> {
    let store_config = config.store_config()?;
    if let Some(parent) = store_config.db_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    Ok(storage::handle::initialize(&store_config)?)
}
