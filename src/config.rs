//! Configuration parsing for nodelog.
//!
//! Supports:
//! - CLI arguments via clap
//! - Environment variable overrides
//! - A YAML `dbconfig.yaml` file carrying the database path

use clap::{Parser, Subcommand};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::storage::contention::RetryPolicy;

/// File name looked up when no explicit configuration file is given.
pub const DEFAULT_CONFIG_FILE: &str = "dbconfig.yaml";

/// Directories searched for [`DEFAULT_CONFIG_FILE`], in order.
const CONFIG_SEARCH_DIRS: [&str; 2] = [".", ".."];

/// Default maximum number of open store connections.
pub const DEFAULT_MAX_OPEN_CONNS: u32 = 16;

/// Default number of idle connections kept in the pool.
pub const DEFAULT_MAX_IDLE_CONNS: u32 = 4;

/// Default time to wait for a pooled connection.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file {name} not found (searched {searched:?})")]
    NotFound { name: String, searched: Vec<PathBuf> },

    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Nodelog: an append-only SQLite event log for peer-to-peer nodes.
#[derive(Parser, Debug, Clone)]
#[command(name = "nodelog")]
#[command(author, version, about, long_about = None)]
pub struct Config {
    /// YAML configuration file (defaults to dbconfig.yaml in . or ..)
    #[arg(short, long, env = "NODELOG_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// SQLite database path, overrides the configuration file
    #[arg(long, env = "NODELOG_DB_PATH", global = true)]
    pub db_path: Option<PathBuf>,

    /// Maximum number of open store connections
    #[arg(long, env = "NODELOG_MAX_OPEN_CONNS", global = true)]
    pub max_open_conns: Option<u32>,

    /// Number of idle store connections kept open
    #[arg(long, env = "NODELOG_MAX_IDLE_CONNS", global = true)]
    pub max_idle_conns: Option<u32>,

    /// SQLite busy timeout before a lock is reported to the retry policy
    #[arg(long, env = "NODELOG_BUSY_TIMEOUT_MS", global = true)]
    pub busy_timeout_ms: Option<u64>,

    /// Attempts per write while the store is locked
    #[arg(long, env = "NODELOG_RETRY_ATTEMPTS", default_value_t = 3, global = true)]
    pub retry_attempts: u32,

    /// Initial backoff between locked attempts, doubled per retry
    #[arg(long, env = "NODELOG_RETRY_BASE_DELAY_MS", default_value_t = 100, global = true)]
    pub retry_base_delay_ms: u64,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "RUST_LOG", default_value = "info", global = true)]
    pub log_level: String,

    #[command(subcommand)]
    pub command: Command,
}

/// CLI subcommands.
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Create the event tables and triggers if they are missing
    Init,

    /// Append newline-delimited JSON events from a file or stdin
    Ingest {
        /// Input file (stdin when omitted)
        #[arg(short, long)]
        input: Option<PathBuf>,

        /// Maximum number of writes in flight
        #[arg(long, default_value_t = 8)]
        concurrency: usize,
    },

    /// Insert one record into a table
    Write {
        /// Target table
        #[arg(short, long)]
        table: String,

        /// JSON object mapping column names to scalar values
        #[arg(long)]
        json: String,
    },
}

impl Config {
    /// Parse configuration from CLI arguments and environment.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Resolve the store configuration.
    ///
    /// `--db-path` alone is enough to skip the configuration file. Otherwise
    /// the file named by `--config` is read, or `dbconfig.yaml` is searched
    /// for. Pool options given on the command line win over file values.
    pub fn store_config(&self) -> Result<StoreConfig, ConfigError> {
        let mut store = match (&self.config, &self.db_path) {
            (Some(file), _) => StoreConfig::from_file(file)?,
            (None, Some(path)) => StoreConfig::new(path),
            (None, None) => StoreConfig::discover()?,
        };

        if let Some(path) = &self.db_path {
            store.db_path.clone_from(path);
        }
        if let Some(max_open) = self.max_open_conns {
            store.max_open_conns = max_open;
        }
        if let Some(max_idle) = self.max_idle_conns {
            store.max_idle_conns = max_idle;
        }
        if let Some(busy_ms) = self.busy_timeout_ms {
            store.busy_timeout = Duration::from_millis(busy_ms);
        }

        store.validate()?;
        Ok(store)
    }

    /// Build the contention retry policy from the CLI options.
    pub fn retry_policy(&self) -> Result<RetryPolicy, ConfigError> {
        if self.retry_attempts == 0 {
            return Err(ConfigError::Invalid(
                "retry attempts must be at least 1".into(),
            ));
        }
        Ok(RetryPolicy::new(
            self.retry_attempts,
            Duration::from_millis(self.retry_base_delay_ms),
        ))
    }
}

/// Resolved settings for opening the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    /// Path to the SQLite database file
    pub db_path: PathBuf,
    /// Maximum concurrently open connections (pool size)
    pub max_open_conns: u32,
    /// Idle connections the pool keeps ready
    pub max_idle_conns: u32,
    /// SQLite busy timeout applied to every connection
    pub busy_timeout: Duration,
    /// How long to wait for a pooled connection
    pub connect_timeout: Duration,
}

/// On-disk layout of `dbconfig.yaml`.
#[derive(Debug, Deserialize)]
struct ConfigFile {
    database: DatabaseSection,
}

#[derive(Debug, Deserialize)]
struct DatabaseSection {
    #[serde(rename = "EXECUTION_DB_PATH")]
    execution_db_path: PathBuf,
    #[serde(default)]
    max_open_conns: Option<u32>,
    #[serde(default)]
    max_idle_conns: Option<u32>,
    #[serde(default)]
    busy_timeout_ms: Option<u64>,
}

impl StoreConfig {
    /// Store configuration with default pool settings.
    pub fn new(db_path: impl Into<PathBuf>) -> Self {
        Self {
            db_path: db_path.into(),
            max_open_conns: DEFAULT_MAX_OPEN_CONNS,
            max_idle_conns: DEFAULT_MAX_IDLE_CONNS,
            busy_timeout: Duration::ZERO,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }

    /// Load the configuration from a YAML file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml(&contents, path)
    }

    /// Parse YAML configuration; `origin` is only used in error messages.
    pub fn from_yaml(contents: &str, origin: &Path) -> Result<Self, ConfigError> {
        let file: ConfigFile =
            serde_yaml::from_str(contents).map_err(|source| ConfigError::Parse {
                path: origin.to_path_buf(),
                source,
            })?;

        let section = file.database;
        let mut config = Self::new(section.execution_db_path);
        if let Some(max_open) = section.max_open_conns {
            config.max_open_conns = max_open;
        }
        if let Some(max_idle) = section.max_idle_conns {
            config.max_idle_conns = max_idle;
        }
        if let Some(busy_ms) = section.busy_timeout_ms {
            config.busy_timeout = Duration::from_millis(busy_ms);
        }
        Ok(config)
    }

    /// Find `dbconfig.yaml` in the working directory or its parent.
    pub fn discover() -> Result<Self, ConfigError> {
        Self::discover_in(&CONFIG_SEARCH_DIRS, DEFAULT_CONFIG_FILE)
    }

    /// Load the first `name` found in `dirs`.
    pub fn discover_in<P: AsRef<Path>>(dirs: &[P], name: &str) -> Result<Self, ConfigError> {
        let searched: Vec<PathBuf> = dirs.iter().map(|dir| dir.as_ref().join(name)).collect();
        match searched.iter().find(|candidate| candidate.is_file()) {
            Some(found) => {
                tracing::debug!(path = %found.display(), "Using configuration file");
                Self::from_file(found)
            }
            None => Err(ConfigError::NotFound {
                name: name.to_string(),
                searched,
            }),
        }
    }

    /// Check pool bounds and the database path.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.db_path.as_os_str().is_empty() {
            return Err(ConfigError::Invalid("database path is empty".into()));
        }
        if self.max_open_conns == 0 {
            return Err(ConfigError::Invalid(
                "max open connections must be at least 1".into(),
            ));
        }
        if self.max_idle_conns > self.max_open_conns {
            return Err(ConfigError::Invalid(format!(
                "max idle connections ({}) exceeds max open connections ({})",
                self.max_idle_conns, self.max_open_conns
            )));
        }
        Ok(())
    }
}
