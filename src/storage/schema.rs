//! Event table definitions and idempotent schema setup.
//!
//! Each table has an autoincrement `id`, its event columns, and a
//! `created_at` timestamp. The column default covers inserts that omit
//! `created_at`; an insert trigger covers inserts that pass NULL.

use rusqlite::Connection;
use std::sync::LazyLock;
use thiserror::Error;

use super::handle::StoreHandle;
use super::record::{insert_statement, quote_identifier};

/// Error type for schema setup.
#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("failed to create table {table}: {source}")]
    Table {
        table: &'static str,
        #[source]
        source: rusqlite::Error,
    },

    #[error("failed to create trigger on {table}: {source}")]
    Trigger {
        table: &'static str,
        #[source]
        source: rusqlite::Error,
    },

    #[error("failed to acquire store connection: {0}")]
    Pool(#[from] r2d2::Error),
}

/// Peer-server event columns, in binding order.
const PEER_SERVER_COLUMNS: &[&str] = &["type", "name", "addr", "message", "pid"];

/// Node-discovery event columns, in binding order.
const NODE_DISCOVERY_COLUMNS: &[&str] = &[
    "discV", "type", "agent", "msg", "tid", "tAddr", "tKey", "nid", "nAddr", "nKey",
];

static PEER_SERVER_INSERT: LazyLock<String> = LazyLock::new(|| {
    insert_statement(
        Table::PeerServer.name(),
        PEER_SERVER_COLUMNS.iter().copied(),
    )
});

static NODE_DISCOVERY_INSERT: LazyLock<String> = LazyLock::new(|| {
    insert_statement(
        Table::NodeDiscovery.name(),
        NODE_DISCOVERY_COLUMNS.iter().copied(),
    )
});

/// The predefined event tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Table {
    /// Peer-to-peer server lifecycle events
    PeerServer,
    /// Node discovery protocol events
    NodeDiscovery,
}

impl Table {
    pub const ALL: [Table; 2] = [Table::PeerServer, Table::NodeDiscovery];

    pub fn name(self) -> &'static str {
        match self {
            Table::PeerServer => "p2pserver",
            Table::NodeDiscovery => "nodedisc",
        }
    }

    /// Event columns, excluding `id` and `created_at`.
    pub fn columns(self) -> &'static [&'static str] {
        match self {
            Table::PeerServer => PEER_SERVER_COLUMNS,
            Table::NodeDiscovery => NODE_DISCOVERY_COLUMNS,
        }
    }

    pub fn trigger_name(self) -> String {
        format!("{}_set_created_at", self.name())
    }

    /// Insert statement for this table, built once per process.
    pub fn insert_sql(self) -> &'static str {
        match self {
            Table::PeerServer => PEER_SERVER_INSERT.as_str(),
            Table::NodeDiscovery => NODE_DISCOVERY_INSERT.as_str(),
        }
    }

    fn create_table_sql(self) -> String {
        let columns: String = self
            .columns()
            .iter()
            .map(|column| format!("    {} TEXT,\n", quote_identifier(column)))
            .collect();
        format!(
            "CREATE TABLE IF NOT EXISTS {table} (\n    \
             id INTEGER PRIMARY KEY AUTOINCREMENT,\n\
             {columns}    \
             created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP\n);",
            table = self.name(),
        )
    }

    fn create_trigger_sql(self) -> String {
        format!(
            r#"
CREATE TRIGGER IF NOT EXISTS {trigger}
AFTER INSERT ON {table}
FOR EACH ROW
WHEN NEW.created_at IS NULL
BEGIN
    UPDATE {table} SET created_at = CURRENT_TIMESTAMP WHERE id = NEW.id;
END;
"#,
            trigger = self.trigger_name(),
            table = self.name(),
        )
    }
}

/// Switch the database file to WAL journaling.
///
/// The mode is persistent in the file, so one connection is enough.
pub fn enable_wal(conn: &Connection) -> rusqlite::Result<()> {
    let mode: String =
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
    if !mode.eq_ignore_ascii_case("wal") {
        tracing::warn!(journal_mode = %mode, "Store did not switch to WAL");
    }
    Ok(())
}

/// Per-connection pragmas. `NORMAL` sync is durable across application
/// crashes in WAL mode.
pub fn apply_connection_pragmas(conn: &Connection) -> rusqlite::Result<()> {
    conn.pragma_update(None, "synchronous", "NORMAL")
}

/// Create every event table and its timestamp trigger on `conn`.
///
/// All tables are attempted even if one fails; the last failure is
/// returned after each has been logged.
pub fn initialize_schema(conn: &Connection) -> Result<(), SchemaError> {
    let mut last_error = None;
    for table in Table::ALL {
        if let Err(err) = create_table(conn, table) {
            tracing::error!(table = table.name(), error = %err, "Schema setup failed");
            last_error = Some(err);
        }
    }
    last_error.map_or(Ok(()), Err)
}

/// Ensure the event schema exists in the store.
///
/// Safe to call on every start; existing tables and triggers are kept.
pub fn ensure_schema(store: &StoreHandle) -> Result<(), SchemaError> {
    let _guard = store.lock_writes();
    let conn = store.get()?;
    initialize_schema(&conn)?;
    tracing::info!(tables = Table::ALL.len(), "Schema ready");
    Ok(())
}

fn create_table(conn: &Connection, table: Table) -> Result<(), SchemaError> {
    conn.execute_batch(&table.create_table_sql())
        .map_err(|source| SchemaError::Table {
            table: table.name(),
            source,
        })?;
    conn.execute_batch(&table.create_trigger_sql())
        .map_err(|source| SchemaError::Trigger {
            table: table.name(),
            source,
        })
}
