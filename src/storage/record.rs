//! Events and dynamic records, and the insert statements built from them.
//!
//! [`Event`] is the typed path: each variant knows its table and binds its
//! fields in the table's column order. [`Record`] is the dynamic path: any
//! column set, checked only by the store itself.

use rusqlite::types::Value;
use rusqlite::ToSql;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::schema::Table;

/// Error type for building records from JSON.
#[derive(Debug, Error)]
pub enum RecordError {
    #[error("expected a JSON object of column values")]
    NotAnObject,

    #[error("column {column} holds a non-scalar value")]
    NonScalar { column: String },

    #[error("column {column} holds an integer outside the 64-bit signed range")]
    IntegerOutOfRange { column: String },
}

/// Quote an SQL identifier, doubling any embedded quotes.
pub fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Build `INSERT INTO "table" ("c1", ...) VALUES (?1, ...)`.
///
/// Columns and placeholders come from the same pass, so placeholder `?i`
/// always belongs to the `i`-th column.
pub fn insert_statement<'a>(table: &str, columns: impl IntoIterator<Item = &'a str>) -> String {
    let (names, placeholders): (Vec<String>, Vec<String>) = columns
        .into_iter()
        .enumerate()
        .map(|(i, column)| (quote_identifier(column), format!("?{}", i + 1)))
        .unzip();
    format!(
        "INSERT INTO {} ({}) VALUES ({})",
        quote_identifier(table),
        names.join(", "),
        placeholders.join(", ")
    )
}

/// A row to insert: column names mapped to scalar values.
///
/// Columns keep the order they were first set in.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Record {
    fields: Vec<(String, Value)>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a column, builder style.
    #[must_use]
    pub fn with(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set(column, value);
        self
    }

    /// Set a text column, builder style.
    #[must_use]
    pub fn with_text(self, column: impl Into<String>, value: impl Into<String>) -> Self {
        self.with(column, value.into())
    }

    /// Set a column, returning its previous value.
    ///
    /// An existing column is updated in place and keeps its position.
    pub fn set(&mut self, column: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        let column = column.into();
        let value = value.into();
        match self.fields.iter_mut().find(|(name, _)| *name == column) {
            Some((_, slot)) => Some(std::mem::replace(slot, value)),
            None => {
                self.fields.push((column, value));
                None
            }
        }
    }

    pub fn get(&self, column: &str) -> Option<&Value> {
        self.fields
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, value)| value)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(name, _)| name.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().map(|(name, value)| (name.as_str(), value))
    }

    /// Values in column order, ready for binding.
    pub fn params(&self) -> Vec<&dyn ToSql> {
        self.fields
            .iter()
            .map(|(_, value)| value as &dyn ToSql)
            .collect()
    }

    /// Build a record from a JSON object of scalars.
    ///
    /// Booleans become 0/1, integral numbers become integers, other numbers
    /// reals. Arrays, objects and integers above `i64::MAX` are rejected.
    pub fn from_json(value: serde_json::Value) -> Result<Self, RecordError> {
        let serde_json::Value::Object(object) = value else {
            return Err(RecordError::NotAnObject);
        };

        let mut record = Record::new();
        for (column, value) in object {
            let value = match value {
                serde_json::Value::Null => Value::Null,
                serde_json::Value::Bool(b) => Value::Integer(i64::from(b)),
                serde_json::Value::Number(n) => match n.as_i64() {
                    Some(i) => Value::Integer(i),
                    None if n.is_u64() => {
                        return Err(RecordError::IntegerOutOfRange { column });
                    }
                    None => Value::Real(n.as_f64().unwrap_or(f64::NAN)),
                },
                serde_json::Value::String(s) => Value::Text(s),
                serde_json::Value::Array(_) | serde_json::Value::Object(_) => {
                    return Err(RecordError::NonScalar { column });
                }
            };
            record.set(column, value);
        }
        Ok(record)
    }
}

/// A peer-to-peer server event, stored in `p2pserver`.
///
/// Omitted fields are stored as NULL.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerServerEvent {
    #[serde(rename = "type")]
    pub event_type: Option<String>,
    pub name: Option<String>,
    pub addr: Option<String>,
    pub message: Option<String>,
    pub pid: Option<String>,
}

/// A node discovery event, stored in `nodedisc`.
///
/// `target_*` fields describe the node being looked up, `node_*` fields
/// the node that answered.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeDiscoveryEvent {
    #[serde(rename = "discV")]
    pub disc_version: Option<String>,
    #[serde(rename = "type")]
    pub event_type: Option<String>,
    pub agent: Option<String>,
    pub msg: Option<String>,
    #[serde(rename = "tid")]
    pub target_id: Option<String>,
    #[serde(rename = "tAddr")]
    pub target_addr: Option<String>,
    #[serde(rename = "tKey")]
    pub target_key: Option<String>,
    #[serde(rename = "nid")]
    pub node_id: Option<String>,
    #[serde(rename = "nAddr")]
    pub node_addr: Option<String>,
    #[serde(rename = "nKey")]
    pub node_key: Option<String>,
}

/// Any event the log accepts.
///
/// Serialized with a `kind` tag: `{"kind":"peer_server", ...}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Event {
    PeerServer(PeerServerEvent),
    NodeDiscovery(NodeDiscoveryEvent),
}

impl Event {
    pub fn table(&self) -> Table {
        match self {
            Event::PeerServer(_) => Table::PeerServer,
            Event::NodeDiscovery(_) => Table::NodeDiscovery,
        }
    }

    /// Field values in the order of [`Table::columns`].
    pub fn params(&self) -> Vec<&dyn ToSql> {
        match self {
            Event::PeerServer(e) => vec![
                &e.event_type as &dyn ToSql,
                &e.name,
                &e.addr,
                &e.message,
                &e.pid,
            ],
            Event::NodeDiscovery(e) => vec![
                &e.disc_version as &dyn ToSql,
                &e.event_type,
                &e.agent,
                &e.msg,
                &e.target_id,
                &e.target_addr,
                &e.target_key,
                &e.node_id,
                &e.node_addr,
                &e.node_key,
            ],
        }
    }
}

impl From<PeerServerEvent> for Event {
    fn from(event: PeerServerEvent) -> Self {
        Event::PeerServer(event)
    }
}

impl From<NodeDiscoveryEvent> for Event {
    fn from(event: NodeDiscoveryEvent) -> Self {
        Event::NodeDiscovery(event)
    }
}
