//! SQLite storage layer for nodelog.
//!
//! Provides:
//! - The pooled, process-wide store handle
//! - Idempotent schema and trigger provisioning
//! - Typed events and dynamic records
//! - The serialized writer and its lock-contention retry policy

pub mod contention;
pub mod handle;
pub mod record;
pub mod schema;
pub mod writer;
