//! Observability for nodelog.
//!
//! Provides:
//! - Structured tracing setup
//! - Write counters shared by all writer clones

pub mod metrics;
pub mod tracing;
