//! Write counters.
//!
//! Key counters:
//! - written: rows inserted
//! - retries: locked attempts that were retried
//! - exhausted: writes that ran out of attempts
//! - failed: writes that returned an error of any kind

use std::sync::atomic::{AtomicU64, Ordering};

use crate::storage::writer::WriteError;

/// Lock-free counters shared by every clone of a writer.
#[derive(Debug, Default)]
pub struct WriteStats {
    written: AtomicU64,
    retries: AtomicU64,
    exhausted: AtomicU64,
    failed: AtomicU64,
}

/// Point-in-time copy of [`WriteStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub written: u64,
    pub retries: u64,
    pub exhausted: u64,
    pub failed: u64,
}

impl WriteStats {
    /// Count a row that was inserted after `attempts` tries.
    pub fn record_written(&self, attempts: u32) {
        self.written.fetch_add(1, Ordering::Relaxed);
        self.retries
            .fetch_add(u64::from(attempts.saturating_sub(1)), Ordering::Relaxed);
    }

    pub fn record_failed(&self, err: &WriteError) {
        self.failed.fetch_add(1, Ordering::Relaxed);
        if let WriteError::RetryExhausted { attempts, .. } = err {
            self.exhausted.fetch_add(1, Ordering::Relaxed);
            self.retries
                .fetch_add(u64::from(attempts.saturating_sub(1)), Ordering::Relaxed);
        }
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            written: self.written.load(Ordering::Relaxed),
            retries: self.retries.load(Ordering::Relaxed),
            exhausted: self.exhausted.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
        }
    }
}
