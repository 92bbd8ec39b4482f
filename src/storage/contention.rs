//! Lock-contention classification and bounded retry.
//!
//! A write is attempted, and if SQLite reports that another writer holds the
//! lock the policy sleeps and tries again. Any other failure ends the write
//! immediately. Running out of attempts is an error of its own,
//! [`WriteError::RetryExhausted`], so callers can tell a busy store from a
//! broken statement.

use rusqlite::ffi::ErrorCode;
use std::thread;
use std::time::Duration;

use super::writer::WriteError;

/// Default number of attempts per write.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Default delay after the first locked attempt.
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(100);

/// Upper bound for a single backoff sleep.
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(2);

/// Check if a rusqlite error means the store is transiently locked.
pub fn is_lock_contention(err: &rusqlite::Error) -> bool {
    match err {
        rusqlite::Error::SqliteFailure(failure, message) => {
            matches!(
                failure.code,
                ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked
            ) || message
                .as_deref()
                .is_some_and(|m| m.contains("database is locked"))
        }
        _ => false,
    }
}

/// Result of an operation that eventually succeeded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Completed<T> {
    pub value: T,
    /// Attempts used, including the successful one
    pub attempts: u32,
}

/// Bounded retry with exponential backoff for locked-store errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    base_delay: Duration,
    max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay: DEFAULT_BASE_DELAY,
            max_delay: DEFAULT_MAX_DELAY,
        }
    }
}

impl RetryPolicy {
    /// Create a policy. At least one attempt is always made.
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            max_delay: DEFAULT_MAX_DELAY.max(base_delay),
        }
    }

    /// Cap a single backoff sleep.
    #[must_use]
    pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = max_delay;
        self
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Sleep after the `attempt`-th locked attempt (1-based).
    ///
    /// Doubles from the base delay and saturates at the cap.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1u32
            .checked_shl(attempt.saturating_sub(1))
            .unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }

    /// Run `op` until it succeeds, fails for a reason other than lock
    /// contention, or the attempts are used up.
    pub fn run<T, F>(&self, mut op: F) -> Result<Completed<T>, WriteError>
    where
        F: FnMut() -> rusqlite::Result<T>,
    {
        let mut attempts = 0;
        loop {
            attempts += 1;
            let err = match op() {
                Ok(value) => return Ok(Completed { value, attempts }),
                Err(err) => err,
            };

            if !is_lock_contention(&err) {
                return Err(WriteError::Database(err));
            }
            if attempts >= self.max_attempts {
                return Err(WriteError::RetryExhausted {
                    attempts,
                    source: err,
                });
            }

            let delay = self.backoff(attempts);
            tracing::warn!(
                attempt = attempts,
                max_attempts = self.max_attempts,
                delay_ms = delay.as_millis() as u64,
                "Store is locked, retrying"
            );
            thread::sleep(delay);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::ffi;

    fn locked() -> rusqlite::Error {
        rusqlite::Error::SqliteFailure(
            ffi::Error::new(ffi::SQLITE_BUSY),
            Some("database is locked".into()),
        )
    }

    fn constraint() -> rusqlite::Error {
        rusqlite::Error::SqliteFailure(
            ffi::Error::new(ffi::SQLITE_CONSTRAINT),
            Some("UNIQUE constraint failed".into()),
        )
    }

    fn fast_policy(attempts: u32) -> RetryPolicy {
        RetryPolicy::new(attempts, Duration::from_millis(1))
    }

    #[test]
    fn test_classifies_lock_errors() {
        assert!(is_lock_contention(&locked()));
        assert!(is_lock_contention(&rusqlite::Error::SqliteFailure(
            ffi::Error::new(ffi::SQLITE_LOCKED),
            None,
        )));
        // Message match alone is enough
        assert!(is_lock_contention(&rusqlite::Error::SqliteFailure(
            ffi::Error::new(ffi::SQLITE_ERROR),
            Some("database is locked".into()),
        )));
        assert!(!is_lock_contention(&constraint()));
        assert!(!is_lock_contention(&rusqlite::Error::QueryReturnedNoRows));
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let policy = RetryPolicy::new(10, Duration::from_millis(100))
            .with_max_delay(Duration::from_millis(500));
        assert_eq!(policy.backoff(1), Duration::from_millis(100));
        assert_eq!(policy.backoff(2), Duration::from_millis(200));
        assert_eq!(policy.backoff(3), Duration::from_millis(400));
        assert_eq!(policy.backoff(4), Duration::from_millis(500));
        assert_eq!(policy.backoff(64), Duration::from_millis(500));
    }

    #[test]
    fn test_first_attempt_success() {
        let done = fast_policy(3).run(|| Ok(7)).unwrap();
        assert_eq!(done, Completed { value: 7, attempts: 1 });
    }

    #[test]
    fn test_retries_until_unlocked() {
        let mut calls = 0;
        let done = fast_policy(3)
            .run(|| {
                calls += 1;
                if calls < 3 {
                    Err(locked())
                } else {
                    Ok("row")
                }
            })
            .unwrap();
        assert_eq!(done.value, "row");
        assert_eq!(done.attempts, 3);
    }

    #[test]
    fn test_exhaustion_is_an_error() {
        let mut calls = 0;
        let err = fast_policy(3)
            .run(|| -> rusqlite::Result<()> {
                calls += 1;
                Err(locked())
            })
            .unwrap_err();
        assert_eq!(calls, 3);
        assert!(matches!(err, WriteError::RetryExhausted { attempts: 3, .. }));
    }

    #[test]
    fn test_other_errors_are_not_retried() {
        let mut calls = 0;
        let err = fast_policy(5)
            .run(|| -> rusqlite::Result<()> {
                calls += 1;
                Err(constraint())
            })
            .unwrap_err();
        assert_eq!(calls, 1);
        assert!(matches!(err, WriteError::Database(_)));
    }

    #[test]
    fn test_zero_attempts_still_tries_once() {
        let policy = RetryPolicy::new(0, Duration::from_millis(1));
        assert_eq!(policy.max_attempts(), 1);
        assert!(matches!(
            policy.run(|| -> rusqlite::Result<()> { Err(locked()) }),
            Err(WriteError::RetryExhausted { attempts: 1, .. })
        ));
    }
}
