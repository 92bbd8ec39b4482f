//! Lock contention tests.
//!
//! A second raw connection holds `BEGIN EXCLUSIVE`, which is how another
//! process appears to the writer. With a zero busy timeout every insert
//! hits `SQLITE_BUSY` until the blocker commits.

mod common;

use common::{count_rows, TestFixture};
use nodelog::storage::record::Record;
use nodelog::{RetryPolicy, WriteError};
use rusqlite::Connection;
use std::thread;
use std::time::{Duration, Instant};

fn lock_store(fixture: &TestFixture) -> Connection {
    let blocker = Connection::open(&fixture.db_path).expect("failed to open blocker");
    blocker
        .execute_batch("BEGIN EXCLUSIVE;")
        .expect("failed to take exclusive lock");
    blocker
}

fn record() -> Record {
    Record::new().with_text("name", "node1").with_text("message", "hello")
}

/// Exhausted retries surface as their own error, and nothing is written.
#[test]
fn test_retry_exhaustion_is_reported() {
    common::init_tracing();
    let fixture = TestFixture::new();
    let writer = fixture.writer_with_policy(RetryPolicy::new(3, Duration::from_millis(20)));

    let blocker = lock_store(&fixture);
    let started = Instant::now();
    let err = writer.write("p2pserver", &record()).unwrap_err();

    match err {
        WriteError::RetryExhausted { attempts, .. } => assert_eq!(attempts, 3),
        other => panic!("expected RetryExhausted, got {other:?}"),
    }
    // Two backoff sleeps: 20ms + 40ms
    assert!(started.elapsed() >= Duration::from_millis(60));

    blocker.execute_batch("COMMIT;").unwrap();
    assert_eq!(count_rows(writer.store(), "p2pserver"), 0);

    let stats = writer.stats();
    assert_eq!(stats.exhausted, 1);
    assert_eq!(stats.retries, 2);
}

/// The write lock is released after exhaustion; the next write succeeds.
#[test]
fn test_store_usable_after_exhaustion() {
    let fixture = TestFixture::new();
    let writer = fixture.writer_with_policy(RetryPolicy::new(2, Duration::from_millis(5)));

    let blocker = lock_store(&fixture);
    assert!(writer.write("p2pserver", &record()).is_err());
    blocker.execute_batch("COMMIT;").unwrap();
    drop(blocker);

    assert_eq!(writer.write("p2pserver", &record()).unwrap(), 1);
}

/// A lock released during backoff is invisible to the caller.
#[test]
fn test_write_succeeds_once_lock_is_released() {
    let fixture = TestFixture::new();
    let policy = RetryPolicy::new(8, Duration::from_millis(20))
        .with_max_delay(Duration::from_millis(200));
    let writer = fixture.writer_with_policy(policy);

    let blocker = lock_store(&fixture);
    let releaser = thread::spawn(move || {
        thread::sleep(Duration::from_millis(100));
        blocker.execute_batch("COMMIT;").unwrap();
    });

    let id = writer.write("p2pserver", &record()).expect("write should outlast the lock");
    releaser.join().unwrap();

    assert_eq!(id, 1);
    let stats = writer.stats();
    assert!(stats.retries >= 1);
    assert_eq!(stats.exhausted, 0);
}

/// Non-lock errors fail on the first attempt even under a long policy.
#[test]
fn test_other_errors_skip_backoff() {
    let fixture = TestFixture::new();
    let writer = fixture.writer_with_policy(RetryPolicy::new(5, Duration::from_secs(1)));

    let started = Instant::now();
    let err = writer
        .write("p2pserver", &Record::new().with_text("bogus", "x"))
        .unwrap_err();

    assert!(matches!(err, WriteError::Database(_)));
    assert!(started.elapsed() < Duration::from_secs(1));
    assert_eq!(writer.stats().retries, 0);
}
