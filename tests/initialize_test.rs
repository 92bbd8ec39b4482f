//! Process-wide store initialization.
//!
//! Kept in its own test binary: the global handle lives for the whole
//! process, so every test here shares it.

mod common;

use clap::Parser;
use common::TestFixture;
use nodelog::config::{Config, StoreConfig};
use nodelog::storage::handle::{self, StoreHandle};
use nodelog::{ensure_schema, Error};
use std::thread;

#[test]
fn test_initialize_opens_one_store() {
    let fixture = TestFixture::new();
    let config = fixture.store_config();

    let handles: Vec<StoreHandle> = thread::scope(|scope| {
        let spawned: Vec<_> = (0..8)
            .map(|_| scope.spawn(|| handle::initialize(&config).expect("initialize failed")))
            .collect();
        spawned.into_iter().map(|h| h.join().unwrap()).collect()
    });

    let first = &handles[0];
    assert!(handles.iter().all(|h| h.same_store(first)));

    // Later calls return the same store, whatever they ask for
    let other = StoreConfig::new(fixture.temp_dir.path().join("other.db"));
    let again = handle::initialize(&other).unwrap();
    assert!(again.same_store(first));
    assert_eq!(again.db_path(), fixture.db_path.as_path());
    assert!(handle::global().is_some_and(|g| g.same_store(first)));

    // Schema setup is idempotent on the shared store
    ensure_schema(&again).unwrap();
    ensure_schema(&again).unwrap();

    // Crate-level initialize resolves the CLI config and returns the same store
    let cli = Config::try_parse_from([
        "nodelog",
        "--db-path",
        fixture.db_path.to_str().unwrap(),
        "init",
    ])
    .unwrap();
    assert!(nodelog::initialize(&cli).unwrap().same_store(first));

    // Configuration errors still surface before the global is consulted
    let bad = Config::try_parse_from([
        "nodelog",
        "--config",
        fixture.temp_dir.path().join("missing.yaml").to_str().unwrap(),
        "init",
    ])
    .unwrap();
    assert!(matches!(nodelog::initialize(&bad), Err(Error::Config(_))));
}
