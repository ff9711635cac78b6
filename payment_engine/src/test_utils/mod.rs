//! Test doubles and helpers shared by the engine's test suites.
//!
//! Enable the `test_utils` feature to use these from dependent crates' tests.

mod fixed_rates;
mod memory_ledger;

pub use fixed_rates::FixedRates;
pub use memory_ledger::MemoryLedger;

use crate::sqlite::SqliteDatabase;

/// A fresh in-memory database with all migrations applied.
///
/// The pool is capped at one connection: every connection to `sqlite::memory:` gets its
/// own private database, so a larger pool would scatter the schema across databases.
pub async fn new_test_database() -> SqliteDatabase {
    dotenvy::from_filename(".env.test").ok();
    let _ = env_logger::try_init();
    let db = SqliteDatabase::new_with_url("sqlite::memory:", 1).await.expect("Failed to open in-memory database");
    sqlx::migrate!("./migrations").run(db.pool()).await.expect("Failed to run migrations");
    db
}
