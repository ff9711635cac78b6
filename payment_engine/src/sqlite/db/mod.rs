//! # SQLite database methods
//!
//! This module contains "low-level" SQLite database interactions.
//!
//! All these interactions are maintained by simple functions (rather than stateful
//! structs) that accept a `&mut SqliteConnection` argument. Callers can obtain a
//! connection from a pool, or create an atomic transaction as the need arises and call
//! through to the functions without any other changes.
use std::env;

use log::info;
use sqlx::{sqlite::SqlitePoolOptions, Error as SqlxError, SqlitePool};

pub mod exchange_rates;
pub mod failures;
pub mod orders;
pub mod receipts;

const SQLITE_DB_URL: &str = "sqlite://data/opg_store.db";

pub fn db_url() -> String {
    let result = env::var("OPG_DATABASE_URL").unwrap_or_else(|_| {
        info!("OPG_DATABASE_URL is not set. Using the default.");
        SQLITE_DB_URL.to_string()
    });
    info!("Using database URL: {result}");
    result
}

pub async fn new_pool(url: &str, max_connections: u32) -> Result<SqlitePool, SqlxError> {
    // SQLite connections are in-process: there is no liveness to probe on acquire and
    // no server to expire idle connections, so the acquire-time ping and the idle/lifetime
    // reaper are no-ops here. They also break tests that run under tokio's paused clock,
    // which auto-advances straight past the reaper and acquire-timeout timers.
    let pool = SqlitePoolOptions::new()
        .max_connections(max_connections)
        .test_before_acquire(false)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect(url)
        .await?;
    Ok(pool)
}
