//! Order Payment Gateway engine
//!
//! The payment engine reconciles on-chain payments against storefront orders. It is
//! host-agnostic: the HTTP server is just one consumer of the APIs defined here.
//!
//! The library is divided into three main sections:
//! 1. Ledger access ([`mod@ledger`]). The [`ledger::LedgerClient`] trait is the engine's only
//!    window onto the blockchain node, with a JSON-RPC implementation for production and an
//!    in-memory fake for tests.
//! 2. The reconciliation pipeline: [`verifier::TransactionVerifier`] turns transaction hashes
//!    into trusted payment facts, [`reconciliation::ReconciliationEngine`] drives requests
//!    through retry and backoff, and [`settlement::SettlementApi`] applies the one atomic
//!    transition that marks an order as paid. [`receipts::ReceiptApi`] mints the
//!    proof-of-purchase token afterwards.
//! 3. Persistence ([`SqliteDatabase`]). Backends implement the traits in [`mod@traits`]; you
//!    should never need to touch the database directly outside of them.
//!
//! The engine also emits events when settlement reaches a terminal state. Hosts subscribe
//! through [`events::EventHooks`] to chain follow-up work (receipt minting, notifications)
//! without coupling it to the settlement path.

mod order_api;
mod sqlite;

pub mod db_types;
pub mod events;
pub mod exchange;
pub mod ledger;
pub mod receipts;
pub mod reconciliation;
pub mod settlement;
pub mod storage;
pub mod traits;
pub mod verifier;

#[cfg(any(feature = "test_utils", test))]
pub mod test_utils;

pub use order_api::OrderManagementApi;
pub use receipts::{ReceiptApi, ReceiptError};
pub use reconciliation::{ReconciliationEngine, ReconciliationError, RetryPolicy};
pub use settlement::SettlementApi;
pub use sqlite::SqliteDatabase;
