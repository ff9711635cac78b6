//! Trait definitions for the engine's collaborator seams.
//!
//! Specific backends (SQLite today) implement [`PaymentGatewayDatabase`] and
//! [`ExchangeRates`]; hosts pick a [`StorageBackend`] for receipt metadata. The apis in
//! the crate root are written against these traits so every collaborator can be replaced
//! in tests.

mod exchange_rates;
mod payment_gateway_database;
mod storage;

pub use exchange_rates::{ExchangeRateError, ExchangeRates};
pub use payment_gateway_database::{NewReceipt, PaymentGatewayDatabase, PaymentGatewayError, SettledOrder};
pub use storage::{StorageBackend, StorageError};
