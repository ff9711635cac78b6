//! Ledger access layer.
//!
//! [`LedgerClient`] is the engine's only window onto the blockchain node. Everything above
//! it (verifier, reconciliation, receipts) is written against the trait, so the node can be
//! swapped for the in-memory fake in [`crate::test_utils`] in tests.

mod rpc;
mod types;

use thiserror::Error;
use tokio::sync::mpsc;

pub use rpc::RpcLedgerClient;
pub use types::{ContractCall, LogEntry, PaymentEvent, PaymentReceived, ReceiptMinted, TxReceipt, PAYMENT_RECEIVED_EVENT};

use crate::db_types::TxHash;

/// Read/write access to a blockchain node.
///
/// All read methods are shared across concurrent verifiers. `send_call` submits a contract
/// call signed by the custodial key held node-side, and is only used for receipt minting.
#[allow(async_fn_in_trait)]
pub trait LedgerClient: Clone + Send + Sync + 'static {
    /// Fetch the execution receipt for a transaction, or `None` if the node has not seen
    /// the transaction (yet).
    fn fetch_transaction(&self, tx: &TxHash) -> impl std::future::Future<Output = Result<Option<TxReceipt>, LedgerError>> + Send;

    /// The current tip height of the chain.
    fn current_height(&self) -> impl std::future::Future<Output = Result<u64, LedgerError>> + Send;

    /// Open a long-lived stream of payment events emitted by the configured payment
    /// contract. Implementations must reconnect and re-arm the stream on transport
    /// failures; the channel closing means the client itself has shut down, never a
    /// silently dropped subscription.
    fn subscribe(&self) -> impl std::future::Future<Output = Result<mpsc::Receiver<PaymentEvent>, LedgerError>> + Send;

    /// Submit a state-changing contract call on behalf of the custodial signer, returning
    /// the transaction hash.
    fn send_call(&self, call: ContractCall) -> impl std::future::Future<Output = Result<TxHash, LedgerError>> + Send;
}

#[derive(Debug, Clone, Error)]
pub enum LedgerError {
    /// The node cannot currently be reached. Distinct from "transaction not yet
    /// confirmed": callers may retry with backoff.
    #[error("The ledger node is unavailable: {0}")]
    Unavailable(String),
    /// The node answered with an RPC-level error.
    #[error("Ledger RPC error {code}: {message}")]
    Rpc { code: i64, message: String },
    /// The node answered with something we could not interpret.
    #[error("Unexpected response from the ledger node: {0}")]
    InvalidResponse(String),
}

impl LedgerError {
    /// Whether waiting and trying again can plausibly succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, LedgerError::Unavailable(_))
    }
}
