use opg_common::TokenAmount;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    db_types::{NewOrder, Order, OrderId, Receipt, SettlementFailure, TxHash},
    verifier::VerificationResult,
};

/// This trait defines the behaviour for backends supporting the payment gateway.
///
/// This behaviour includes:
/// * Idempotent order intake on behalf of the storefront collaborator.
/// * The atomic settlement transition, which is the only code path that may mark an order
///   as paid.
/// * Receipt persistence and the settlement-failure audit trail.
#[allow(async_fn_in_trait)]
pub trait PaymentGatewayDatabase: Clone + Send + Sync + 'static {
    /// The URL of the database
    fn url(&self) -> &str;

    /// Store a new order. Idempotent: returns the existing order and `false` in the
    /// second element if an order with the same `order_id` already exists.
    fn insert_order(&self, order: NewOrder) -> impl std::future::Future<Output = Result<(Order, bool), PaymentGatewayError>> + Send;

    fn fetch_order_by_order_id(&self, order_id: &OrderId) -> impl std::future::Future<Output = Result<Option<Order>, PaymentGatewayError>> + Send;

    /// Apply the settlement transition for a verified payment, atomically:
    ///
    /// 1. Re-read the order. If its payment status is already `Completed`, return the
    ///    order unchanged with `newly_settled == false`.
    /// 2. Enforce the double-spend guard: no other order may carry this transaction hash.
    /// 3. Check the paid amount against `expected` with the 1% tolerance band.
    /// 4. Set payment status `Completed`, order status `Confirmed`, and persist the
    ///    payment facts.
    ///
    /// Failures in steps 2-3 roll the transaction back and leave the order untouched.
    fn settle_order(
        &self,
        payment: &VerificationResult,
        expected: TokenAmount,
    ) -> impl std::future::Future<Output = Result<SettledOrder, PaymentGatewayError>> + Send;

    /// Append a terminal failure to the audit trail so an operator can reconcile it.
    fn record_settlement_failure(
        &self,
        order_id: &OrderId,
        tx_hash: &TxHash,
        reason: &str,
    ) -> impl std::future::Future<Output = Result<(), PaymentGatewayError>> + Send;

    /// Terminal failures recorded for an order, oldest first.
    fn fetch_settlement_failures(&self, order_id: &OrderId) -> impl std::future::Future<Output = Result<Vec<SettlementFailure>, PaymentGatewayError>> + Send;

    /// The receipt for an order, if one has been minted.
    fn fetch_receipt_for_order(&self, order_id: &OrderId) -> impl std::future::Future<Output = Result<Option<Receipt>, PaymentGatewayError>> + Send;

    /// Persist a freshly minted receipt and stamp the token id onto the order. At most
    /// one receipt may exist per order.
    fn insert_receipt(&self, receipt: NewReceipt) -> impl std::future::Future<Output = Result<Receipt, PaymentGatewayError>> + Send;

    /// Closes the database connection.
    fn close(&mut self) -> impl std::future::Future<Output = Result<(), PaymentGatewayError>> + Send {
        async { Ok(()) }
    }
}

//--------------------------------------     SettledOrder      -------------------------------------------------------
/// The outcome of a successful settlement call. `newly_settled` is `false` when the order
/// was already completed and the call was a no-op.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SettledOrder {
    pub order: Order,
    pub newly_settled: bool,
}

//--------------------------------------      NewReceipt       -------------------------------------------------------
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewReceipt {
    pub order_id: OrderId,
    pub token_id: String,
    pub metadata_uri: String,
    pub mint_tx: TxHash,
}

//-------------------------------------- PaymentGatewayError   -------------------------------------------------------
#[derive(Debug, Clone, Error)]
pub enum PaymentGatewayError {
    #[error("We have an internal database engine error (configuration/uptime etc.): {0}")]
    DatabaseError(String),
    #[error("The requested order {0} does not exist")]
    OrderNotFound(OrderId),
    #[error("Transaction {0} has already settled another order")]
    DuplicateTransaction(TxHash),
    #[error("Paid amount {paid} is below the accepted tolerance of expected amount {expected}")]
    InsufficientAmount { expected: TokenAmount, paid: TokenAmount },
    #[error("A receipt already exists for order {0}")]
    ReceiptAlreadyExists(OrderId),
    #[error("No exchange rate is available for token {0}")]
    NoExchangeRate(String),
}

impl PaymentGatewayError {
    /// True for the two terminal payment-problem outcomes of settlement. These must reach
    /// an operator; they are never retried automatically.
    pub fn is_payment_mismatch(&self) -> bool {
        matches!(self, PaymentGatewayError::DuplicateTransaction(_) | PaymentGatewayError::InsufficientAmount { .. })
    }
}

impl From<sqlx::Error> for PaymentGatewayError {
    fn from(e: sqlx::Error) -> Self {
        PaymentGatewayError::DatabaseError(e.to_string())
    }
}
