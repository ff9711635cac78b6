//! Reconciliation of payment notifications against orders.
//!
//! The [`ReconciliationEngine`] is the conductor of the whole payment flow. It accepts
//! verification requests from two sources (client notifications and the ledger
//! subscription stream), drives each one through verification with retry and backoff,
//! hands verified payments to settlement, and records terminal failures for operators.
//!
//! Requests for the same `(order id, transaction)` pair are coalesced: concurrent
//! notifications share a single in-flight verification and all observe its outcome.

mod engine;

use std::time::Duration;

use thiserror::Error;

use crate::{
    db_types::{OrderId, TxHash},
    traits::{PaymentGatewayError, SettledOrder},
    verifier::VerifyError,
};

pub use engine::ReconciliationEngine;

//--------------------------------------     RetryPolicy       -------------------------------------------------------
/// Backoff schedule for transient verification failures. The delay doubles after every
/// attempt, capped at `max_delay`.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { max_attempts: 5, initial_delay: Duration::from_secs(1), max_delay: Duration::from_secs(60) }
    }
}

impl RetryPolicy {
    /// The delay to apply after the given (1-based) attempt has failed.
    pub fn delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        self.initial_delay.saturating_mul(1 << exponent).min(self.max_delay)
    }
}

//--------------------------------------    RequestState       -------------------------------------------------------
/// The lifecycle of a verification request. `Settled` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestState {
    Queued,
    Verifying,
    Settled,
    Failed,
}

//--------------------------------------  VerificationRequest  -------------------------------------------------------
/// A single notification being driven through verification.
#[derive(Debug, Clone)]
pub struct VerificationRequest {
    pub order_id: OrderId,
    pub tx_hash: TxHash,
    pub attempts: u32,
    pub state: RequestState,
}

impl VerificationRequest {
    pub fn new(order_id: OrderId, tx_hash: TxHash) -> Self {
        Self { order_id, tx_hash, attempts: 0, state: RequestState::Queued }
    }

    pub fn begin_attempt(&mut self) {
        self.attempts += 1;
        self.state = RequestState::Verifying;
    }

    /// Record the terminal state matching the outcome.
    pub fn complete(&mut self, outcome: &RequestOutcome) {
        self.state = match outcome {
            RequestOutcome::Settled(_) => RequestState::Settled,
            RequestOutcome::Failed(_) => RequestState::Failed,
        };
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self.state, RequestState::Settled | RequestState::Failed)
    }
}

//--------------------------------------    RequestOutcome     -------------------------------------------------------
/// The terminal outcome of a verification request, shared with every coalesced waiter.
#[derive(Debug, Clone)]
pub enum RequestOutcome {
    Settled(SettledOrder),
    Failed(ReconciliationError),
}

//-------------------------------------- ReconciliationError   -------------------------------------------------------
#[derive(Debug, Clone, Error)]
pub enum ReconciliationError {
    #[error(transparent)]
    Verification(#[from] VerifyError),
    #[error(transparent)]
    Settlement(#[from] PaymentGatewayError),
    /// The retry budget for transient failures ran out. The transaction may still confirm
    /// later; a fresh notification starts a fresh request.
    #[error("Gave up on transaction {tx_hash} after {attempts} attempts. Last error: {last_error}")]
    RetriesExhausted { tx_hash: TxHash, attempts: u32, last_error: String },
    /// The in-flight verification task went away without reporting an outcome.
    #[error("The verification task was cancelled before it produced an outcome")]
    Cancelled,
}

#[cfg(test)]
mod test {
    use chrono::Utc;
    use opg_common::Money;

    use super::*;
    use crate::db_types::{Order, OrderStatus, PaymentStatus};

    fn pending_order(order_id: &str) -> Order {
        Order {
            id: 1,
            order_id: OrderId::from(order_id.to_string()),
            customer_id: "cust-1".to_string(),
            total_price: Money::from(1_000_000),
            currency: "USD".to_string(),
            status: OrderStatus::Pending,
            payment_status: PaymentStatus::Pending,
            payment_method: "crypto".to_string(),
            payer_address: None,
            settled_tx: None,
            settled_amount: None,
            settled_token: None,
            confirmations: None,
            settled_at: None,
            receipt_token_id: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn a_request_moves_through_its_lifecycle_states() {
        let mut request = VerificationRequest::new(OrderId::from("oid-1".to_string()), TxHash::from("0xaaa"));
        assert_eq!(request.state, RequestState::Queued);
        assert!(!request.is_terminal());
        request.begin_attempt();
        assert_eq!(request.state, RequestState::Verifying);
        assert_eq!(request.attempts, 1);
        let settled = SettledOrder { order: pending_order("oid-1"), newly_settled: true };
        request.complete(&RequestOutcome::Settled(settled));
        assert_eq!(request.state, RequestState::Settled);
        assert!(request.is_terminal());
    }

    #[test]
    fn a_failed_request_is_terminal() {
        let mut request = VerificationRequest::new(OrderId::from("oid-1".to_string()), TxHash::from("0xaaa"));
        request.begin_attempt();
        request.complete(&RequestOutcome::Failed(ReconciliationError::Cancelled));
        assert_eq!(request.state, RequestState::Failed);
        assert!(request.is_terminal());
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay(1), Duration::from_secs(1));
        assert_eq!(policy.delay(2), Duration::from_secs(2));
        assert_eq!(policy.delay(3), Duration::from_secs(4));
        assert_eq!(policy.delay(7), Duration::from_secs(60));
        assert_eq!(policy.delay(u32::MAX), Duration::from_secs(60));
    }
}
