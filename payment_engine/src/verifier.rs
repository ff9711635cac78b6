//! Transaction verification.
//!
//! The verifier turns a transaction hash into trusted payment facts. It never trusts the
//! subscription stream or the notifying client: the receipt is fetched from the node,
//! checked for execution success and confirmation depth, and the payment event is decoded
//! from the logs of the configured payment contract.

use log::*;
use opg_common::TokenAmount;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    db_types::{OrderId, TokenAddress, TxHash, WalletAddress},
    ledger::{LedgerClient, LedgerError},
};

//--------------------------------------  VerificationResult   -------------------------------------------------------
/// The decoded, verified payment facts for a transaction. Immutable; settlement copies the
/// accepted fields onto the order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationResult {
    pub tx_hash: TxHash,
    pub payer: WalletAddress,
    pub token: TokenAddress,
    /// The paid amount in the token's base units.
    pub amount: TokenAmount,
    pub order_id: OrderId,
    /// Confirmation depth observed at verification time.
    pub confirmations: u64,
}

//--------------------------------------     VerifyError       -------------------------------------------------------
#[derive(Debug, Clone, Error)]
pub enum VerifyError {
    /// The node has no receipt for the transaction yet.
    #[error("Transaction {0} was not found on the ledger")]
    NotFound(TxHash),
    /// Execution reverted; the transaction moved no funds and never will.
    #[error("Transaction {0} reverted on-chain")]
    Reverted(TxHash),
    /// The transaction is mined but not yet buried deep enough.
    #[error("Transaction has {confirmations} of {required} required confirmations")]
    InsufficientConfirmations { confirmations: u64, required: u64 },
    /// No payment event from the payment contract is present in the logs. Plain value
    /// transfers land here and must never settle an order.
    #[error("Transaction {0} does not contain a payment event from the payment contract")]
    EventMissing(TxHash),
    /// The payment event targets a different order than the one being verified.
    #[error("Transaction pays for order {actual}, not order {expected}")]
    OrderMismatch { expected: OrderId, actual: OrderId },
    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

impl VerifyError {
    /// Transient outcomes that the reconciliation engine may retry. Everything else is a
    /// real payment problem and is surfaced immediately.
    pub fn is_retryable(&self) -> bool {
        match self {
            VerifyError::NotFound(_) | VerifyError::InsufficientConfirmations { .. } => true,
            VerifyError::Ledger(e) => e.is_retryable(),
            _ => false,
        }
    }
}

//--------------------------------------  TransactionVerifier  -------------------------------------------------------
#[derive(Debug, Clone)]
pub struct TransactionVerifier<L> {
    ledger: L,
    payment_contract: WalletAddress,
    /// Minimum confirmation depth. Zero is legal for fully trusted dev networks; public
    /// networks should run with at least one.
    min_confirmations: u64,
}

impl<L> TransactionVerifier<L>
where L: LedgerClient
{
    pub fn new(ledger: L, payment_contract: WalletAddress, min_confirmations: u64) -> Self {
        Self { ledger, payment_contract, min_confirmations }
    }

    pub fn ledger(&self) -> &L {
        &self.ledger
    }

    /// Verify that `tx_hash` is a successful, sufficiently confirmed payment for
    /// `order_id`, and decode the payment facts from the receipt.
    pub async fn verify(&self, tx_hash: &TxHash, order_id: &OrderId) -> Result<VerificationResult, VerifyError> {
        let receipt = self
            .ledger
            .fetch_transaction(tx_hash)
            .await?
            .ok_or_else(|| VerifyError::NotFound(tx_hash.clone()))?;
        if !receipt.success {
            debug!("🔍️ Transaction {tx_hash} reverted. Order {order_id} cannot be settled by it.");
            return Err(VerifyError::Reverted(tx_hash.clone()));
        }
        let height = self.ledger.current_height().await?;
        let confirmations = height.saturating_sub(receipt.block_height);
        if confirmations < self.min_confirmations {
            trace!(
                "🔍️ Transaction {tx_hash} has {confirmations}/{} confirmations. Waiting.",
                self.min_confirmations
            );
            return Err(VerifyError::InsufficientConfirmations { confirmations, required: self.min_confirmations });
        }
        let event = receipt
            .payment_received(&self.payment_contract)
            .ok_or_else(|| VerifyError::EventMissing(tx_hash.clone()))?;
        if &event.order_id != order_id {
            return Err(VerifyError::OrderMismatch { expected: order_id.clone(), actual: event.order_id });
        }
        debug!(
            "🔍️ Transaction {tx_hash} verified: {} base units of {} from {} for order {order_id} \
             ({confirmations} confirmations)",
            event.amount, event.token, event.payer
        );
        Ok(VerificationResult {
            tx_hash: tx_hash.clone(),
            payer: event.payer,
            token: event.token,
            amount: event.amount,
            order_id: event.order_id,
            confirmations,
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::test_utils::MemoryLedger;

    fn verifier(ledger: &MemoryLedger, min_confirmations: u64) -> TransactionVerifier<MemoryLedger> {
        TransactionVerifier::new(ledger.clone(), WalletAddress::from("0xpay"), min_confirmations)
    }

    #[tokio::test]
    async fn missing_transaction_is_retryable() {
        let ledger = MemoryLedger::default();
        let v = verifier(&ledger, 1);
        let err = v.verify(&TxHash::from("0xnope"), &OrderId::from("oid-1".to_string())).await.unwrap_err();
        assert!(matches!(err, VerifyError::NotFound(_)));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn reverted_transaction_is_terminal() {
        let ledger = MemoryLedger::default();
        let mut receipt = ledger.payment_receipt("0xdead", 5, "0xalice", "native", 100, "oid-1");
        receipt.success = false;
        ledger.insert_receipt(receipt);
        ledger.set_height(50);
        let err = verifier(&ledger, 1)
            .verify(&TxHash::from("0xdead"), &OrderId::from("oid-1".to_string()))
            .await
            .unwrap_err();
        assert!(matches!(err, VerifyError::Reverted(_)));
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn confirmation_depth_is_monotonic() {
        let ledger = MemoryLedger::default();
        ledger.insert_receipt(ledger.payment_receipt("0xabc", 10, "0xalice", "native", 100, "oid-1"));
        ledger.set_height(10);
        let v = verifier(&ledger, 1);
        let oid = OrderId::from("oid-1".to_string());
        // 0 confirmations at the inclusion height
        let err = v.verify(&TxHash::from("0xabc"), &oid).await.unwrap_err();
        assert!(matches!(err, VerifyError::InsufficientConfirmations { confirmations: 0, required: 1 }));
        assert!(err.is_retryable());
        // accepted once the chain advances past the threshold
        ledger.set_height(11);
        let result = v.verify(&TxHash::from("0xabc"), &oid).await.unwrap();
        assert_eq!(result.confirmations, 1);
        // zero-confirmation networks accept immediately
        ledger.set_height(10);
        assert!(verifier(&ledger, 0).verify(&TxHash::from("0xabc"), &oid).await.is_ok());
    }

    #[tokio::test]
    async fn plain_transfer_is_event_missing() {
        let ledger = MemoryLedger::default();
        let mut receipt = ledger.payment_receipt("0xplain", 5, "0xalice", "native", 100, "oid-1");
        receipt.logs.clear();
        ledger.insert_receipt(receipt);
        ledger.set_height(50);
        let err = verifier(&ledger, 1)
            .verify(&TxHash::from("0xplain"), &OrderId::from("oid-1".to_string()))
            .await
            .unwrap_err();
        assert!(matches!(err, VerifyError::EventMissing(_)));
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn wrong_order_is_mismatch() {
        let ledger = MemoryLedger::default();
        ledger.insert_receipt(ledger.payment_receipt("0xabc", 5, "0xalice", "native", 100, "oid-2"));
        ledger.set_height(50);
        let err = verifier(&ledger, 1)
            .verify(&TxHash::from("0xabc"), &OrderId::from("oid-1".to_string()))
            .await
            .unwrap_err();
        assert!(matches!(err, VerifyError::OrderMismatch { .. }));
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn happy_path_decodes_payment_facts() {
        let ledger = MemoryLedger::default();
        ledger.insert_receipt(ledger.payment_receipt("0xabc", 5, "0xalice", "0xusdx", 39_600_000, "oid-1"));
        ledger.set_height(8);
        let result = verifier(&ledger, 1)
            .verify(&TxHash::from("0xabc"), &OrderId::from("oid-1".to_string()))
            .await
            .unwrap();
        assert_eq!(result.payer, WalletAddress::from("0xalice"));
        assert_eq!(result.token, TokenAddress::from("0xusdx"));
        assert_eq!(result.amount, TokenAmount::from(39_600_000));
        assert_eq!(result.confirmations, 3);
    }

    #[tokio::test]
    async fn node_outage_is_ledger_unavailable() {
        let ledger = MemoryLedger::default();
        ledger.set_offline(true);
        let err = verifier(&ledger, 1)
            .verify(&TxHash::from("0xabc"), &OrderId::from("oid-1".to_string()))
            .await
            .unwrap_err();
        assert!(matches!(err, VerifyError::Ledger(LedgerError::Unavailable(_))));
        assert!(err.is_retryable());
    }
}
