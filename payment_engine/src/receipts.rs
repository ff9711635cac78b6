//! Receipt issuance.
//!
//! Once an order has settled, a proof-of-purchase token is minted to the paying wallet
//! through the receipt contract. Issuance is idempotent per order, and a failure to store
//! the metadata document never blocks the mint: the receipt falls back to a placeholder
//! URI and the metadata can be re-pinned later.
use std::time::Duration;

use log::*;
use serde_json::json;
use thiserror::Error;

use crate::{
    db_types::{Order, OrderId, PaymentStatus, Receipt, TxHash, WalletAddress},
    ledger::{ContractCall, LedgerClient, LedgerError, ReceiptMinted},
    traits::{NewReceipt, PaymentGatewayDatabase, PaymentGatewayError, StorageBackend},
};

const MINT_POLL_ATTEMPTS: u32 = 10;
const MINT_POLL_DELAY: Duration = Duration::from_secs(2);

//--------------------------------------    ReceiptError       -------------------------------------------------------
#[derive(Debug, Clone, Error)]
pub enum ReceiptError {
    #[error("The requested order {0} does not exist")]
    OrderNotFound(OrderId),
    /// The order exists but has no settled payment, so there is nothing to attest to.
    #[error("Order {0} has not been paid. A receipt can only be issued for a settled order.")]
    OrderNotPaid(OrderId),
    /// The mint transaction was submitted but did not confirm within the polling window.
    /// The transaction may still land; a later issuance call picks it up via the ledger.
    #[error("The mint transaction {0} has not confirmed yet")]
    MintUnconfirmed(TxHash),
    /// The mint transaction confirmed but did not produce a usable mint event.
    #[error("The mint transaction {0} failed on-chain")]
    MintFailed(TxHash),
    #[error(transparent)]
    Ledger(#[from] LedgerError),
    #[error(transparent)]
    Database(#[from] PaymentGatewayError),
}

//--------------------------------------     ReceiptApi        -------------------------------------------------------
pub struct ReceiptApi<B, L, S> {
    db: B,
    ledger: L,
    storage: S,
    receipt_contract: WalletAddress,
}

impl<B: Clone, L: Clone, S: Clone> Clone for ReceiptApi<B, L, S> {
    fn clone(&self) -> Self {
        Self {
            db: self.db.clone(),
            ledger: self.ledger.clone(),
            storage: self.storage.clone(),
            receipt_contract: self.receipt_contract.clone(),
        }
    }
}

impl<B, L, S> ReceiptApi<B, L, S>
where
    B: PaymentGatewayDatabase,
    L: LedgerClient,
    S: StorageBackend,
{
    pub fn new(db: B, ledger: L, storage: S, receipt_contract: WalletAddress) -> Self {
        Self { db, ledger, storage, receipt_contract }
    }

    /// Issue the proof-of-purchase token for a settled order.
    ///
    /// Idempotent: if a receipt already exists for the order it is returned as-is, no
    /// matter how often this is called.
    pub async fn issue(&self, order_id: &OrderId) -> Result<Receipt, ReceiptError> {
        if let Some(receipt) = self.db.fetch_receipt_for_order(order_id).await? {
            debug!("🧾️ Order {order_id} already has receipt token {}.", receipt.token_id);
            return Ok(receipt);
        }
        let order = self
            .db
            .fetch_order_by_order_id(order_id)
            .await?
            .ok_or_else(|| ReceiptError::OrderNotFound(order_id.clone()))?;
        if order.payment_status != PaymentStatus::Completed {
            return Err(ReceiptError::OrderNotPaid(order_id.clone()));
        }
        let recipient = order.payer_address.clone().ok_or_else(|| ReceiptError::OrderNotPaid(order_id.clone()))?;
        let metadata_uri = self.store_metadata(&order).await;
        let call = ContractCall::new(
            self.receipt_contract.clone(),
            "mintReceipt",
            json!({
                "recipient": recipient,
                "order_id": order_id,
                "metadata_uri": metadata_uri,
            }),
        );
        let mint_tx = self.ledger.send_call(call).await?;
        info!("🧾️ Mint transaction {mint_tx} submitted for order {order_id}.");
        let minted = self.await_mint(&mint_tx).await?;
        let new_receipt = NewReceipt {
            order_id: order_id.clone(),
            token_id: minted.token_id,
            metadata_uri,
            mint_tx: mint_tx.clone(),
        };
        let receipt = match self.db.insert_receipt(new_receipt).await {
            Ok(receipt) => receipt,
            // A concurrent issuance won the race. Return what it minted.
            Err(PaymentGatewayError::ReceiptAlreadyExists(_)) => {
                warn!("🧾️ A receipt for order {order_id} was minted concurrently. Mint {mint_tx} is redundant.");
                self.db
                    .fetch_receipt_for_order(order_id)
                    .await?
                    .ok_or_else(|| ReceiptError::OrderNotFound(order_id.clone()))?
            },
            Err(e) => return Err(e.into()),
        };
        info!("🧾️ Receipt token {} issued for order {order_id}.", receipt.token_id);
        Ok(receipt)
    }

    /// Build and store the metadata document, degrading to a placeholder URI rather than
    /// blocking issuance when the store is down.
    async fn store_metadata(&self, order: &Order) -> String {
        let metadata = receipt_metadata(order);
        let content = metadata.to_string();
        match self.storage.store(content.as_bytes()).await {
            Ok(uri) => uri,
            Err(e) => {
                warn!(
                    "🧾️ Could not store the receipt metadata for order {} ({e}). Using a placeholder URI.",
                    order.order_id
                );
                format!("placeholder://receipts/{}", order.order_id.as_str())
            },
        }
    }

    async fn await_mint(&self, mint_tx: &TxHash) -> Result<ReceiptMinted, ReceiptError> {
        for attempt in 1..=MINT_POLL_ATTEMPTS {
            match self.ledger.fetch_transaction(mint_tx).await {
                Ok(Some(receipt)) if !receipt.success => return Err(ReceiptError::MintFailed(mint_tx.clone())),
                Ok(Some(receipt)) => {
                    return receipt
                        .receipt_minted(&self.receipt_contract)
                        .ok_or_else(|| ReceiptError::MintFailed(mint_tx.clone()));
                },
                Ok(None) => {
                    trace!("🧾️ Mint transaction {mint_tx} not confirmed yet (attempt {attempt}/{MINT_POLL_ATTEMPTS}).")
                },
                Err(e) if e.is_retryable() => {
                    debug!("🧾️ Node unavailable while waiting for mint {mint_tx} ({e}). Retrying.")
                },
                Err(e) => return Err(e.into()),
            }
            tokio::time::sleep(MINT_POLL_DELAY).await;
        }
        Err(ReceiptError::MintUnconfirmed(mint_tx.clone()))
    }
}

/// The metadata document minted into the receipt token.
fn receipt_metadata(order: &Order) -> serde_json::Value {
    json!({
        "name": format!("Purchase receipt for order {}", order.order_id.as_str()),
        "order_id": order.order_id,
        "customer_id": order.customer_id,
        "total_price": order.total_price,
        "currency": order.currency,
        "payer": order.payer_address,
        "settled_tx": order.settled_tx,
        "settled_amount": order.settled_amount,
        "settled_token": order.settled_token,
        "settled_at": order.settled_at,
    })
}
