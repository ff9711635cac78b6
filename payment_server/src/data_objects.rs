use chrono::{DateTime, Utc};
use payment_engine::db_types::{OrderId, Receipt, TxHash, WalletAddress};
use serde::{Deserialize, Serialize};

/// A client's claim that a transaction pays for an order. Nothing in it is trusted: the
/// engine verifies everything against the ledger.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentNotification {
    pub order_id: OrderId,
    pub tx_hash: TxHash,
    /// Optional hint, recorded nowhere. The payer of record comes from the payment event.
    #[serde(default)]
    pub payer: Option<WalletAddress>,
}

/// The receipt-status view returned by `GET /orders/{order_id}/receipt`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReceiptStatus {
    pub exists: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tx_hash: Option<TxHash>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata_uri: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub minted_at: Option<DateTime<Utc>>,
}

impl ReceiptStatus {
    pub fn none() -> Self {
        Self { exists: false, token_id: None, tx_hash: None, metadata_uri: None, minted_at: None }
    }
}

impl From<Receipt> for ReceiptStatus {
    fn from(receipt: Receipt) -> Self {
        Self {
            exists: true,
            token_id: Some(receipt.token_id),
            tx_hash: Some(receipt.mint_tx),
            metadata_uri: Some(receipt.metadata_uri),
            minted_at: Some(receipt.minted_at),
        }
    }
}
