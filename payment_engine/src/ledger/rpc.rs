use std::time::Duration;

use log::*;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::json;
use tokio::sync::mpsc;

use super::{ContractCall, LedgerClient, LedgerError, PaymentEvent, TxReceipt};
use crate::db_types::{TxHash, WalletAddress};

const EVENT_CHANNEL_SIZE: usize = 100;
const INITIAL_RECONNECT_DELAY: Duration = Duration::from_secs(1);
const MAX_RECONNECT_DELAY: Duration = Duration::from_secs(60);

/// JSON-RPC client for a blockchain node.
///
/// The subscription is implemented as a polling loop over `chain_getPaymentEvents` rather
/// than a push socket. On node failures the loop backs off exponentially and re-arms
/// itself from the last delivered height, so a flaky node degrades into delayed delivery,
/// never lost delivery.
#[derive(Debug, Clone)]
pub struct RpcLedgerClient {
    client: reqwest::Client,
    url: String,
    payment_contract: WalletAddress,
    poll_interval: Duration,
}

impl RpcLedgerClient {
    pub fn new(url: String, payment_contract: WalletAddress, poll_interval: Duration) -> Self {
        Self { client: reqwest::Client::new(), url, payment_contract, poll_interval }
    }

    /// A raw JSON-RPC round trip. `Ok(None)` means the node answered with a null result,
    /// which for lookup methods means "not found".
    async fn rpc_opt<T: DeserializeOwned>(
        &self,
        method: &str,
        params: serde_json::Value,
    ) -> Result<Option<T>, LedgerError> {
        let body = json!({ "jsonrpc": "2.0", "id": rand::random::<u32>(), "method": method, "params": params });
        let response = self
            .client
            .post(&self.url)
            .json(&body)
            .send()
            .await
            .map_err(|e| LedgerError::Unavailable(format!("{method}: {e}")))?;
        let envelope: RpcResponse<T> = response
            .json()
            .await
            .map_err(|e| LedgerError::InvalidResponse(format!("{method}: {e}")))?;
        match envelope {
            RpcResponse { error: Some(err), .. } => Err(LedgerError::Rpc { code: err.code, message: err.message }),
            RpcResponse { result, .. } => Ok(result),
        }
    }

    async fn rpc<T: DeserializeOwned>(&self, method: &str, params: serde_json::Value) -> Result<T, LedgerError> {
        self.rpc_opt(method, params)
            .await?
            .ok_or_else(|| LedgerError::InvalidResponse(format!("{method}: response carried neither result nor error")))
    }
}

impl LedgerClient for RpcLedgerClient {
    async fn fetch_transaction(&self, tx: &TxHash) -> Result<Option<TxReceipt>, LedgerError> {
        self.rpc_opt("chain_getTransactionReceipt", json!([tx])).await
    }

    async fn current_height(&self) -> Result<u64, LedgerError> {
        self.rpc("chain_blockHeight", json!([])).await
    }

    async fn subscribe(&self) -> Result<mpsc::Receiver<PaymentEvent>, LedgerError> {
        let from_height = self.current_height().await?;
        let (sender, receiver) = mpsc::channel(EVENT_CHANNEL_SIZE);
        let client = self.clone();
        tokio::spawn(async move {
            client.poll_events(from_height, sender).await;
        });
        Ok(receiver)
    }

    async fn send_call(&self, call: ContractCall) -> Result<TxHash, LedgerError> {
        self.rpc("chain_sendContractCall", json!([call])).await
    }
}

impl RpcLedgerClient {
    async fn poll_events(self, mut from_height: u64, sender: mpsc::Sender<PaymentEvent>) {
        let mut reconnect_delay = INITIAL_RECONNECT_DELAY;
        info!("🔗️ Payment event stream armed from height {from_height}");
        loop {
            let params = json!([{ "contract": self.payment_contract, "from_height": from_height }]);
            match self.rpc::<EventBatch>("chain_getPaymentEvents", params).await {
                Ok(batch) => {
                    reconnect_delay = INITIAL_RECONNECT_DELAY;
                    for event in batch.events {
                        trace!("🔗️ Payment event for order {} in tx {}", event.order_id, event.tx_hash);
                        if sender.send(event).await.is_err() {
                            debug!("🔗️ Event subscriber dropped. Closing the payment event stream.");
                            return;
                        }
                    }
                    from_height = batch.next_height;
                    tokio::time::sleep(self.poll_interval).await;
                },
                Err(e) => {
                    warn!("🔗️ Payment event poll failed ({e}). Retrying in {}s.", reconnect_delay.as_secs());
                    tokio::time::sleep(reconnect_delay).await;
                    reconnect_delay = (reconnect_delay * 2).min(MAX_RECONNECT_DELAY);
                },
            }
        }
    }
}

#[derive(Debug, Deserialize)]
struct RpcResponse<T> {
    result: Option<T>,
    error: Option<RpcError>,
}

#[derive(Debug, Deserialize)]
struct RpcError {
    code: i64,
    message: String,
}

/// One page of payment events. `next_height` is the height to resume polling from.
#[derive(Debug, Serialize, Deserialize)]
struct EventBatch {
    next_height: u64,
    events: Vec<PaymentEvent>,
}
