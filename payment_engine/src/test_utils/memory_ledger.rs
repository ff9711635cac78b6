use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard},
};

use serde_json::json;
use tokio::sync::mpsc;

use crate::{
    db_types::{OrderId, TokenAddress, TxHash, WalletAddress},
    ledger::{ContractCall, LedgerClient, LedgerError, LogEntry, PaymentEvent, ReceiptMinted, TxReceipt,
        PAYMENT_RECEIVED_EVENT},
};

#[derive(Default)]
struct LedgerState {
    receipts: HashMap<TxHash, TxReceipt>,
    height: u64,
    offline: bool,
    calls: Vec<ContractCall>,
    subscribers: Vec<mpsc::Sender<PaymentEvent>>,
    mint_counter: u64,
    fetch_count: u64,
}

/// An in-memory stand-in for a blockchain node.
///
/// Receipts are inserted directly, the chain height is set by hand, and `send_call` mints
/// instantly: it records the call and fabricates a successful receipt carrying a
/// `ReceiptMinted` event from the called contract.
#[derive(Clone, Default)]
pub struct MemoryLedger {
    state: Arc<Mutex<LedgerState>>,
}

impl MemoryLedger {
    /// The payment contract address the fabricated receipts emit from.
    pub const PAYMENT_CONTRACT: &'static str = "0xpay";

    fn lock(&self) -> MutexGuard<'_, LedgerState> {
        self.state.lock().unwrap()
    }

    /// Build (but do not insert) a successful payment receipt with a single
    /// `PaymentReceived` event from [`MemoryLedger::PAYMENT_CONTRACT`].
    pub fn payment_receipt(
        &self,
        tx: &str,
        block_height: u64,
        payer: &str,
        token: &str,
        amount: i128,
        order_id: &str,
    ) -> TxReceipt {
        TxReceipt {
            tx_hash: TxHash::from(tx),
            block_height,
            success: true,
            sender: WalletAddress::from(payer),
            logs: vec![LogEntry {
                contract: WalletAddress::from(Self::PAYMENT_CONTRACT),
                event: PAYMENT_RECEIVED_EVENT.to_string(),
                fields: json!({
                    "payer": payer,
                    "token": token,
                    "amount": amount.to_string(),
                    "order_id": order_id,
                }),
            }],
        }
    }

    pub fn insert_receipt(&self, receipt: TxReceipt) {
        self.lock().receipts.insert(receipt.tx_hash.clone(), receipt);
    }

    pub fn set_height(&self, height: u64) {
        self.lock().height = height;
    }

    pub fn height(&self) -> u64 {
        self.lock().height
    }

    pub fn set_offline(&self, offline: bool) {
        self.lock().offline = offline;
    }

    /// Every contract call submitted through `send_call`, in order.
    pub fn calls(&self) -> Vec<ContractCall> {
        self.lock().calls.clone()
    }

    /// How many times `fetch_transaction` has been called.
    pub fn fetch_count(&self) -> u64 {
        self.lock().fetch_count
    }

    /// The number of live event subscriptions.
    pub fn subscriber_count(&self) -> usize {
        self.lock().subscribers.len()
    }

    /// Drop every subscription sender, ending the subscribers' event streams.
    pub fn drop_subscribers(&self) {
        self.lock().subscribers.clear();
    }

    /// Push a payment event to every live subscriber.
    pub async fn emit(&self, tx: &str, order_id: &str, payer: &str, token: &str, amount: i128) {
        let event = PaymentEvent {
            tx_hash: TxHash::from(tx),
            order_id: OrderId::from(order_id.to_string()),
            payer: WalletAddress::from(payer),
            token: TokenAddress::from(token),
            amount: opg_common::TokenAmount::from(amount),
        };
        let senders = self.lock().subscribers.clone();
        for sender in senders {
            let _ = sender.send(event.clone()).await;
        }
    }

    fn check_online(&self) -> Result<(), LedgerError> {
        if self.lock().offline {
            Err(LedgerError::Unavailable("node is offline".to_string()))
        } else {
            Ok(())
        }
    }
}

impl LedgerClient for MemoryLedger {
    async fn fetch_transaction(&self, tx: &TxHash) -> Result<Option<TxReceipt>, LedgerError> {
        self.check_online()?;
        let mut state = self.lock();
        state.fetch_count += 1;
        Ok(state.receipts.get(tx).cloned())
    }

    async fn current_height(&self) -> Result<u64, LedgerError> {
        self.check_online()?;
        Ok(self.lock().height)
    }

    async fn subscribe(&self) -> Result<mpsc::Receiver<PaymentEvent>, LedgerError> {
        self.check_online()?;
        let (sender, receiver) = mpsc::channel(16);
        self.lock().subscribers.push(sender);
        Ok(receiver)
    }

    async fn send_call(&self, call: ContractCall) -> Result<TxHash, LedgerError> {
        self.check_online()?;
        let mut state = self.lock();
        state.mint_counter += 1;
        let n = state.mint_counter;
        let tx_hash = TxHash::from(format!("0xmint-{n}"));
        let recipient = call.args.get("recipient").and_then(|v| v.as_str()).unwrap_or("0xunknown").to_string();
        let minted = ReceiptMinted { token_id: format!("receipt-{n}"), recipient: WalletAddress::from(recipient) };
        let receipt = TxReceipt {
            tx_hash: tx_hash.clone(),
            block_height: state.height,
            success: true,
            sender: WalletAddress::from("0xcustodian"),
            logs: vec![LogEntry {
                contract: call.contract.clone(),
                event: ReceiptMinted::EVENT.to_string(),
                fields: serde_json::to_value(&minted).unwrap_or_default(),
            }],
        };
        state.receipts.insert(tx_hash.clone(), receipt);
        state.calls.push(call);
        Ok(tx_hash)
    }
}
