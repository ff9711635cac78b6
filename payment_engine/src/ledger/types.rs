use opg_common::TokenAmount;
use serde::{Deserialize, Serialize};

use crate::db_types::{OrderId, TokenAddress, TxHash, WalletAddress};

/// The event name the payment contract emits for a structured payment. A plain value
/// transfer to the contract address does not produce this event and therefore never
/// settles an order.
pub const PAYMENT_RECEIVED_EVENT: &str = "PaymentReceived";

//--------------------------------------      TxReceipt        -------------------------------------------------------
/// The execution receipt of a mined transaction, as reported by the node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TxReceipt {
    pub tx_hash: TxHash,
    /// Height of the block the transaction was included in.
    pub block_height: u64,
    /// False when execution reverted. A reverted transaction moved no funds.
    pub success: bool,
    pub sender: WalletAddress,
    pub logs: Vec<LogEntry>,
}

impl TxReceipt {
    /// The decoded payment event emitted by `contract`, if the receipt contains one.
    pub fn payment_received(&self, contract: &WalletAddress) -> Option<PaymentReceived> {
        self.logs.iter().filter(|log| &log.contract == contract).find_map(LogEntry::payment_received)
    }

    /// The decoded receipt-mint event emitted by `contract`, if present.
    pub fn receipt_minted(&self, contract: &WalletAddress) -> Option<ReceiptMinted> {
        self.logs
            .iter()
            .filter(|log| &log.contract == contract && log.event == ReceiptMinted::EVENT)
            .find_map(|log| serde_json::from_value(log.fields.clone()).ok())
    }
}

//--------------------------------------       LogEntry        -------------------------------------------------------
/// A single event emitted during transaction execution, in the node's decoded JSON form.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    /// The contract that emitted the event.
    pub contract: WalletAddress,
    pub event: String,
    pub fields: serde_json::Value,
}

impl LogEntry {
    /// Decode this log as a [`PaymentReceived`] event. Returns `None` when the event name
    /// or the field layout does not match; a malformed payment event is treated the same
    /// as no event at all.
    pub fn payment_received(&self) -> Option<PaymentReceived> {
        if self.event != PAYMENT_RECEIVED_EVENT {
            return None;
        }
        serde_json::from_value(self.fields.clone()).ok()
    }
}

//--------------------------------------   PaymentReceived     -------------------------------------------------------
/// The structured payment event. `amount` is a decimal string in the token's base units;
/// decoding it through [`TokenAmount`] keeps all downstream comparisons in fixed point.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentReceived {
    pub payer: WalletAddress,
    pub token: TokenAddress,
    pub amount: TokenAmount,
    pub order_id: OrderId,
}

//--------------------------------------    ReceiptMinted      -------------------------------------------------------
/// Emitted by the receipt contract when a proof-of-purchase token is minted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceiptMinted {
    pub token_id: String,
    pub recipient: WalletAddress,
}

impl ReceiptMinted {
    pub const EVENT: &'static str = "ReceiptMinted";
}

//--------------------------------------     PaymentEvent      -------------------------------------------------------
/// A payment observed on the subscription stream. Carries enough to enqueue a
/// verification request; the verifier re-fetches and re-decodes the receipt rather than
/// trusting the stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentEvent {
    pub tx_hash: TxHash,
    pub order_id: OrderId,
    pub payer: WalletAddress,
    pub token: TokenAddress,
    pub amount: TokenAmount,
}

//--------------------------------------     ContractCall      -------------------------------------------------------
/// A state-changing call submitted through the custodial signer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContractCall {
    pub contract: WalletAddress,
    pub method: String,
    pub args: serde_json::Value,
}

impl ContractCall {
    pub fn new<S: Into<String>>(contract: WalletAddress, method: S, args: serde_json::Value) -> Self {
        Self { contract, method: method.into(), args }
    }
}

#[cfg(test)]
mod test {
    use serde_json::json;

    use super::*;

    fn payment_log() -> LogEntry {
        LogEntry {
            contract: WalletAddress::from("0xpay"),
            event: PAYMENT_RECEIVED_EVENT.to_string(),
            fields: json!({
                "payer": "0xalice",
                "token": "native",
                "amount": "39600000",
                "order_id": "oid-1001",
            }),
        }
    }

    #[test]
    fn decodes_payment_event() {
        let event = payment_log().payment_received().unwrap();
        assert_eq!(event.payer, WalletAddress::from("0xalice"));
        assert!(event.token.is_native());
        assert_eq!(event.amount, TokenAmount::from(39_600_000));
        assert_eq!(event.order_id, OrderId::from("oid-1001".to_string()));
    }

    #[test]
    fn other_events_do_not_decode() {
        let mut log = payment_log();
        log.event = "Transfer".to_string();
        assert!(log.payment_received().is_none());
    }

    #[test]
    fn malformed_fields_do_not_decode() {
        let mut log = payment_log();
        log.fields = json!({ "amount": "not-a-number" });
        assert!(log.payment_received().is_none());
    }

    #[test]
    fn receipt_scans_for_contract_address() {
        let receipt = TxReceipt {
            tx_hash: TxHash::from("0xabc"),
            block_height: 10,
            success: true,
            sender: WalletAddress::from("0xalice"),
            logs: vec![
                LogEntry { contract: WalletAddress::from("0xother"), ..payment_log() },
                payment_log(),
            ],
        };
        assert!(receipt.payment_received(&WalletAddress::from("0xpay")).is_some());
        assert!(receipt.payment_received(&WalletAddress::from("0xmissing")).is_none());
    }
}
