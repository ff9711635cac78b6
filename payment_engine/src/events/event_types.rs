use serde::{Deserialize, Serialize};

use crate::db_types::{Order, OrderId, TxHash};

/// Published once settlement has committed. The order in the event is the post-settlement
/// row (payment status `Completed`, order status `Confirmed`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderSettledEvent {
    pub order: Order,
}

impl OrderSettledEvent {
    pub fn new(order: Order) -> Self {
        Self { order }
    }
}

/// Published when a verification request reaches a terminal failure. These indicate a
/// real payment problem (wrong amount, wrong order, reused transaction) and are meant for
/// operator-facing channels, not just logs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettlementFailedEvent {
    pub order_id: OrderId,
    pub tx_hash: TxHash,
    pub reason: String,
}

impl SettlementFailedEvent {
    pub fn new(order_id: OrderId, tx_hash: TxHash, reason: String) -> Self {
        Self { order_id, tx_hash, reason }
    }
}
