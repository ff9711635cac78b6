//! Order intake and queries on behalf of the storefront collaborator.

use log::*;

use crate::{
    db_types::{NewOrder, Order, OrderId, Receipt, SettlementFailure},
    traits::{PaymentGatewayDatabase, PaymentGatewayError},
};

/// The storefront-facing API. Payment state is deliberately out of reach here: orders
/// enter as Pending and only settlement can mark them paid.
#[derive(Debug, Clone)]
pub struct OrderManagementApi<B> {
    db: B,
}

impl<B> OrderManagementApi<B>
where B: PaymentGatewayDatabase
{
    pub fn new(db: B) -> Self {
        Self { db }
    }

    /// Register a new order. Idempotent on `order_id`: replaying the same order returns
    /// the stored row without modifying it.
    pub async fn insert_order(&self, order: NewOrder) -> Result<Order, PaymentGatewayError> {
        let (order, created) = self.db.insert_order(order).await?;
        if created {
            info!("🛒️ New order {} for customer {} ({})", order.order_id, order.customer_id, order.total_price);
        } else {
            debug!("🛒️ Order {} was already registered. Ignoring the duplicate.", order.order_id);
        }
        Ok(order)
    }

    pub async fn fetch_order(&self, order_id: &OrderId) -> Result<Option<Order>, PaymentGatewayError> {
        self.db.fetch_order_by_order_id(order_id).await
    }

    pub async fn fetch_receipt(&self, order_id: &OrderId) -> Result<Option<Receipt>, PaymentGatewayError> {
        self.db.fetch_receipt_for_order(order_id).await
    }

    /// The settlement-failure audit trail for an order, oldest first.
    pub async fn settlement_failures(&self, order_id: &OrderId) -> Result<Vec<SettlementFailure>, PaymentGatewayError> {
        self.db.fetch_settlement_failures(order_id).await
    }
}

#[cfg(test)]
mod test {
    use opg_common::Money;

    use super::*;
    use crate::test_utils::new_test_database;

    #[tokio::test]
    async fn order_intake_is_idempotent() {
        let db = new_test_database().await;
        let api = OrderManagementApi::new(db);
        let order = NewOrder::new(OrderId::from("oid-1".to_string()), "cust-1".to_string(), Money::from(5_000));
        let first = api.insert_order(order.clone()).await.unwrap();
        // A replay with a different total must not overwrite the stored order.
        let mut replay = order;
        replay.total_price = Money::from(9_999);
        let second = api.insert_order(replay).await.unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(second.total_price, Money::from(5_000));
    }

    #[tokio::test]
    async fn unknown_orders_are_none() {
        let db = new_test_database().await;
        let api = OrderManagementApi::new(db);
        assert!(api.fetch_order(&OrderId::from("oid-404".to_string())).await.unwrap().is_none());
        assert!(api.fetch_receipt(&OrderId::from("oid-404".to_string())).await.unwrap().is_none());
    }
}
