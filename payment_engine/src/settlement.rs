//! Settlement of verified payments against orders.
//!
//! Settlement is the step that turns a [`VerificationResult`] into a paid order. It owns
//! the money conversion (order total in base currency, payment in token base units) and
//! delegates the atomic state change to the database backend.
use log::*;

use crate::{
    db_types::Order,
    exchange::TokenRegistry,
    traits::{ExchangeRateError, ExchangeRates, PaymentGatewayDatabase, PaymentGatewayError, SettledOrder},
    verifier::VerificationResult,
};

#[derive(Clone)]
pub struct SettlementApi<B, R> {
    db: B,
    rates: R,
    tokens: TokenRegistry,
}

impl<B, R> SettlementApi<B, R>
where
    B: PaymentGatewayDatabase,
    R: ExchangeRates,
{
    pub fn new(db: B, rates: R, tokens: TokenRegistry) -> Self {
        Self { db, rates, tokens }
    }

    /// Settle a verified payment against its order.
    ///
    /// The expected token amount is computed from the order total and the current
    /// exchange rate for the paying token, then the backend re-checks the order state,
    /// the double-spend guard and the amount tolerance inside a single transaction.
    /// Settling an already-settled order is a no-op that returns the existing order.
    pub async fn settle(&self, payment: &VerificationResult) -> Result<SettledOrder, PaymentGatewayError> {
        let order = self
            .db
            .fetch_order_by_order_id(&payment.order_id)
            .await?
            .ok_or_else(|| PaymentGatewayError::OrderNotFound(payment.order_id.clone()))?;
        let expected = self.expected_amount(&order, payment).await?;
        debug!(
            "💰️ Order {} expects {} base units of {}, payment carries {}",
            order.order_id, expected, payment.token, payment.amount
        );
        let settled = self.db.settle_order(payment, expected).await?;
        if settled.newly_settled {
            info!(
                "💰️ Order {} settled by transaction {} for {} ({})",
                settled.order.order_id, payment.tx_hash, payment.amount, payment.token
            );
        } else {
            info!(
                "💰️ Order {} was already settled. Transaction {} changed nothing.",
                settled.order.order_id, payment.tx_hash
            );
        }
        Ok(settled)
    }

    async fn expected_amount(
        &self,
        order: &Order,
        payment: &VerificationResult,
    ) -> Result<opg_common::TokenAmount, PaymentGatewayError> {
        let rate = self.rates.fetch_rate(&payment.token).await.map_err(|e| match e {
            ExchangeRateError::RateDoesNotExist(token) => PaymentGatewayError::NoExchangeRate(token.to_string()),
            ExchangeRateError::DatabaseError(msg) => PaymentGatewayError::DatabaseError(msg),
        })?;
        let decimals = self.tokens.decimals_for(&payment.token);
        Ok(rate.convert(order.total_price, decimals))
    }
}

#[cfg(test)]
mod test {
    use opg_common::{Money, TokenAmount};

    use super::*;
    use crate::{
        db_types::{NewOrder, OrderId, PaymentStatus, TokenAddress, TxHash, WalletAddress},
        exchange::ExchangeRate,
        test_utils::{new_test_database, FixedRates},
        traits::PaymentGatewayDatabase,
        verifier::VerificationResult,
    };

    fn new_order(order_id: &str, total: i64) -> NewOrder {
        NewOrder::new(OrderId::from(order_id.to_string()), "cust-1".to_string(), Money::from(total))
    }

    fn payment(order_id: &str, tx: &str, amount: i128) -> VerificationResult {
        VerificationResult {
            tx_hash: TxHash::from(tx),
            payer: WalletAddress::from("0xalice"),
            token: TokenAddress::native(),
            amount: TokenAmount::from(amount),
            order_id: OrderId::from(order_id.to_string()),
            confirmations: 12,
        }
    }

    async fn api_with_rate(db: crate::SqliteDatabase, rate: i64) -> SettlementApi<crate::SqliteDatabase, FixedRates> {
        let rates = FixedRates::with_rate(ExchangeRate::new(TokenAddress::native(), Money::from(rate), None));
        SettlementApi::new(db, rates, TokenRegistry::default())
    }

    #[tokio::test]
    async fn exact_payment_settles_the_order() {
        let db = new_test_database().await;
        db.insert_order(new_order("oid-1", 1_000_000)).await.unwrap();
        // $10.00 at 25,000 base units per whole token is 40 tokens.
        let api = api_with_rate(db.clone(), 25_000).await;
        let settled = api.settle(&payment("oid-1", "0xaaa", 40_000_000_000_000_000_000)).await.unwrap();
        assert!(settled.newly_settled);
        assert_eq!(settled.order.payment_status, PaymentStatus::Completed);
        assert_eq!(settled.order.settled_tx, Some(TxHash::from("0xaaa")));
        assert_eq!(settled.order.payer_address, Some(WalletAddress::from("0xalice")));
    }

    #[tokio::test]
    async fn settlement_is_idempotent() {
        let db = new_test_database().await;
        db.insert_order(new_order("oid-1", 1_000_000)).await.unwrap();
        let api = api_with_rate(db.clone(), 25_000).await;
        let first = api.settle(&payment("oid-1", "0xaaa", 40_000_000_000_000_000_000)).await.unwrap();
        assert!(first.newly_settled);
        let second = api.settle(&payment("oid-1", "0xaaa", 40_000_000_000_000_000_000)).await.unwrap();
        assert!(!second.newly_settled);
        assert_eq!(second.order.settled_tx, Some(TxHash::from("0xaaa")));
    }

    #[tokio::test]
    async fn a_transaction_settles_at_most_one_order() {
        let db = new_test_database().await;
        db.insert_order(new_order("oid-1", 1_000_000)).await.unwrap();
        db.insert_order(new_order("oid-2", 1_000_000)).await.unwrap();
        let api = api_with_rate(db.clone(), 25_000).await;
        api.settle(&payment("oid-1", "0xaaa", 40_000_000_000_000_000_000)).await.unwrap();
        let err = api.settle(&payment("oid-2", "0xaaa", 40_000_000_000_000_000_000)).await.unwrap_err();
        assert!(matches!(err, PaymentGatewayError::DuplicateTransaction(_)));
        // The second order is untouched.
        let order = db.fetch_order_by_order_id(&OrderId::from("oid-2".to_string())).await.unwrap().unwrap();
        assert_eq!(order.payment_status, PaymentStatus::Pending);
        assert!(order.settled_tx.is_none());
    }

    #[tokio::test]
    async fn tolerance_boundary_is_ninety_nine_percent() {
        let db = new_test_database().await;
        db.insert_order(new_order("oid-99", 1_000_000)).await.unwrap();
        db.insert_order(new_order("oid-short", 1_000_000)).await.unwrap();
        let api = api_with_rate(db.clone(), 25_000).await;
        // Expected 40 tokens. 99.0% of that is accepted.
        let settled = api.settle(&payment("oid-99", "0xaaa", 39_600_000_000_000_000_000)).await.unwrap();
        assert!(settled.newly_settled);
        // One base unit under 99.0% is rejected.
        let err = api.settle(&payment("oid-short", "0xbbb", 39_599_999_999_999_999_999)).await.unwrap_err();
        match err {
            PaymentGatewayError::InsufficientAmount { expected, paid } => {
                assert_eq!(expected, TokenAmount::from(40_000_000_000_000_000_000i128));
                assert_eq!(paid, TokenAmount::from(39_599_999_999_999_999_999i128));
            },
            e => panic!("unexpected error: {e}"),
        }
    }

    #[tokio::test]
    async fn overpayment_is_accepted() {
        let db = new_test_database().await;
        db.insert_order(new_order("oid-1", 1_000_000)).await.unwrap();
        let api = api_with_rate(db.clone(), 25_000).await;
        let settled = api.settle(&payment("oid-1", "0xaaa", 41_000_000_000_000_000_000)).await.unwrap();
        assert!(settled.newly_settled);
        assert_eq!(settled.order.settled_amount, Some(TokenAmount::from(41_000_000_000_000_000_000i128)));
    }

    #[tokio::test]
    async fn missing_rate_is_an_error() {
        let db = new_test_database().await;
        db.insert_order(new_order("oid-1", 1_000_000)).await.unwrap();
        let api = SettlementApi::new(db, FixedRates::default(), TokenRegistry::default());
        let err = api.settle(&payment("oid-1", "0xaaa", 40_000_000_000_000_000_000)).await.unwrap_err();
        assert!(matches!(err, PaymentGatewayError::NoExchangeRate(_)));
    }

    #[tokio::test]
    async fn unknown_order_is_an_error() {
        let db = new_test_database().await;
        let api = api_with_rate(db, 25_000).await;
        let err = api.settle(&payment("oid-missing", "0xaaa", 1)).await.unwrap_err();
        assert!(matches!(err, PaymentGatewayError::OrderNotFound(_)));
    }
}
