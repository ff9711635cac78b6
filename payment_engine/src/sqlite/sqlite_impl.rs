//! `SqliteDatabase` is a concrete implementation of a payment gateway backend.
//!
//! Unsurprisingly, it uses SQLite, and implements the traits defined in the
//! [`crate::traits`] module. Settlement runs inside a single SQLite transaction, which
//! gives the re-read/check/write sequence its atomicity and serializes concurrent
//! settlement attempts for the same order.
use std::fmt::Debug;

use opg_common::TokenAmount;
use sqlx::SqlitePool;

use super::db::{exchange_rates, failures, new_pool, orders, receipts};
use crate::{
    db_types::{NewOrder, Order, OrderId, Receipt, SettlementFailure, TokenAddress, TxHash},
    exchange::ExchangeRate,
    traits::{
        ExchangeRateError,
        ExchangeRates,
        NewReceipt,
        PaymentGatewayDatabase,
        PaymentGatewayError,
        SettledOrder,
    },
    verifier::VerificationResult,
};

#[derive(Clone)]
pub struct SqliteDatabase {
    url: String,
    pool: SqlitePool,
}

impl Debug for SqliteDatabase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "SqliteDatabase ({:?})", self.pool)
    }
}

impl SqliteDatabase {
    /// Connect to the database named by `OPG_DATABASE_URL` (or the default path).
    pub async fn new(max_connections: u32) -> Result<Self, PaymentGatewayError> {
        Self::new_with_url(&super::db::db_url(), max_connections).await
    }

    pub async fn new_with_url(url: &str, max_connections: u32) -> Result<Self, PaymentGatewayError> {
        let pool = new_pool(url, max_connections).await?;
        Ok(Self { url: url.to_string(), pool })
    }

    /// Bring the schema up to date. Safe to run on every startup.
    pub async fn migrate(&self) -> Result<(), PaymentGatewayError> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| PaymentGatewayError::DatabaseError(e.to_string()))
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

impl PaymentGatewayDatabase for SqliteDatabase {
    fn url(&self) -> &str {
        self.url.as_str()
    }

    async fn insert_order(&self, order: NewOrder) -> Result<(Order, bool), PaymentGatewayError> {
        let mut tx = self.pool.begin().await?;
        let result = orders::idempotent_insert(order, &mut tx).await?;
        tx.commit().await?;
        Ok(result)
    }

    async fn fetch_order_by_order_id(&self, order_id: &OrderId) -> Result<Option<Order>, PaymentGatewayError> {
        let mut conn = self.pool.acquire().await?;
        let order = orders::fetch_order_by_order_id(order_id, &mut conn).await?;
        Ok(order)
    }

    async fn settle_order(
        &self,
        payment: &VerificationResult,
        expected: TokenAmount,
    ) -> Result<SettledOrder, PaymentGatewayError> {
        let mut tx = self.pool.begin().await?;
        let settled = orders::settle_order(payment, expected, &mut tx).await?;
        tx.commit().await?;
        Ok(settled)
    }

    async fn record_settlement_failure(
        &self,
        order_id: &OrderId,
        tx_hash: &TxHash,
        reason: &str,
    ) -> Result<(), PaymentGatewayError> {
        let mut conn = self.pool.acquire().await?;
        failures::insert_failure(order_id, tx_hash, reason, &mut conn).await
    }

    async fn fetch_settlement_failures(
        &self,
        order_id: &OrderId,
    ) -> Result<Vec<SettlementFailure>, PaymentGatewayError> {
        let mut conn = self.pool.acquire().await?;
        let result = failures::fetch_failures_for_order(order_id, &mut conn).await?;
        Ok(result)
    }

    async fn fetch_receipt_for_order(&self, order_id: &OrderId) -> Result<Option<Receipt>, PaymentGatewayError> {
        let mut conn = self.pool.acquire().await?;
        let receipt = receipts::fetch_receipt_for_order(order_id, &mut conn).await?;
        Ok(receipt)
    }

    async fn insert_receipt(&self, receipt: NewReceipt) -> Result<Receipt, PaymentGatewayError> {
        let mut tx = self.pool.begin().await?;
        let receipt = receipts::insert_receipt(receipt, &mut tx).await?;
        tx.commit().await?;
        Ok(receipt)
    }

    async fn close(&mut self) -> Result<(), PaymentGatewayError> {
        self.pool.close().await;
        Ok(())
    }
}

impl ExchangeRates for SqliteDatabase {
    async fn fetch_rate(&self, token: &TokenAddress) -> Result<ExchangeRate, ExchangeRateError> {
        let mut conn = self.pool.acquire().await.map_err(|e| ExchangeRateError::DatabaseError(e.to_string()))?;
        exchange_rates::fetch_rate(token, &mut conn)
            .await
            .map_err(|e| ExchangeRateError::DatabaseError(e.to_string()))?
            .ok_or_else(|| ExchangeRateError::RateDoesNotExist(token.clone()))
    }

    async fn set_rate(&self, rate: &ExchangeRate) -> Result<(), ExchangeRateError> {
        let mut conn = self.pool.acquire().await.map_err(|e| ExchangeRateError::DatabaseError(e.to_string()))?;
        exchange_rates::set_rate(rate, &mut conn).await
    }
}
