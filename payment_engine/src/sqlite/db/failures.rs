use sqlx::SqliteConnection;

use crate::{
    db_types::{OrderId, SettlementFailure, TxHash},
    traits::PaymentGatewayError,
};

pub async fn insert_failure(
    order_id: &OrderId,
    tx_hash: &TxHash,
    reason: &str,
    conn: &mut SqliteConnection,
) -> Result<(), PaymentGatewayError> {
    sqlx::query("INSERT INTO settlement_failures (order_id, tx_hash, reason) VALUES ($1, $2, $3)")
        .bind(order_id.as_str())
        .bind(tx_hash.as_str())
        .bind(reason)
        .execute(conn)
        .await?;
    Ok(())
}

pub async fn fetch_failures_for_order(
    order_id: &OrderId,
    conn: &mut SqliteConnection,
) -> Result<Vec<SettlementFailure>, sqlx::Error> {
    let failures =
        sqlx::query_as("SELECT * FROM settlement_failures WHERE order_id = $1 ORDER BY created_at ASC, id ASC")
            .bind(order_id.as_str())
            .fetch_all(conn)
            .await?;
    Ok(failures)
}
