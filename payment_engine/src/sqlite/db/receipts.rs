use log::debug;
use sqlx::SqliteConnection;

use super::orders;
use crate::{
    db_types::{OrderId, Receipt},
    traits::{NewReceipt, PaymentGatewayError},
};

pub async fn fetch_receipt_for_order(
    order_id: &OrderId,
    conn: &mut SqliteConnection,
) -> Result<Option<Receipt>, sqlx::Error> {
    let receipt = sqlx::query_as("SELECT * FROM receipts WHERE order_id = $1")
        .bind(order_id.as_str())
        .fetch_optional(conn)
        .await?;
    Ok(receipt)
}

/// Insert the receipt and stamp the token id onto the order. At most one receipt may
/// exist per order; a second insert fails with `ReceiptAlreadyExists`.
pub async fn insert_receipt(receipt: NewReceipt, conn: &mut SqliteConnection) -> Result<Receipt, PaymentGatewayError> {
    if fetch_receipt_for_order(&receipt.order_id, &mut *conn).await?.is_some() {
        return Err(PaymentGatewayError::ReceiptAlreadyExists(receipt.order_id));
    }
    let row: Receipt = sqlx::query_as(
        r#"
            INSERT INTO receipts (order_id, token_id, metadata_uri, mint_tx)
            VALUES ($1, $2, $3, $4)
            RETURNING *;
        "#,
    )
    .bind(receipt.order_id.as_str())
    .bind(&receipt.token_id)
    .bind(&receipt.metadata_uri)
    .bind(&receipt.mint_tx)
    .fetch_one(&mut *conn)
    .await?;
    orders::set_receipt_token(&row.order_id, &row.token_id, conn).await?;
    debug!("🗃️ Receipt {} recorded for order {}", row.token_id, row.order_id);
    Ok(row)
}
