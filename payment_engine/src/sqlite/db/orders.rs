use log::debug;
use opg_common::TokenAmount;
use sqlx::SqliteConnection;

use crate::{
    db_types::{NewOrder, Order, OrderId, PaymentStatus},
    traits::{PaymentGatewayError, SettledOrder},
    verifier::VerificationResult,
};

/// Inserts the order into the database, returning `false` in the second element if the
/// order already exists. The uniqueness check rides on the `order_id` constraint, so a
/// concurrent intake for the same order observes the stored row instead of a constraint
/// error.
pub async fn idempotent_insert(
    order: NewOrder,
    conn: &mut SqliteConnection,
) -> Result<(Order, bool), PaymentGatewayError> {
    let order_id = order.order_id.clone();
    match insert_order(order, &mut *conn).await? {
        Some(order) => {
            debug!("📝️ Order [{}] inserted with id {}", order.order_id, order.id);
            Ok((order, true))
        },
        None => {
            let existing = fetch_order_by_order_id(&order_id, conn)
                .await?
                .ok_or_else(|| PaymentGatewayError::OrderNotFound(order_id))?;
            Ok((existing, false))
        },
    }
}

/// Inserts a new order using the given connection. Returns `None` when an order with the
/// same `order_id` already exists; read the row back to see it. This is not atomic on its
/// own. You can embed this call inside a transaction if you need atomicity, and pass
/// `&mut *tx` as the connection argument.
async fn insert_order(order: NewOrder, conn: &mut SqliteConnection) -> Result<Option<Order>, PaymentGatewayError> {
    let order = sqlx::query_as(
        r#"
            INSERT INTO orders (
                order_id,
                customer_id,
                total_price,
                currency,
                payment_method,
                created_at
            ) VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (order_id) DO NOTHING
            RETURNING *;
        "#,
    )
    .bind(order.order_id)
    .bind(order.customer_id)
    .bind(order.total_price.value())
    .bind(order.currency)
    .bind(order.payment_method)
    .bind(order.created_at)
    .fetch_optional(conn)
    .await?;
    Ok(order)
}

pub async fn fetch_order_by_order_id(
    order_id: &OrderId,
    conn: &mut SqliteConnection,
) -> Result<Option<Order>, sqlx::Error> {
    let order =
        sqlx::query_as("SELECT * FROM orders WHERE order_id = $1").bind(order_id.as_str()).fetch_optional(conn).await?;
    Ok(order)
}

/// The settlement transition (documented on
/// [`crate::traits::PaymentGatewayDatabase::settle_order`]). Must run inside a
/// transaction so that a failure in any step leaves the order untouched and two
/// concurrent settlement attempts serialize.
pub async fn settle_order(
    payment: &VerificationResult,
    expected: TokenAmount,
    conn: &mut SqliteConnection,
) -> Result<SettledOrder, PaymentGatewayError> {
    let order = fetch_order_by_order_id(&payment.order_id, conn)
        .await?
        .ok_or_else(|| PaymentGatewayError::OrderNotFound(payment.order_id.clone()))?;
    // Duplicate settlement attempts succeed without re-applying anything.
    if order.payment_status == PaymentStatus::Completed {
        debug!("🗃️ Order {} is already completed. Settlement is a no-op.", order.order_id);
        return Ok(SettledOrder { order, newly_settled: false });
    }
    let already_used: Option<i64> = sqlx::query_scalar("SELECT id FROM orders WHERE settled_tx = $1")
        .bind(payment.tx_hash.as_str())
        .fetch_optional(&mut *conn)
        .await?;
    if already_used.is_some() {
        return Err(PaymentGatewayError::DuplicateTransaction(payment.tx_hash.clone()));
    }
    // The 1% tolerance band, in integer arithmetic. Overpayment passes.
    if payment.amount.value() * 100 < expected.value() * 99 {
        return Err(PaymentGatewayError::InsufficientAmount { expected, paid: payment.amount });
    }
    let order: Order = sqlx::query_as(
        r#"
            UPDATE orders SET
                payment_status = 'Completed',
                status = 'Confirmed',
                payer_address = $1,
                settled_tx = $2,
                settled_amount = $3,
                settled_token = $4,
                confirmations = $5,
                settled_at = CURRENT_TIMESTAMP,
                updated_at = CURRENT_TIMESTAMP
            WHERE order_id = $6
            RETURNING *;
        "#,
    )
    .bind(&payment.payer)
    .bind(&payment.tx_hash)
    .bind(payment.amount)
    .bind(&payment.token)
    .bind(i64::try_from(payment.confirmations).unwrap_or(i64::MAX))
    .bind(payment.order_id.as_str())
    .fetch_one(conn)
    .await?;
    debug!("🗃️ Order {} settled by {} from {}", order.order_id, payment.tx_hash, payment.payer);
    Ok(SettledOrder { order, newly_settled: true })
}

/// Stamp the receipt token id onto a settled order.
pub(crate) async fn set_receipt_token(
    order_id: &OrderId,
    token_id: &str,
    conn: &mut SqliteConnection,
) -> Result<(), PaymentGatewayError> {
    sqlx::query("UPDATE orders SET receipt_token_id = $1, updated_at = CURRENT_TIMESTAMP WHERE order_id = $2")
        .bind(token_id)
        .bind(order_id.as_str())
        .execute(conn)
        .await?;
    Ok(())
}
