use sqlx::SqliteConnection;

use crate::{db_types::TokenAddress, exchange::ExchangeRate, traits::ExchangeRateError};

pub async fn fetch_rate(
    token: &TokenAddress,
    conn: &mut SqliteConnection,
) -> Result<Option<ExchangeRate>, sqlx::Error> {
    let rate = sqlx::query_as("SELECT token, rate, updated_at FROM exchange_rates WHERE token = $1")
        .bind(token.as_str())
        .fetch_optional(conn)
        .await?;
    Ok(rate)
}

pub async fn set_rate(rate: &ExchangeRate, conn: &mut SqliteConnection) -> Result<(), ExchangeRateError> {
    sqlx::query(
        r#"
            INSERT INTO exchange_rates (token, rate, updated_at)
            VALUES ($1, $2, CURRENT_TIMESTAMP)
            ON CONFLICT (token) DO UPDATE SET rate = excluded.rate, updated_at = CURRENT_TIMESTAMP;
        "#,
    )
    .bind(rate.token.as_str())
    .bind(rate.rate.value())
    .execute(conn)
    .await
    .map_err(|e| ExchangeRateError::DatabaseError(e.to_string()))?;
    Ok(())
}
