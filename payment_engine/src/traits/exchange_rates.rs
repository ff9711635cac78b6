use thiserror::Error;

use crate::{db_types::TokenAddress, exchange::ExchangeRate};

#[derive(Debug, Clone, Error)]
pub enum ExchangeRateError {
    #[error("Database error: {0}")]
    DatabaseError(String),
    #[error("The requested exchange rate does not exist: {0}")]
    RateDoesNotExist(TokenAddress),
}

/// The exchange-rate collaborator. The rate source itself is external; backends only
/// store and serve the latest quoted rate per token.
#[allow(async_fn_in_trait)]
pub trait ExchangeRates: Clone + Send + Sync + 'static {
    /// Fetch the last exchange rate for the given token. If no rate has ever been quoted,
    /// the error [`ExchangeRateError::RateDoesNotExist`] is returned.
    fn fetch_rate(&self, token: &TokenAddress) -> impl std::future::Future<Output = Result<ExchangeRate, ExchangeRateError>> + Send;
    /// Save the exchange rate for the given token to the backend storage
    fn set_rate(&self, rate: &ExchangeRate) -> impl std::future::Future<Output = Result<(), ExchangeRateError>> + Send;
}
