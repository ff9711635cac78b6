use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use crate::{
    db_types::TokenAddress,
    exchange::ExchangeRate,
    traits::{ExchangeRateError, ExchangeRates},
};

/// An in-memory exchange rate table. An empty table reports every token as unpriced.
#[derive(Clone, Default)]
pub struct FixedRates {
    rates: Arc<Mutex<HashMap<TokenAddress, ExchangeRate>>>,
}

impl FixedRates {
    pub fn with_rate(rate: ExchangeRate) -> Self {
        let result = Self::default();
        result.rates.lock().unwrap().insert(rate.token.clone(), rate);
        result
    }

    pub fn and_rate(self, rate: ExchangeRate) -> Self {
        self.rates.lock().unwrap().insert(rate.token.clone(), rate);
        self
    }
}

impl ExchangeRates for FixedRates {
    async fn fetch_rate(&self, token: &TokenAddress) -> Result<ExchangeRate, ExchangeRateError> {
        self.rates
            .lock()
            .unwrap()
            .get(token)
            .cloned()
            .ok_or_else(|| ExchangeRateError::RateDoesNotExist(token.clone()))
    }

    async fn set_rate(&self, rate: &ExchangeRate) -> Result<(), ExchangeRateError> {
        self.rates.lock().unwrap().insert(rate.token.clone(), rate.clone());
        Ok(())
    }
}
