//! Exchange-rate and token-precision objects.

use std::{collections::HashMap, fmt::Display};

use chrono::{DateTime, Utc};
use log::warn;
use opg_common::{Money, TokenAmount, NATIVE_TOKEN_DECIMALS};
use sqlx::FromRow;

use crate::db_types::TokenAddress;

/// Decimal precision assumed for tokens missing from the registry. Stablecoin-style
/// 6-decimal tokens are the common case for payments.
pub const DEFAULT_TOKEN_DECIMALS: u8 = 6;

//--------------------------------------    ExchangeRate       -------------------------------------------------------
/// The price of one whole token, in base-currency minor units.
#[derive(Debug, Clone, FromRow)]
pub struct ExchangeRate {
    pub token: TokenAddress,
    /// How much base currency one whole token buys.
    pub rate: Money,
    pub updated_at: DateTime<Utc>,
}

impl ExchangeRate {
    pub fn new(token: TokenAddress, rate: Money, updated_at: Option<DateTime<Utc>>) -> Self {
        let updated_at = updated_at.unwrap_or_else(Utc::now);
        Self { token, rate, updated_at }
    }

    /// Convert a base-currency total into the token's base units. Pure integer
    /// arithmetic: `total * 10^decimals / rate`, truncating. The truncation error is at
    /// most one base unit and is far inside the settlement tolerance band.
    pub fn convert(&self, total: Money, decimals: u8) -> TokenAmount {
        let units = i128::from(total.value()) * 10i128.pow(u32::from(decimals)) / i128::from(self.rate.value());
        TokenAmount::from(units)
    }
}

impl Display for ExchangeRate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "1 {} => {}", self.token, self.rate)
    }
}

//--------------------------------------    TokenRegistry      -------------------------------------------------------
/// Per-token decimal precision, supplied by configuration. The native coin is always
/// present at 18 decimals.
#[derive(Debug, Clone)]
pub struct TokenRegistry {
    decimals: HashMap<TokenAddress, u8>,
}

impl Default for TokenRegistry {
    fn default() -> Self {
        let mut decimals = HashMap::new();
        decimals.insert(TokenAddress::native(), NATIVE_TOKEN_DECIMALS);
        Self { decimals }
    }
}

impl TokenRegistry {
    pub fn with_token(mut self, token: TokenAddress, decimals: u8) -> Self {
        self.decimals.insert(token, decimals);
        self
    }

    pub fn decimals_for(&self, token: &TokenAddress) -> u8 {
        match self.decimals.get(token) {
            Some(d) => *d,
            None => {
                warn!("🪙️ Token {token} is not in the registry. Assuming {DEFAULT_TOKEN_DECIMALS} decimals.");
                DEFAULT_TOKEN_DECIMALS
            },
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn converts_order_totals_to_token_units() {
        // 1,000,000 base currency at 25,000 per token => 40.0 tokens
        let rate = ExchangeRate::new(TokenAddress::from("0xusdx"), Money::from(25_000), None);
        let expected = rate.convert(Money::from(1_000_000), 6);
        assert_eq!(expected, TokenAmount::from(40_000_000));
        assert_eq!(expected.format_units(6), "40.000000");
    }

    #[test]
    fn native_coin_uses_18_decimals() {
        let rate = ExchangeRate::new(TokenAddress::native(), Money::from(2_000_000), None);
        let registry = TokenRegistry::default();
        let decimals = registry.decimals_for(&TokenAddress::native());
        assert_eq!(decimals, 18);
        // 4,000,000 base currency at 2,000,000 per coin => 2.0 coins
        assert_eq!(rate.convert(Money::from(4_000_000), decimals), TokenAmount::from_whole(2, 18));
    }

    #[test]
    fn unknown_tokens_fall_back_to_default_decimals() {
        let registry = TokenRegistry::default().with_token(TokenAddress::from("0xeight"), 8);
        assert_eq!(registry.decimals_for(&TokenAddress::from("0xeight")), 8);
        assert_eq!(registry.decimals_for(&TokenAddress::from("0xunknown")), DEFAULT_TOKEN_DECIMALS);
    }
}
