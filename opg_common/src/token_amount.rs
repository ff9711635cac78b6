use std::{
    fmt::Display,
    ops::{Add, Sub},
    str::FromStr,
};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::op;

/// Decimal precision of the ledger's native coin.
pub const NATIVE_TOKEN_DECIMALS: u8 = 18;

//--------------------------------------     TokenAmount     ---------------------------------------------------------
/// An on-chain amount in a token's base (indivisible) units.
///
/// 18-decimal tokens exceed the range of `i64` for even modest balances, so the backing
/// store is `i128`. SQLite has no 128-bit integer column, so `TokenAmount` round-trips
/// through its decimal string form at the database boundary. All comparisons stay in base
/// units; this type never touches floating point.
#[derive(Debug, Clone, Copy, Default, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TokenAmount(i128);

op!(binary TokenAmount, Add, add);
op!(binary TokenAmount, Sub, sub);

#[derive(Debug, Clone, Error)]
#[error("Value cannot be represented as a token amount: {0}")]
pub struct TokenAmountConversionError(String);

impl From<i128> for TokenAmount {
    fn from(value: i128) -> Self {
        Self(value)
    }
}

impl From<TokenAmount> for String {
    fn from(value: TokenAmount) -> Self {
        value.0.to_string()
    }
}

impl TryFrom<String> for TokenAmount {
    type Error = TokenAmountConversionError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl FromStr for TokenAmount {
    type Err = TokenAmountConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().parse::<i128>().map(Self).map_err(|e| TokenAmountConversionError(format!("{s}: {e}")))
    }
}

impl PartialEq for TokenAmount {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

impl Eq for TokenAmount {}

// The string-backed sqlx impls. A transparent `#[derive(Type)]` is not possible here since
// no database driver exposes a 128-bit integer column.
impl<DB: sqlx::Database> sqlx::Type<DB> for TokenAmount
where String: sqlx::Type<DB>
{
    fn type_info() -> DB::TypeInfo {
        <String as sqlx::Type<DB>>::type_info()
    }

    fn compatible(ty: &DB::TypeInfo) -> bool {
        <String as sqlx::Type<DB>>::compatible(ty)
    }
}

impl<'q, DB: sqlx::Database> sqlx::Encode<'q, DB> for TokenAmount
where String: sqlx::Encode<'q, DB>
{
    fn encode_by_ref(
        &self,
        buf: &mut <DB as sqlx::database::HasArguments<'q>>::ArgumentBuffer,
    ) -> sqlx::encode::IsNull {
        <String as sqlx::Encode<'q, DB>>::encode(self.0.to_string(), buf)
    }
}

impl<'r, DB: sqlx::Database> sqlx::Decode<'r, DB> for TokenAmount
where String: sqlx::Decode<'r, DB>
{
    fn decode(value: <DB as sqlx::database::HasValueRef<'r>>::ValueRef) -> Result<Self, sqlx::error::BoxDynError> {
        let s = <String as sqlx::Decode<'r, DB>>::decode(value)?;
        Ok(s.parse()?)
    }
}

impl Display for TokenAmount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TokenAmount {
    pub fn value(&self) -> i128 {
        self.0
    }

    /// A whole number of tokens, scaled by the token's decimal precision.
    pub fn from_whole(tokens: i64, decimals: u8) -> Self {
        Self(i128::from(tokens) * 10i128.pow(u32::from(decimals)))
    }

    /// Render the amount as a human-readable decimal, e.g. `39.600000` for 39600000 base
    /// units of a 6-decimal token.
    pub fn format_units(&self, decimals: u8) -> String {
        let scale = 10i128.pow(u32::from(decimals));
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        let whole = abs / scale.unsigned_abs();
        let frac = abs % scale.unsigned_abs();
        if decimals == 0 {
            format!("{sign}{whole}")
        } else {
            format!("{sign}{whole}.{frac:0>width$}", width = decimals as usize)
        }
    }
}
