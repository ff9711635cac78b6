use std::{
    fmt::Display,
    ops::{Add, Mul, Sub},
};

use serde::{Deserialize, Serialize};
use sqlx::Type;

use crate::op;

//--------------------------------------       Money         ---------------------------------------------------------
/// An amount in the platform's base currency, expressed in the smallest currency unit.
/// Order totals and exchange rates are stored as `Money`; on-chain amounts use
/// [`crate::TokenAmount`].
#[derive(Debug, Clone, Copy, Default, Type, Ord, PartialOrd, Serialize, Deserialize)]
#[sqlx(transparent)]
pub struct Money(i64);

op!(binary Money, Add, add);
op!(binary Money, Sub, sub);

impl Mul<i64> for Money {
    type Output = Self;

    fn mul(self, rhs: i64) -> Self::Output {
        Self::from(self.value() * rhs)
    }
}

impl From<i64> for Money {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

impl PartialEq for Money {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

impl Eq for Money {}

impl Display for Money {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "¤{}", self.0)
    }
}

impl Money {
    pub fn value(&self) -> i64 {
        self.0
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn arithmetic() {
        let a = Money::from(1_000);
        let b = Money::from(250);
        assert_eq!(a + b, Money::from(1_250));
        assert_eq!(a - b, Money::from(750));
        assert_eq!(a * 3, Money::from(3_000));
    }

    #[test]
    fn display() {
        assert_eq!(format!("{}", Money::from(1_000_000)), "¤1000000");
    }
}
