use std::{
    fmt::Display,
    iter::Sum,
    ops::{Add, Mul},
};

use serde::{Deserialize, Serialize};
use sqlx::Type;
use thiserror::Error;

use crate::op;

/// Suffix used when displaying ledger amounts.
pub const LEDGER_UNIT: &str = "i";

//--------------------------------------       Amount        ---------------------------------------------------------
/// An integer amount of the ledger's base unit. Balances and transfer values are signed: debits in a bundle carry
/// negative values.
#[derive(Debug, Clone, Copy, Default, Type, Ord, PartialOrd, Serialize, Deserialize)]
#[sqlx(transparent)]
pub struct Amount(i64);

op!(binary Amount, Add, add);
op!(binary Amount, Sub, sub);
op!(inplace Amount, AddAssign, add_assign);
op!(inplace Amount, SubAssign, sub_assign);
op!(unary Amount, Neg, neg);

impl Mul<i64> for Amount {
    type Output = Self;

    fn mul(self, rhs: i64) -> Self::Output {
        Self::from(self.value() * rhs)
    }
}

impl Sum for Amount {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::default(), Add::add)
    }
}

#[derive(Debug, Clone, Error)]
#[error("Value cannot be represented as a ledger amount: {0}")]
pub struct AmountConversionError(String);

impl From<i64> for Amount {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

impl PartialEq for Amount {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

impl Eq for Amount {}

impl TryFrom<u64> for Amount {
    type Error = AmountConversionError;

    fn try_from(value: u64) -> Result<Self, Self::Error> {
        if value > i64::MAX as u64 {
            Err(AmountConversionError(format!("Value {value} is too large to convert to an Amount")))
        } else {
            #[allow(clippy::cast_possible_wrap)]
            Ok(Self(value as i64))
        }
    }
}

impl Display for Amount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}{LEDGER_UNIT}", self.0)
    }
}

impl Amount {
    pub fn value(&self) -> i64 {
        self.0
    }

    pub fn zero() -> Self {
        Self(0)
    }

    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }

    pub fn is_positive(&self) -> bool {
        self.0 > 0
    }

    pub fn is_negative(&self) -> bool {
        self.0 < 0
    }

    /// The magnitude of the amount. Debit entries are negative, so this is what gets compared to a balance.
    pub fn abs(&self) -> Self {
        Self(self.0.saturating_abs())
    }

    /// The magnitude of the amount, or `None` if it cannot be represented.
    pub fn checked_abs(&self) -> Option<Self> {
        self.0.checked_abs().map(Self)
    }

    pub fn checked_add(&self, rhs: Self) -> Option<Self> {
        self.0.checked_add(rhs.0).map(Self)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn arithmetic() {
        let a = Amount::from(7);
        let b = Amount::from(5);
        assert_eq!(a + b, Amount::from(12));
        assert_eq!(a - b, Amount::from(2));
        assert_eq!(-a, Amount::from(-7));
        assert_eq!(b * 3, Amount::from(15));
        let mut c = a;
        c -= b;
        c += Amount::from(10);
        assert_eq!(c, Amount::from(12));
        let total: Amount = [a, b, Amount::from(-2)].into_iter().sum();
        assert_eq!(total, Amount::from(10));
    }

    #[test]
    fn magnitude_of_debits() {
        assert!(Amount::from(-5).is_negative());
        assert_eq!(Amount::from(-5).abs(), Amount::from(5));
        assert_eq!(Amount::from(i64::MIN).abs(), Amount::from(i64::MAX));
        assert_eq!(Amount::from(-5).checked_abs(), Some(Amount::from(5)));
        assert_eq!(Amount::from(i64::MIN).checked_abs(), None);
        assert_eq!(Amount::from(i64::MAX).checked_add(Amount::from(1)), None);
        assert_eq!(Amount::from(2).checked_add(Amount::from(3)), Some(Amount::from(5)));
    }

    #[test]
    fn display() {
        assert_eq!(Amount::from(1_500).to_string(), "1500i");
        assert_eq!(Amount::zero().to_string(), "0i");
    }

    #[test]
    fn conversion_from_u64() {
        assert_eq!(Amount::try_from(42u64).unwrap(), Amount::from(42));
        assert!(Amount::try_from(u64::MAX).is_err());
    }
}
