use std::{
    fmt::Display,
    iter::Sum,
    ops::{Add, Mul, Neg, Sub, SubAssign},
    str::FromStr,
};

use rust_decimal::{prelude::ToPrimitive, Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use sqlx::Type;
use thiserror::Error;

use crate::op;

pub const SETTLEMENT_CURRENCY_CODE: &str = "NGN";

/// The number of minor units (kobo/cents) in one major currency unit.
const MINOR_UNITS_PER_MAJOR: i64 = 100;

//--------------------------------------        Money        ---------------------------------------------------------
/// A monetary amount in minor currency units (kobo).
///
/// Provider webhooks deliver amounts in minor units, and all ledger arithmetic is integer
/// arithmetic on this type. Fee math happens in [`Decimal`] space via [`Money::to_decimal`] and
/// comes back through [`Money::from_decimal_round`], which rounds to the cent boundary using
/// round-half-up.
#[derive(Debug, Clone, Copy, Default, Type, Ord, PartialOrd, Serialize, Deserialize)]
#[sqlx(transparent)]
pub struct Money(i64);

op!(binary Money, Add, add);
op!(binary Money, Sub, sub);
op!(inplace Money, SubAssign, sub_assign);
op!(unary Money, Neg, neg);

impl Mul<i64> for Money {
    type Output = Self;

    fn mul(self, rhs: i64) -> Self::Output {
        Self(self.0 * rhs)
    }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::default(), Add::add)
    }
}

#[derive(Debug, Clone, Error)]
#[error("Value cannot be represented as a monetary amount: {0}")]
pub struct MoneyConversionError(String);

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

impl TryFrom<u64> for Money {
    type Error = MoneyConversionError;

    fn try_from(value: u64) -> Result<Self, Self::Error> {
        if value > i64::MAX as u64 {
            Err(MoneyConversionError(format!("Value {value} is too large to convert to Money")))
        } else {
            #[allow(clippy::cast_possible_wrap)]
            Ok(Self(value as i64))
        }
    }
}

impl FromStr for Money {
    type Err = MoneyConversionError;

    /// Parses a major-unit decimal string ("100.00") into a minor-unit amount.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let d = Decimal::from_str(s.trim()).map_err(|e| MoneyConversionError(format!("{s}: {e}")))?;
        Self::from_decimal_round(d).ok_or_else(|| MoneyConversionError(format!("{s} is out of range")))
    }
}

impl Display for Money {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:0.2}", self.to_decimal())
    }
}

impl Money {
    pub fn value(&self) -> i64 {
        self.0
    }

    pub fn is_negative(&self) -> bool {
        self.0 < 0
    }

    pub fn is_positive(&self) -> bool {
        self.0 > 0
    }

    pub fn zero() -> Self {
        Self(0)
    }

    /// An amount expressed in whole major units.
    pub fn from_major(major: i64) -> Self {
        Self(major * MINOR_UNITS_PER_MAJOR)
    }

    /// The amount in major units as an exact 2-dp decimal.
    pub fn to_decimal(&self) -> Decimal {
        Decimal::new(self.0, 2)
    }

    /// Converts a major-unit decimal into minor units, rounding half-up at the cent boundary.
    /// Returns `None` if the value does not fit in an `i64` of minor units.
    pub fn from_decimal_round(d: Decimal) -> Option<Self> {
        let cents = (d * Decimal::from(MINOR_UNITS_PER_MAJOR))
            .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero);
        cents.to_i64().map(Self)
    }
}

#[cfg(test)]
mod test {
    use rust_decimal_macros::dec;

    use super::*;

    #[test]
    fn minor_major_conversions() {
        assert_eq!(Money::from_major(100), Money::from(10_000));
        assert_eq!(Money::from(10_000).to_decimal(), dec!(100.00));
        assert_eq!(Money::from(1).to_decimal(), dec!(0.01));
    }

    #[test]
    fn rounds_half_up_on_the_cent() {
        assert_eq!(Money::from_decimal_round(dec!(1.505)), Some(Money::from(151)));
        assert_eq!(Money::from_decimal_round(dec!(1.504)), Some(Money::from(150)));
        assert_eq!(Money::from_decimal_round(dec!(-1.505)), Some(Money::from(-151)));
    }

    #[test]
    fn parses_major_unit_strings() {
        assert_eq!("100.00".parse::<Money>().unwrap(), Money::from(10_000));
        assert_eq!("0.015".parse::<Money>().unwrap(), Money::from(2));
        assert!("not-money".parse::<Money>().is_err());
    }

    #[test]
    fn displays_in_major_units() {
        assert_eq!(Money::from(9_850).to_string(), "98.50");
        assert_eq!(Money::from(5).to_string(), "0.05");
    }
}
