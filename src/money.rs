//! Exact fixed-point money arithmetic.
//!
//! Balances and amounts are fixed-point decimals with 2 fractional digits.
//! Representing them as floating point would let rounding error slip into
//! account balances, so [`Money`] stores an integer number of cents and all
//! arithmetic is exact integer arithmetic.
use std::fmt;
use std::ops::{Add, Neg, Sub};

use serde::{Deserialize, Serialize};

/// An exact monetary amount, stored as a whole number of cents.
///
/// Can be negative: a debit leg is represented as a negative [`Money`], which
/// is how the saga state machine tells a debit event from a credit event
/// apart (§4.6.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Money(i64);

impl Money {
    pub const ZERO: Money = Money(0);

    /// Constructs a `Money` value from whole cents.
    pub const fn from_cents(cents: i64) -> Self {
        Money(cents)
    }

    /// Constructs a `Money` value from a decimal string such as `"200.00"`.
    pub fn from_decimal_str(s: &str) -> Result<Self, MoneyParseError> {
        let (whole, frac) = match s.split_once('.') {
            Some((w, f)) => (w, f),
            None => (s, "00"),
        };
        if frac.len() != 2 || !frac.bytes().all(|b| b.is_ascii_digit()) {
            return Err(MoneyParseError(s.to_string()));
        }
        let whole: i64 = whole.parse().map_err(|_| MoneyParseError(s.to_string()))?;
        let frac: i64 = frac.parse().map_err(|_| MoneyParseError(s.to_string()))?;
        let magnitude = whole.abs() * 100 + frac;
        Ok(Money(if whole.is_negative() || s.trim_start().starts_with('-') {
            -magnitude
        } else {
            magnitude
        }))
    }

    pub const fn cents(&self) -> i64 {
        self.0
    }

    pub const fn is_negative(&self) -> bool {
        self.0 < 0
    }

    pub const fn is_positive(&self) -> bool {
        self.0 > 0
    }
}

#[derive(Debug, thiserror::Error)]
#[error("invalid decimal amount: {0}")]
pub struct MoneyParseError(String);

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let cents = self.0.unsigned_abs();
        if self.0.is_negative() {
            write!(f, "-{}.{:02}", cents / 100, cents % 100)
        } else {
            write!(f, "{}.{:02}", cents / 100, cents % 100)
        }
    }
}

impl Add for Money {
    type Output = Money;
    fn add(self, rhs: Money) -> Money {
        Money(self.0 + rhs.0)
    }
}

impl Sub for Money {
    type Output = Money;
    fn sub(self, rhs: Money) -> Money {
        Money(self.0 - rhs.0)
    }
}

impl Neg for Money {
    type Output = Money;
    fn neg(self) -> Money {
        Money(-self.0)
    }
}

impl Default for Money {
    fn default() -> Self {
        Money::ZERO
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_decimal_strings() {
        assert_eq!(Money::from_decimal_str("200.00").unwrap().cents(), 20_000);
        assert_eq!(Money::from_decimal_str("0.01").unwrap().cents(), 1);
        assert_eq!(Money::from_decimal_str("-50.00").unwrap().cents(), -5_000);
    }

    #[test]
    fn rejects_malformed_strings() {
        assert!(Money::from_decimal_str("200.0").is_err());
        assert!(Money::from_decimal_str("abc").is_err());
    }

    #[test]
    fn formats_back_to_decimal() {
        assert_eq!(Money::from_cents(20_000).to_string(), "200.00");
        assert_eq!(Money::from_cents(-5_000).to_string(), "-50.00");
        assert_eq!(Money::from_cents(1).to_string(), "0.01");
    }

    #[test]
    fn arithmetic_is_exact() {
        let a = Money::from_cents(15_000);
        let b = Money::from_cents(-5_000);
        assert_eq!(a + b, Money::from_cents(10_000));
        assert_eq!(-b, Money::from_cents(5_000));
    }
}
