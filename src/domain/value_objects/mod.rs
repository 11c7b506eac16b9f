//! Value Objects for E-commerce

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Decimal places carried by every monetary amount.
pub const MONEY_SCALE: u32 = 2;

/// Largest amount a `NUMERIC(10, 2)` column can hold.
pub fn max_amount() -> Decimal {
    Decimal::new(9_999_999_999, MONEY_SCALE)
}

/// Money value object.
///
/// Non-negative, fixed-point with two decimal places. Arithmetic is checked
/// against [`max_amount`] so a total never exceeds what storage can hold.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "Decimal", into = "Decimal")]
pub struct Money(Decimal);

impl Money {
    pub const ZERO: Money = Money(Decimal::ZERO);

    pub fn new(amount: Decimal) -> Result<Self, MoneyError> {
        if amount.is_sign_negative() && !amount.is_zero() {
            return Err(MoneyError::Negative);
        }
        if amount.normalize().scale() > MONEY_SCALE {
            return Err(MoneyError::TooPrecise);
        }
        if amount > max_amount() {
            return Err(MoneyError::Overflow);
        }
        let mut amount = amount.abs();
        amount.rescale(MONEY_SCALE);
        Ok(Self(amount))
    }

    /// Builds an amount from minor units, e.g. `from_cents(1999)` is 19.99.
    pub fn from_cents(cents: i64) -> Result<Self, MoneyError> {
        Self::new(Decimal::new(cents, MONEY_SCALE))
    }

    pub fn amount(&self) -> Decimal {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    pub fn add(&self, other: &Money) -> Result<Money, MoneyError> {
        let sum = self.0.checked_add(other.0).ok_or(MoneyError::Overflow)?;
        Money::new(sum)
    }

    pub fn multiply(&self, qty: Quantity) -> Result<Money, MoneyError> {
        let product = self
            .0
            .checked_mul(Decimal::from(qty.value()))
            .ok_or(MoneyError::Overflow)?;
        Money::new(product)
    }

    /// Sums amounts, failing on the first overflow.
    pub fn sum<'a>(amounts: impl IntoIterator<Item = &'a Money>) -> Result<Money, MoneyError> {
        amounts
            .into_iter()
            .try_fold(Money::ZERO, |acc, amount| acc.add(amount))
    }
}

impl TryFrom<Decimal> for Money {
    type Error = MoneyError;
    fn try_from(value: Decimal) -> Result<Self, Self::Error> {
        Money::new(value)
    }
}

impl From<Money> for Decimal {
    fn from(value: Money) -> Self {
        value.0
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MoneyError {
    Negative,
    TooPrecise,
    Overflow,
}

impl std::error::Error for MoneyError {}
impl fmt::Display for MoneyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Negative => write!(f, "amount must not be negative"),
            Self::TooPrecise => write!(f, "amount has more than {} decimal places", MONEY_SCALE),
            Self::Overflow => write!(f, "amount exceeds {}", max_amount()),
        }
    }
}

/// Line quantity. Always at least one.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub struct Quantity(u32);

impl Quantity {
    pub fn new(value: u32) -> Result<Self, QuantityError> {
        if value == 0 {
            return Err(QuantityError::Zero);
        }
        Ok(Self(value))
    }

    pub fn value(&self) -> u32 {
        self.0
    }
}

impl TryFrom<u32> for Quantity {
    type Error = QuantityError;
    fn try_from(value: u32) -> Result<Self, Self::Error> {
        Quantity::new(value)
    }
}

impl From<Quantity> for u32 {
    fn from(value: Quantity) -> Self {
        value.0
    }
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QuantityError {
    Zero,
}

impl std::error::Error for QuantityError {}
impl fmt::Display for QuantityError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "quantity must be at least 1")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn qty(n: u32) -> Quantity {
        Quantity::new(n).unwrap()
    }

    #[test]
    fn test_money_scale_is_fixed() {
        let m = Money::new(Decimal::new(10, 0)).unwrap();
        assert_eq!(m.to_string(), "10.00");
        assert_eq!(m.amount(), Decimal::new(1000, 2));
    }

    #[test]
    fn test_money_rejects_bad_amounts() {
        assert_eq!(Money::new(Decimal::new(-1, 2)), Err(MoneyError::Negative));
        assert_eq!(Money::new(Decimal::new(1001, 3)), Err(MoneyError::TooPrecise));
        assert_eq!(Money::new(Decimal::new(10_000_000_000, 2)), Err(MoneyError::Overflow));
        // trailing zeros beyond two places are fine
        assert!(Money::new(Decimal::new(10_000, 3)).is_ok());
    }

    #[test]
    fn test_money_multiply_and_sum() {
        let price = Money::from_cents(1999).unwrap();
        assert_eq!(price.multiply(qty(3)).unwrap(), Money::from_cents(5997).unwrap());

        let lines = [Money::from_cents(1000).unwrap(), Money::from_cents(300).unwrap()];
        assert_eq!(Money::sum(&lines).unwrap(), Money::from_cents(1300).unwrap());
        assert_eq!(Money::sum(&[]).unwrap(), Money::ZERO);
    }

    #[test]
    fn test_money_multiply_overflow() {
        let price = Money::new(max_amount()).unwrap();
        assert_eq!(price.multiply(qty(2)), Err(MoneyError::Overflow));
    }

    #[test]
    fn test_money_serializes_as_string() {
        let m = Money::from_cents(2000).unwrap();
        assert_eq!(serde_json::to_string(&m).unwrap(), "\"20.00\"");
        let back: Money = serde_json::from_str("\"5.5\"").unwrap();
        assert_eq!(back, Money::from_cents(550).unwrap());
        assert!(serde_json::from_str::<Money>("\"-1\"").is_err());
    }

    #[test]
    fn test_quantity() {
        assert_eq!(Quantity::new(0), Err(QuantityError::Zero));
        assert_eq!(qty(4).value(), 4);
        assert!(serde_json::from_str::<Quantity>("0").is_err());
    }
}
