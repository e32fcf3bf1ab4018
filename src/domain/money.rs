use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

const ZERO_DECIMAL_CURRENCIES: &[&str] = &[
    "BIF", "CLP", "DJF", "GNF", "ISK", "JPY", "KMF", "KRW", "PYG", "RWF", "UGX", "VND", "VUV",
    "XAF", "XOF", "XPF",
];

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MoneyError {
    #[error("currency mismatch: {left} vs {right}")]
    CurrencyMismatch { left: String, right: String },
    #[error("invalid currency code: {0}")]
    InvalidCurrency(String),
    #[error("amount out of range")]
    Overflow,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Currency(String);

impl Currency {
    pub fn parse(code: &str) -> Result<Self, MoneyError> {
        let code = code.trim();
        if code.len() != 3 || !code.chars().all(|c| c.is_ascii_alphabetic()) {
            return Err(MoneyError::InvalidCurrency(code.to_string()));
        }
        Ok(Self(code.to_ascii_uppercase()))
    }

    pub fn code(&self) -> &str {
        &self.0
    }

    /// Number of decimal places between the major and minor unit.
    pub fn exponent(&self) -> u32 {
        if ZERO_DECIMAL_CURRENCIES.contains(&self.0.as_str()) {
            0
        } else {
            2
        }
    }
}

impl TryFrom<String> for Currency {
    type Error = MoneyError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Currency::parse(&value)
    }
}

impl From<Currency> for String {
    fn from(value: Currency) -> Self {
        value.0
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Money {
    minor: i64,
    currency: Currency,
}

impl Money {
    pub fn new(minor: i64, currency: Currency) -> Self {
        Self { minor, currency }
    }

    pub fn zero(currency: Currency) -> Self {
        Self { minor: 0, currency }
    }

    pub fn minor(&self) -> i64 {
        self.minor
    }

    pub fn currency(&self) -> &Currency {
        &self.currency
    }

    pub fn is_zero(&self) -> bool {
        self.minor == 0
    }

    pub fn is_positive(&self) -> bool {
        self.minor > 0
    }

    pub fn checked_add(&self, other: &Money) -> Result<Money, MoneyError> {
        self.ensure_same_currency(other)?;
        let minor = self.minor.checked_add(other.minor).ok_or(MoneyError::Overflow)?;
        Ok(Money::new(minor, self.currency.clone()))
    }

    pub fn checked_sub(&self, other: &Money) -> Result<Money, MoneyError> {
        self.ensure_same_currency(other)?;
        let minor = self.minor.checked_sub(other.minor).ok_or(MoneyError::Overflow)?;
        Ok(Money::new(minor, self.currency.clone()))
    }

    pub fn try_cmp(&self, other: &Money) -> Result<Ordering, MoneyError> {
        self.ensure_same_currency(other)?;
        Ok(self.minor.cmp(&other.minor))
    }

    /// Converts a major-unit decimal (e.g. `19.995`) into minor units, rounding
    /// half away from zero.
    pub fn from_decimal(value: Decimal, currency: Currency) -> Result<Money, MoneyError> {
        let scale = Decimal::from(10_i64.pow(currency.exponent()));
        let minor = value
            .checked_mul(scale)
            .ok_or(MoneyError::Overflow)?
            .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
            .to_i64()
            .ok_or(MoneyError::Overflow)?;
        Ok(Money::new(minor, currency))
    }

    pub fn to_decimal(&self) -> Decimal {
        Decimal::new(self.minor, self.currency.exponent())
    }

    pub fn div_round(&self, count: u64) -> Money {
        if count == 0 {
            return Money::zero(self.currency.clone());
        }
        let total = self.minor as i128;
        let count = count as i128;
        let half = count / 2;
        let q = if total >= 0 {
            (total + half) / count
        } else {
            (total - half) / count
        };
        Money::new(q as i64, self.currency.clone())
    }

    fn ensure_same_currency(&self, other: &Money) -> Result<(), MoneyError> {
        if self.currency != other.currency {
            return Err(MoneyError::CurrencyMismatch {
                left: self.currency.to_string(),
                right: other.currency.to_string(),
            });
        }
        Ok(())
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.to_decimal(), self.currency)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn inr() -> Currency {
        Currency::parse("inr").unwrap()
    }

    #[test]
    fn currency_is_normalised_to_upper_case() {
        assert_eq!(inr().code(), "INR");
        assert!(Currency::parse("RUPEE").is_err());
        assert!(Currency::parse("1NR").is_err());
    }

    #[test]
    fn decimal_conversion_rounds_half_away_from_zero() {
        let up = Money::from_decimal(Decimal::from_str("19.995").unwrap(), inr()).unwrap();
        assert_eq!(up.minor(), 2000);
        let down = Money::from_decimal(Decimal::from_str("19.994").unwrap(), inr()).unwrap();
        assert_eq!(down.minor(), 1999);
        let neg = Money::from_decimal(Decimal::from_str("-0.005").unwrap(), inr()).unwrap();
        assert_eq!(neg.minor(), -1);
    }

    #[test]
    fn zero_decimal_currency_has_no_minor_digits() {
        let jpy = Currency::parse("JPY").unwrap();
        let m = Money::from_decimal(Decimal::from_str("1500.5").unwrap(), jpy).unwrap();
        assert_eq!(m.minor(), 1501);
        assert_eq!(m.to_decimal().to_string(), "1501");
    }

    #[test]
    fn arithmetic_rejects_mixed_currencies() {
        let a = Money::new(100, inr());
        let b = Money::new(100, Currency::parse("USD").unwrap());
        assert!(matches!(a.checked_add(&b), Err(MoneyError::CurrencyMismatch { .. })));
        assert!(matches!(a.try_cmp(&b), Err(MoneyError::CurrencyMismatch { .. })));
    }

    #[test]
    fn renders_minor_units_as_decimal() {
        assert_eq!(Money::new(1999, inr()).to_decimal().to_string(), "19.99");
        assert_eq!(Money::new(1999, inr()).to_string(), "19.99 INR");
    }

    #[test]
    fn div_round_is_half_away_from_zero() {
        assert_eq!(Money::new(5, inr()).div_round(2).minor(), 3);
        assert_eq!(Money::new(4, inr()).div_round(3).minor(), 1);
        assert_eq!(Money::new(100, inr()).div_round(0).minor(), 0);
    }
}
