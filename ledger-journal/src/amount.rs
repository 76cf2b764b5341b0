//! Amount type with commodity support and arbitrary precision arithmetic

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Neg;
use std::str::FromStr;

/// Errors produced when reading an amount from text
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AmountParseError {
    /// Nothing to parse
    #[error("Empty amount")]
    Empty,
    /// No numeric quantity was found
    #[error("Amount '{0}' has no quantity")]
    MissingQuantity(String),
    /// The quantity is not a valid decimal number
    #[error("Invalid quantity '{quantity}' in amount '{text}'")]
    InvalidQuantity {
        /// Full amount text
        text: String,
        /// The offending quantity
        quantity: String,
    },
}

/// Represents a monetary amount with optional commodity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Amount {
    /// The numeric value
    value: Decimal,
    /// Optional commodity symbol
    commodity: Option<String>,
}

impl Amount {
    /// Create a new Amount with a value
    pub fn new(value: Decimal) -> Self {
        Self { value, commodity: None }
    }

    /// Create an Amount with a commodity
    pub fn with_commodity(value: Decimal, commodity: impl Into<String>) -> Self {
        Self { value, commodity: Some(commodity.into()) }
    }

    /// Get the numeric value
    pub fn value(&self) -> Decimal {
        self.value
    }

    /// Get the commodity if present
    pub fn commodity(&self) -> Option<&str> {
        self.commodity.as_deref()
    }

    /// True when the quantity is zero
    pub fn is_zero(&self) -> bool {
        self.value.is_zero()
    }

    /// True when the quantity is below zero
    pub fn is_negative(&self) -> bool {
        self.value.is_sign_negative() && !self.value.is_zero()
    }

    /// Same commodity, quantity multiplied by `factor`; `None` on overflow
    pub fn scaled(&self, factor: Decimal) -> Option<Self> {
        let value = self.value.checked_mul(factor)?;
        Some(Self { value, commodity: self.commodity.clone() })
    }

    // Symbols such as "$" are written before the quantity, names such as "EUR" after it.
    fn commodity_is_prefix(commodity: &str) -> bool {
        !commodity.chars().any(char::is_alphabetic)
    }
}

impl Neg for Amount {
    type Output = Amount;

    fn neg(self) -> Self::Output {
        Self { value: -self.value, commodity: self.commodity }
    }
}

impl FromStr for Amount {
    type Err = AmountParseError;

    /// Accepts `$10.00`, `-$10`, `$-10`, `10 EUR`, `EUR 10`, `1,000.50` and bare numbers.
    fn from_str(text: &str) -> Result<Self, Self::Err> {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Err(AmountParseError::Empty);
        }

        let (negated, rest) = match trimmed.strip_prefix('-') {
            Some(rest) => (true, rest.trim_start()),
            None => (false, trimmed),
        };

        let starts_quantity = |c: char| c.is_ascii_digit() || c == '-' || c == '.';
        let (commodity, quantity) = if rest.starts_with(starts_quantity) {
            let end = rest
                .find(|c: char| !(c.is_ascii_digit() || c == '.' || c == ',' || c == '-'))
                .unwrap_or(rest.len());
            (rest[end..].trim(), &rest[..end])
        } else {
            let start = rest
                .find(starts_quantity)
                .ok_or_else(|| AmountParseError::MissingQuantity(trimmed.to_string()))?;
            (rest[..start].trim(), rest[start..].trim())
        };

        let digits: String = quantity.chars().filter(|c| *c != ',').collect();
        let mut value = Decimal::from_str(&digits).map_err(|_| {
            AmountParseError::InvalidQuantity {
                text: trimmed.to_string(),
                quantity: quantity.to_string(),
            }
        })?;
        if negated {
            value = -value;
        }

        Ok(if commodity.is_empty() {
            Amount::new(value)
        } else {
            Amount::with_commodity(value, commodity)
        })
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.commodity.as_deref() {
            Some(commodity) if Self::commodity_is_prefix(commodity) => {
                if self.is_negative() {
                    write!(f, "-{}{}", commodity, self.value.abs())
                } else {
                    write!(f, "{}{}", commodity, self.value)
                }
            }
            Some(commodity) => write!(f, "{} {}", self.value, commodity),
            None => write!(f, "{}", self.value),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scaled() {
        let price = Amount::with_commodity(Decimal::from(150), "$");
        assert_eq!(price.scaled(Decimal::from(10)), Some(Amount::with_commodity(Decimal::from(1500), "$")));
        assert_eq!(price.scaled(Decimal::MAX), None);
    }

    #[test]
    fn test_amount_creation() {
        let amount = Amount::new(Decimal::from(100));
        assert_eq!(amount.value(), Decimal::from(100));
        assert_eq!(amount.commodity(), None);
    }

    #[test]
    fn test_amount_with_commodity() {
        let amount = Amount::with_commodity(Decimal::from(100), "USD");
        assert_eq!(amount.value(), Decimal::from(100));
        assert_eq!(amount.commodity(), Some("USD"));
    }

    #[test]
    fn test_parse_prefix_and_suffix_commodities() {
        let dollars: Amount = "$45.50".parse().unwrap();
        assert_eq!(dollars.value(), Decimal::new(4550, 2));
        assert_eq!(dollars.commodity(), Some("$"));

        let euros: Amount = "12 EUR".parse().unwrap();
        assert_eq!(euros.value(), Decimal::from(12));
        assert_eq!(euros.commodity(), Some("EUR"));

        let named_prefix: Amount = "EUR 7".parse().unwrap();
        assert_eq!(named_prefix.commodity(), Some("EUR"));
    }

    #[test]
    fn test_parse_negative_forms() {
        let leading: Amount = "-$10".parse().unwrap();
        let inner: Amount = "$-10".parse().unwrap();
        assert_eq!(leading, inner);
        assert!(leading.is_negative());
        assert_eq!(leading.to_string(), "-$10");
    }

    #[test]
    fn test_parse_thousands_separator() {
        let amount: Amount = "1,000.25 USD".parse().unwrap();
        assert_eq!(amount.value(), Decimal::new(100025, 2));
    }

    #[test]
    fn test_parse_errors() {
        assert_eq!("".parse::<Amount>(), Err(AmountParseError::Empty));
        assert!(matches!("USD".parse::<Amount>(), Err(AmountParseError::MissingQuantity(_))));
        assert!(matches!(
            "$1.2.3".parse::<Amount>(),
            Err(AmountParseError::InvalidQuantity { .. })
        ));
    }

    #[test]
    fn test_display_and_negation() {
        let amount = Amount::with_commodity(Decimal::new(1250, 2), "$");
        assert_eq!(amount.to_string(), "$12.50");
        assert_eq!((-amount).to_string(), "-$12.50");
        assert_eq!(Amount::with_commodity(Decimal::from(3), "AAPL").to_string(), "3 AAPL");
    }
}
