//! Monetary amounts and currency codes
//!
//! Amounts are kept as signed micros (1 unit = 1_000_000 micros) so ledger
//! arithmetic never touches floating point. Negative amounts are valid and
//! are used for compensating entries.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::errors::{AttributorError, Result};

const MICROS_PER_UNIT: i64 = 1_000_000;
const MAX_FRACTION_DIGITS: usize = 6;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Money(i64);

impl Money {
    pub const ZERO: Money = Money(0);

    pub fn from_micros(micros: i64) -> Self {
        Money(micros)
    }

    pub fn micros(&self) -> i64 {
        self.0
    }

    /// Parse a decimal string such as `"10.00"`, `"-2.5"` or `"3"`
    pub fn parse(input: &str) -> Result<Self> {
        let s = input.trim();
        let (negative, digits) = match s.as_bytes().first() {
            Some(b'-') => (true, &s[1..]),
            Some(b'+') => (false, &s[1..]),
            _ => (false, s),
        };

        let (int_part, frac_part) = digits.split_once('.').unwrap_or((digits, ""));
        if int_part.is_empty() && frac_part.is_empty() {
            return Err(AttributorError::validation(format!(
                "Invalid amount '{}'",
                input
            )));
        }
        if !int_part.bytes().all(|b| b.is_ascii_digit())
            || !frac_part.bytes().all(|b| b.is_ascii_digit())
        {
            return Err(AttributorError::validation(format!(
                "Invalid amount '{}'",
                input
            )));
        }
        if frac_part.len() > MAX_FRACTION_DIGITS {
            return Err(AttributorError::validation(format!(
                "Amount '{}' has more than {} fractional digits",
                input, MAX_FRACTION_DIGITS
            )));
        }

        let overflow = || AttributorError::validation(format!("Amount '{}' out of range", input));

        let units: i64 = if int_part.is_empty() {
            0
        } else {
            int_part.parse().map_err(|_| overflow())?
        };
        let fraction: i64 = if frac_part.is_empty() {
            0
        } else {
            // "5" -> 500000
            format!("{:0<width$}", frac_part, width = MAX_FRACTION_DIGITS)
                .parse()
                .map_err(|_| overflow())?
        };

        let micros = units
            .checked_mul(MICROS_PER_UNIT)
            .and_then(|v| v.checked_add(fraction))
            .ok_or_else(overflow)?;

        Ok(Money(if negative { -micros } else { micros }))
    }

    /// Convert a JSON number; rounds to the nearest micro
    pub fn from_f64(value: f64) -> Result<Self> {
        let micros = (value * MICROS_PER_UNIT as f64).round();
        if !micros.is_finite() || micros.abs() > i64::MAX as f64 {
            return Err(AttributorError::validation(format!(
                "Amount {} out of range",
                value
            )));
        }
        Ok(Money(micros as i64))
    }

    /// Value as expected by platform APIs (`value`, `conversionValue`)
    pub fn to_f64(&self) -> f64 {
        self.0 as f64 / MICROS_PER_UNIT as f64
    }

    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for Money {
    /// At least two fractional digits: `10.00`, `2.50`, `1.234567`
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let abs = self.0.unsigned_abs();
        let units = abs / MICROS_PER_UNIT as u64;
        let mut fraction = format!("{:06}", abs % MICROS_PER_UNIT as u64);
        while fraction.len() > 2 && fraction.ends_with('0') {
            fraction.pop();
        }
        let sign = if self.0 < 0 { "-" } else { "" };
        write!(f, "{}{}.{}", sign, units, fraction)
    }
}

impl std::ops::Add for Money {
    type Output = Money;

    fn add(self, rhs: Money) -> Money {
        Money(self.0.saturating_add(rhs.0))
    }
}

/// ISO 4217 currency code, always upper case
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Currency(String);

impl Currency {
    pub fn parse(input: &str) -> Result<Self> {
        let code = input.trim();
        if code.len() != 3 || !code.bytes().all(|b| b.is_ascii_alphabetic()) {
            return Err(AttributorError::validation(format!(
                "Invalid currency code '{}'",
                input
            )));
        }
        Ok(Currency(code.to_ascii_uppercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for Currency {
    fn default() -> Self {
        Currency("USD".to_string())
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for Currency {
    type Error = AttributorError;

    fn try_from(value: String) -> Result<Self> {
        Currency::parse(&value)
    }
}

impl From<Currency> for String {
    fn from(value: Currency) -> Self {
        value.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_decimal_strings() {
        assert_eq!(Money::parse("10.00").unwrap().micros(), 10_000_000);
        assert_eq!(Money::parse("2.5").unwrap().micros(), 2_500_000);
        assert_eq!(Money::parse("3").unwrap().micros(), 3_000_000);
        assert_eq!(Money::parse(".75").unwrap().micros(), 750_000);
        assert_eq!(Money::parse("-1.25").unwrap().micros(), -1_250_000);
        assert_eq!(Money::parse(" 0.000001 ").unwrap().micros(), 1);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(Money::parse("").is_err());
        assert!(Money::parse("-").is_err());
        assert!(Money::parse("1,50").is_err());
        assert!(Money::parse("abc").is_err());
        assert!(Money::parse("1.0000001").is_err());
        assert!(Money::parse("99999999999999999999").is_err());
    }

    #[test]
    fn test_from_f64_rounds_to_micros() {
        assert_eq!(Money::from_f64(10.0).unwrap().micros(), 10_000_000);
        assert_eq!(Money::from_f64(0.1 + 0.2).unwrap().micros(), 300_000);
        assert!(Money::from_f64(f64::NAN).is_err());
        assert!(Money::from_f64(f64::INFINITY).is_err());
    }

    #[test]
    fn test_display() {
        assert_eq!(Money::from_micros(10_000_000).to_string(), "10.00");
        assert_eq!(Money::from_micros(2_500_000).to_string(), "2.50");
        assert_eq!(Money::from_micros(1_234_567).to_string(), "1.234567");
        assert_eq!(Money::from_micros(-500_000).to_string(), "-0.50");
        assert_eq!(Money::ZERO.to_string(), "0.00");
    }

    #[test]
    fn test_currency() {
        assert_eq!(Currency::parse("usd").unwrap().as_str(), "USD");
        assert_eq!(Currency::parse(" eur ").unwrap().as_str(), "EUR");
        assert!(Currency::parse("US").is_err());
        assert!(Currency::parse("U5D").is_err());
        assert_eq!(Currency::default().as_str(), "USD");
    }
}
