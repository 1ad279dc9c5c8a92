//! Amount type for handling monetary values.
//!
//! This module provides the `Amount` type which wraps `Decimal`. Documents written by other
//! clients may hold amounts as JSON numbers, numeric strings or garbage; anything that is not a
//! number is read as zero so that aggregation never fails on a bad entry.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::error::Error;
use std::fmt;
use std::fmt::{Debug, Display, Formatter};
use std::ops::{Add, Sub};
use std::str::FromStr;

/// Represents a monetary amount.
///
/// Equality is numeric, so `100.5` and `100.50` are the same amount.
///
/// # Examples
///
/// ```
/// # use finsight::model::Amount;
/// # use std::str::FromStr;
/// let a = Amount::from_str("100.50").unwrap();
/// let b = Amount::from_str("40.25").unwrap();
/// assert_eq!((a - b).to_string(), "60.25");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Amount(Decimal);

impl Amount {
    pub const ZERO: Amount = Amount(Decimal::ZERO);

    pub const fn new(value: Decimal) -> Self {
        Self(value)
    }

    /// Returns the underlying Decimal value.
    pub fn value(&self) -> Decimal {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    /// Returns true if the amount is strictly greater than zero.
    pub fn is_positive(&self) -> bool {
        !self.is_zero() && self.0.is_sign_positive()
    }

    pub fn is_negative(&self) -> bool {
        !self.is_zero() && self.0.is_sign_negative()
    }

    /// Parses leniently: anything that is not a number becomes zero.
    pub fn parse_lenient(s: &str) -> Self {
        Amount::from_str(s).unwrap_or_default()
    }
}

/// An error that can occur when parsing strings into `Decimal` values.
pub struct AmountError(rust_decimal::Error);

impl Debug for AmountError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Debug::fmt(&self.0, f)
    }
}

impl Display for AmountError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Display::fmt(&self.0, f)
    }
}

impl std::error::Error for AmountError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        Some(&self.0)
    }
}

impl FromStr for Amount {
    type Err = AmountError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();

        // Allow a leading currency symbol, e.g. "₹250" or "$12.50"
        let without_symbol = trimmed
            .strip_prefix('₹')
            .or_else(|| trimmed.strip_prefix('$'))
            .unwrap_or(trimmed)
            .trim_start();

        // Remove commas (thousand separators)
        let without_commas = without_symbol.replace(',', "");

        let value = Decimal::from_str(&without_commas).map_err(AmountError)?;
        Ok(Amount(value))
    }
}

impl Display for Amount {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let (sign, num) = if self.is_negative() {
            ("-", self.0.abs())
        } else {
            ("", self.0)
        };
        if num < Decimal::from(1000) {
            write!(f, "{sign}{:.2}", num.round_dp(2))
        } else {
            write!(
                f,
                "{sign}{}",
                format_num::format_num!(",.2", num.to_f64().unwrap_or_default())
            )
        }
    }
}

impl Serialize for Amount {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        // Other clients read the amount as a JSON number.
        match (self.0.fract().is_zero(), self.0.to_i64()) {
            (true, Some(i)) => serializer.serialize_i64(i),
            _ => serializer.serialize_f64(self.0.to_f64().unwrap_or_default()),
        }
    }
}

impl<'de> Deserialize<'de> for Amount {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_any(LenientAmount)
    }
}

/// Accepts numbers and numeric strings. Everything else is zero.
struct LenientAmount;

impl<'de> Visitor<'de> for LenientAmount {
    type Value = Amount;

    fn expecting(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str("a number or a numeric string")
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<Amount, E> {
        Ok(Amount(Decimal::from(v)))
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<Amount, E> {
        Ok(Amount(Decimal::from(v)))
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> Result<Amount, E> {
        // Going through the shortest round-trip string keeps 100.5 as exactly 100.5.
        Ok(Amount::parse_lenient(&v.to_string()))
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<Amount, E> {
        Ok(Amount::parse_lenient(v))
    }

    fn visit_bool<E: de::Error>(self, _: bool) -> Result<Amount, E> {
        Ok(Amount::ZERO)
    }

    fn visit_unit<E: de::Error>(self) -> Result<Amount, E> {
        Ok(Amount::ZERO)
    }

    fn visit_none<E: de::Error>(self) -> Result<Amount, E> {
        Ok(Amount::ZERO)
    }

    fn visit_seq<A: de::SeqAccess<'de>>(self, mut seq: A) -> Result<Amount, A::Error> {
        while seq.next_element::<de::IgnoredAny>()?.is_some() {}
        Ok(Amount::ZERO)
    }

    fn visit_map<A: de::MapAccess<'de>>(self, mut map: A) -> Result<Amount, A::Error> {
        while map
            .next_entry::<de::IgnoredAny, de::IgnoredAny>()?
            .is_some()
        {}
        Ok(Amount::ZERO)
    }
}

impl From<Decimal> for Amount {
    fn from(value: Decimal) -> Self {
        Amount::new(value)
    }
}

impl From<Amount> for Decimal {
    fn from(amount: Amount) -> Self {
        amount.value()
    }
}

impl Add for Amount {
    type Output = Amount;

    fn add(self, rhs: Amount) -> Amount {
        Amount(self.0 + rhs.0)
    }
}

impl Sub for Amount {
    type Output = Amount;

    fn sub(self, rhs: Amount) -> Amount {
        Amount(self.0 - rhs.0)
    }
}

impl std::iter::Sum for Amount {
    fn sum<I: Iterator<Item = Amount>>(iter: I) -> Self {
        iter.fold(Amount::ZERO, Add::add)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    #[test]
    fn test_parse_plain() {
        let amount = Amount::from_str("50.00").unwrap();
        assert_eq!(amount.value(), dec("50"));
    }

    #[test]
    fn test_parse_with_symbol_and_commas() {
        assert_eq!(Amount::from_str("₹1,250.50").unwrap().value(), dec("1250.5"));
        assert_eq!(Amount::from_str(" $12 ").unwrap().value(), dec("12"));
    }

    #[test]
    fn test_parse_garbage_is_error() {
        assert!(Amount::from_str("lots").is_err());
        assert!(Amount::parse_lenient("lots").is_zero());
    }

    #[test]
    fn test_display() {
        assert_eq!(Amount::from(dec("60.25")).to_string(), "60.25");
        assert_eq!(Amount::from(dec("-7.5")).to_string(), "-7.50");
        assert_eq!(Amount::from(dec("0")).to_string(), "0.00");
        assert_eq!(Amount::from(dec("1234567.891")).to_string(), "1,234,567.89");
    }

    #[test]
    fn test_numeric_equality() {
        assert_eq!(Amount::from(dec("100.50")), Amount::from(dec("100.5")));
    }

    #[test]
    fn test_deserialize_number_exact() {
        let amount: Amount = serde_json::from_str("100.50").unwrap();
        assert_eq!(amount.value(), dec("100.5"));
        let amount: Amount = serde_json::from_str("40.25").unwrap();
        assert_eq!(amount.value(), dec("40.25"));
        let amount: Amount = serde_json::from_str("12").unwrap();
        assert_eq!(amount.value(), dec("12"));
    }

    #[test]
    fn test_deserialize_non_numeric_is_zero() {
        for json in [r#""abc""#, "null", "true", "[1,2]", r#"{"a":1}"#] {
            let amount: Amount = serde_json::from_str(json).unwrap();
            assert!(amount.is_zero(), "{json} should be zero");
        }
        let amount: Amount = serde_json::from_str(r#""75.5""#).unwrap();
        assert_eq!(amount.value(), dec("75.5"));
    }

    #[test]
    fn test_serialize_as_number() {
        assert_eq!(
            serde_json::to_string(&Amount::from(dec("100.5"))).unwrap(),
            "100.5"
        );
        assert_eq!(serde_json::to_string(&Amount::from(dec("40"))).unwrap(), "40");
    }

    #[test]
    fn test_sign_checks() {
        assert!(Amount::from(dec("1")).is_positive());
        assert!(!Amount::ZERO.is_positive());
        assert!(!Amount::ZERO.is_negative());
        assert!(Amount::from(dec("-1")).is_negative());
    }

    #[test]
    fn test_sum() {
        let total: Amount = [dec("100.50"), dec("40.25")]
            .into_iter()
            .map(Amount::from)
            .sum();
        assert_eq!(total.value(), dec("140.75"));
    }
}
