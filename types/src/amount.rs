//! Native-asset amounts.
//!
//! Amounts are represented as integers (u128) of the smallest denomination to
//! avoid floating-point errors. The ledger reports balances as decimal strings,
//! so parsing from and rendering to strings is part of the contract.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::ops::{Add, Sub};

use crate::error::BotError;

/// An amount of the native asset in base units.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Amount(u128);

impl Amount {
    pub const ZERO: Self = Self(0);

    pub fn new(raw: u128) -> Self {
        Self(raw)
    }

    pub fn raw(&self) -> u128 {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }

    pub fn checked_add(self, other: Self) -> Option<Self> {
        self.0.checked_add(other.0).map(Self)
    }

    pub fn checked_sub(self, other: Self) -> Option<Self> {
        self.0.checked_sub(other.0).map(Self)
    }

    pub fn saturating_add(self, other: Self) -> Self {
        Self(self.0.saturating_add(other.0))
    }

    pub fn saturating_sub(self, other: Self) -> Self {
        Self(self.0.saturating_sub(other.0))
    }

    pub fn saturating_mul(self, factor: u128) -> Self {
        Self(self.0.saturating_mul(factor))
    }

    /// Parse a decimal string of base units (e.g. `"1000000000000000000"`).
    pub fn parse(s: &str) -> Result<Self, BotError> {
        s.trim()
            .parse::<u128>()
            .map(Self)
            .map_err(|e| BotError::InvalidAmount(format!("{s:?}: {e}")))
    }
}

impl Add for Amount {
    type Output = Self;
    fn add(self, rhs: Self) -> Self {
        Self(self.0 + rhs.0)
    }
}

impl Sub for Amount {
    type Output = Self;
    fn sub(self, rhs: Self) -> Self {
        Self(self.0 - rhs.0)
    }
}

impl From<u128> for Amount {
    fn from(raw: u128) -> Self {
        Self(raw)
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for Amount {
    type Err = BotError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

// Amounts routinely exceed 2^64 (10^18 base units per coin), which JSON and
// TOML integers cannot carry, so they travel as decimal strings.
impl Serialize for Amount {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0.to_string())
    }
}

impl<'de> Deserialize<'de> for Amount {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Amount::parse(&raw).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_large_values() {
        let amount = Amount::parse("10000000000000000000").unwrap();
        assert_eq!(amount.raw(), 10_000_000_000_000_000_000);
    }

    #[test]
    fn parse_rejects_garbage() {
        assert!(Amount::parse("ten").is_err());
        assert!(Amount::parse("-1").is_err());
    }

    #[test]
    fn serde_uses_strings() {
        let json = serde_json::to_string(&Amount::new(42)).unwrap();
        assert_eq!(json, "\"42\"");
        let back: Amount = serde_json::from_str(&json).unwrap();
        assert_eq!(back, Amount::new(42));
    }

    #[test]
    fn ordering_matches_raw() {
        assert!(Amount::new(5) < Amount::new(10));
        assert_eq!(Amount::new(5).saturating_sub(Amount::new(10)), Amount::ZERO);
    }
}
