//! Account address type with `0x` prefix.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::BotError;

/// A ledger account address: `0x` followed by 40 lowercase hex characters.
///
/// Derived from the account's public key via Blake2b hashing (see
/// `txbot_crypto::derive_address`).
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Address(String);

impl Address {
    /// The standard prefix for all addresses.
    pub const PREFIX: &'static str = "0x";

    /// Number of raw bytes encoded in an address.
    pub const BYTE_LEN: usize = 20;

    /// Build an address from its 20 raw bytes.
    pub fn from_bytes(bytes: [u8; Self::BYTE_LEN]) -> Self {
        Self(format!("{}{}", Self::PREFIX, hex::encode(bytes)))
    }

    /// Parse and normalise (lowercase) an address string.
    pub fn parse(raw: &str) -> Result<Self, BotError> {
        let trimmed = raw.trim();
        let body = trimmed
            .strip_prefix(Self::PREFIX)
            .ok_or_else(|| BotError::InvalidAddress(raw.to_string()))?;
        if body.len() != Self::BYTE_LEN * 2 || !body.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(BotError::InvalidAddress(raw.to_string()));
        }
        Ok(Self(format!("{}{}", Self::PREFIX, body.to_ascii_lowercase())))
    }

    /// Return the raw address string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for Address {
    type Err = BotError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}
