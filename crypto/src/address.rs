//! Address derivation from public keys.
//!
//! Address format: `0x` + hex(last 20 bytes of Blake2b-256(public_key)).

use txbot_types::{Address, PublicKey};

use crate::hash::blake2b_256;

/// Derive the ledger address of a public key.
pub fn derive_address(public_key: &PublicKey) -> Address {
    let digest = blake2b_256(public_key.as_bytes());
    let mut bytes = [0u8; Address::BYTE_LEN];
    bytes.copy_from_slice(&digest[32 - Address::BYTE_LEN..]);
    Address::from_bytes(bytes)
}
