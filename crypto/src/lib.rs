//! Cryptographic primitives for txbot accounts.
//!
//! - **Ed25519** for signing transaction bodies
//! - **Blake2b** for hashing (address derivation, transaction hashes)
//! - Address derivation: `0x` + hex of the last 20 bytes of Blake2b-256(public key)

pub mod address;
pub mod error;
pub mod hash;
pub mod keys;
pub mod sign;

pub use address::derive_address;
pub use error::CryptoError;
pub use hash::{blake2b_256, hash_transaction};
pub use keys::{
    generate_account, generate_keypair, keypair_from_private, keypair_from_seed,
    public_from_private,
};
pub use sign::{sign_message, sign_tx, verify_signature, verify_tx};
