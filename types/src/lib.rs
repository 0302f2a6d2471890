//! Fundamental types for the txbot transaction harness.
//!
//! This crate defines the types shared across every other crate in the workspace:
//! addresses, amounts, keys, worker kinds, transaction bodies and broadcast outcomes.

pub mod address;
pub mod amount;
pub mod error;
pub mod hash;
pub mod keys;
pub mod kind;
pub mod outcome;
pub mod tx;

pub use address::Address;
pub use amount::Amount;
pub use error::BotError;
pub use hash::TxHash;
pub use keys::{Account, KeyPair, PrivateKey, PublicKey, Signature};
pub use kind::WorkerKind;
pub use outcome::{BroadcastOutcome, TxResponse};
pub use tx::{Fee, Message, SignedTx, TxBody};
