//! Ledger client boundary for txbot.
//!
//! - [`LedgerClient`]: the async interface every ledger backend implements
//!   (sequence, balance, broadcast, tx-by-hash, deploy, validators, gas price)
//! - [`RestLedgerClient`]: the HTTP implementation over the ledger's REST and
//!   JSON-RPC endpoints
//! - [`TxBroadcaster`]: broadcast with bounded retry, re-query on eventual
//!   consistency, and inclusion waiting
//! - [`FailureReason`]: normalised failure taxonomy and the sequence-mismatch parser

pub mod broadcaster;
pub mod error;
pub mod failure;
pub mod ledger;
pub mod rest;

pub use broadcaster::{RetryPolicy, TxBroadcaster};
pub use error::ClientError;
pub use failure::{parse_expected_sequence, FailureReason};
pub use ledger::{AccountInfo, LedgerClient};
pub use rest::RestLedgerClient;
