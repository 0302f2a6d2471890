//! Top-level error type shared across crates.

use thiserror::Error;

/// Common error type for parsing and validating harness-level values.
#[derive(Debug, Error)]
pub enum BotError {
    #[error("invalid address: {0}")]
    InvalidAddress(String),

    #[error("invalid amount: {0}")]
    InvalidAmount(String),

    #[error("invalid private key: {0}")]
    InvalidKey(String),

    #[error("unknown worker kind: {0}")]
    UnknownWorkerKind(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("{0}")]
    Other(String),
}
