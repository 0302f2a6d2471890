//! The closed set of worker kinds.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::BotError;

/// The category of transaction a worker continuously issues.
///
/// Immutable for the lifetime of a worker.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WorkerKind {
    /// Native bank transfers with an incrementing amount.
    Transfer,
    /// Staking delegations to a validator.
    Delegate,
    /// Token-to-native conversions of a minted test token.
    Convert,
    /// Calls into the gas-burning contract.
    GasConsume,
    /// Raw ledger-native value transfers with self-managed nonce and gas price.
    RawSend,
}

impl WorkerKind {
    /// Every kind, in the order used for round-robin assignment.
    pub const ALL: [WorkerKind; 5] = [
        WorkerKind::Transfer,
        WorkerKind::Delegate,
        WorkerKind::Convert,
        WorkerKind::GasConsume,
        WorkerKind::RawSend,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            WorkerKind::Transfer => "transfer",
            WorkerKind::Delegate => "delegate",
            WorkerKind::Convert => "convert",
            WorkerKind::GasConsume => "gas-consume",
            WorkerKind::RawSend => "raw-send",
        }
    }
}

impl fmt::Display for WorkerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WorkerKind {
    type Err = BotError;

    /// Accepts the canonical names plus the legacy aliases still used by
    /// existing control scripts (`bank`, `converter`, `gas-consumer`, `ethSender`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "transfer" | "bank" => Ok(WorkerKind::Transfer),
            "delegate" => Ok(WorkerKind::Delegate),
            "convert" | "converter" => Ok(WorkerKind::Convert),
            "gas-consume" | "gas-consumer" => Ok(WorkerKind::GasConsume),
            "raw-send" | "ethSender" => Ok(WorkerKind::RawSend),
            other => Err(BotError::UnknownWorkerKind(other.to_string())),
        }
    }
}
