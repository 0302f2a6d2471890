//! Broadcast outcomes as reported by the ledger.

use serde::{Deserialize, Serialize};

use crate::address::Address;
use crate::hash::TxHash;

/// The ledger's response body for a transaction it accepted into its
/// pipeline (it has a hash), successful or not.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxResponse {
    #[serde(rename = "txhash")]
    pub hash: TxHash,
    /// Zero on success; any other value is a failure code.
    #[serde(default)]
    pub code: u32,
    /// Free-text diagnostic emitted by the ledger; may be empty.
    #[serde(default)]
    pub raw_log: String,
    /// Block height, zero while the transaction is not yet included.
    #[serde(default)]
    pub height: u64,
    #[serde(default)]
    pub gas_used: u64,
    /// Set when the transaction deployed a contract.
    #[serde(default)]
    pub contract_address: Option<Address>,
}

impl TxResponse {
    pub fn is_success(&self) -> bool {
        self.code == 0
    }

    pub fn is_included(&self) -> bool {
        self.height > 0
    }
}

/// The result of submitting a signed transaction.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BroadcastOutcome {
    /// The ledger returned a response body carrying a hash and a code.
    Response(TxResponse),
    /// No usable response: transport failure, timeout, or an error payload
    /// without a transaction hash.
    NoResponse {
        code: Option<i64>,
        message: String,
    },
}

impl BroadcastOutcome {
    /// The transaction hash, when the outcome carries a recognisable one.
    pub fn hash(&self) -> Option<&TxHash> {
        match self {
            BroadcastOutcome::Response(resp) if !resp.hash.is_empty() => Some(&resp.hash),
            _ => None,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, BroadcastOutcome::Response(resp) if resp.is_success())
    }
}
