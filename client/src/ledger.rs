//! The ledger interface consumed by workers and the treasury.

use async_trait::async_trait;
use txbot_types::{Address, Amount, BroadcastOutcome, SignedTx, TxHash, TxResponse};

use crate::error::ClientError;

/// On-ledger account identity needed to sign: the next expected sequence
/// number and the account number.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AccountInfo {
    pub sequence: u64,
    pub account_number: u64,
}

/// Access to a remote ledger.
///
/// Implementations perform exactly one request per call. Retrying is the
/// caller's job (see [`crate::TxBroadcaster`]).
#[async_trait]
pub trait LedgerClient: Send + Sync {
    /// Next expected sequence number and account number for `address`.
    async fn get_sequence(&self, address: &Address) -> Result<AccountInfo, ClientError>;

    /// Native-asset balance of `address`.
    async fn get_balance(&self, address: &Address) -> Result<Amount, ClientError>;

    /// Submit a signed transaction.
    ///
    /// An `Err` means the request itself failed; a ledger-level rejection is an
    /// `Ok` outcome with a non-zero code or a [`BroadcastOutcome::NoResponse`].
    async fn broadcast(&self, tx: &SignedTx) -> Result<BroadcastOutcome, ClientError>;

    /// Look up a previously broadcast transaction. `Ok(None)` while the query
    /// layer does not know the hash yet.
    async fn get_tx_by_hash(&self, hash: &TxHash) -> Result<Option<TxResponse>, ClientError>;

    /// Submit a signed transaction carrying a `Deploy` message. On success the
    /// response carries the new contract address.
    async fn deploy_contract(&self, tx: &SignedTx) -> Result<BroadcastOutcome, ClientError>;

    /// Operator addresses of the current validator set.
    async fn get_validators(&self) -> Result<Vec<String>, ClientError>;

    /// Current suggested gas price for raw value transfers.
    async fn gas_price(&self) -> Result<Amount, ClientError>;
}
