use thiserror::Error;
use txbot_types::{Address, Amount};

#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("treasury balance {balance} is below the required minimum {threshold}")]
    InsufficientTreasuryFunds { balance: Amount, threshold: Amount },

    #[error("funding {address} failed: {reason}")]
    FundingFailed { address: Address, reason: String },

    #[error("deploying {contract} failed: {reason}")]
    DeployFailed { contract: String, reason: String },

    #[error("no artifact configured for contract {0}")]
    ContractMissing(String),

    #[error("ledger client error: {0}")]
    Client(#[from] txbot_client::ClientError),

    #[error("crypto error: {0}")]
    Crypto(#[from] txbot_crypto::CryptoError),

    #[error("config error: {0}")]
    Config(String),

    #[error("treasury task is not running")]
    TreasuryUnavailable,

    #[error("orchestrator already initialized")]
    AlreadyInitialized,

    #[error("orchestrator is stopped")]
    Stopped,

    #[error("shutdown timeout")]
    ShutdownTimeout,
}
