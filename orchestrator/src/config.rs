//! Harness configuration with TOML file support.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use txbot_client::RetryPolicy;
use txbot_types::{Address, Amount, Fee, PrivateKey, WorkerKind};
use txbot_utils::LogFormat;

use crate::OrchestratorError;

/// Configuration for the transaction harness.
///
/// Can be loaded from a TOML file via [`HarnessConfig::from_toml_file`] or
/// built programmatically (e.g. for tests).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct HarnessConfig {
    /// JSON-RPC endpoint (gas price queries).
    #[serde(default = "default_rpc_url")]
    pub rpc_url: String,

    /// REST endpoint (accounts, balances, broadcast, tx lookup).
    #[serde(default = "default_api_url")]
    pub api_url: String,

    /// Hex-encoded treasury private key. Never written back out.
    #[serde(default, skip_serializing)]
    pub treasury_private_key: Option<String>,

    /// Size of the initial worker population.
    #[serde(default = "default_number_of_workers")]
    pub number_of_workers: usize,

    /// Kinds assigned round-robin to the initial population.
    #[serde(default = "default_worker_kinds")]
    pub worker_kinds: Vec<WorkerKind>,

    /// Amount sent to a worker account on creation and on every refund.
    #[serde(default = "default_funds_per_account")]
    pub funds_per_account: Amount,

    /// Treasury balance below which no funding transfer is attempted.
    #[serde(default = "default_treasury_min_funds")]
    pub treasury_min_funds: Amount,

    /// Whether workers wait for inclusion after a successful broadcast.
    #[serde(default)]
    pub wait_for_tx_confirmation: bool,

    /// Numeric chain id.
    #[serde(default = "default_chain_id")]
    pub chain_id: u64,

    /// String chain id.
    #[serde(default = "default_cosmos_chain_id")]
    pub cosmos_chain_id: String,

    /// Gas burned per call by gas-consume workers.
    #[serde(default = "default_gas_to_consume_per_tx")]
    pub gas_to_consume_per_tx: u64,

    /// Native denomination.
    #[serde(default = "default_denom")]
    pub denom: String,

    /// Fee attached to treasury and message-layer transactions.
    #[serde(default = "default_fee_amount")]
    pub fee_amount: Amount,

    /// Gas limit attached to treasury and message-layer transactions.
    #[serde(default = "default_fee_gas")]
    pub fee_gas: u64,

    /// Receiver for transfer workers without a `receiver` param.
    #[serde(default = "default_receiver")]
    pub default_transfer_receiver: Address,

    /// Receiver for raw-send workers without a `receiver` param.
    #[serde(default = "default_receiver")]
    pub default_raw_receiver: Address,

    /// Control surface port.
    #[serde(default = "default_server_port")]
    pub server_port: u16,

    /// Log level filter: "trace", "debug", "info", "warn", "error".
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Log format: "human" or "json".
    #[serde(default = "default_log_format")]
    pub log_format: LogFormat,

    /// JSON artifact for the gas-consumer contract.
    #[serde(default)]
    pub gas_consumer_artifact: Option<PathBuf>,

    /// JSON artifact for the test token contract.
    #[serde(default)]
    pub token_artifact: Option<PathBuf>,

    #[serde(default)]
    pub retry: RetryConfig,
}

/// Retry counts and delays.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_broadcast_retries")]
    pub broadcast_retries: u32,
    #[serde(default = "default_broadcast_retry_delay_ms")]
    pub broadcast_retry_delay_ms: u64,
    #[serde(default = "default_requery_delay_ms")]
    pub requery_delay_ms: u64,
    #[serde(default = "default_funding_retries")]
    pub funding_retries: u32,
    #[serde(default = "default_funding_retry_delay_ms")]
    pub funding_retry_delay_ms: u64,
    #[serde(default = "default_deploy_retries")]
    pub deploy_retries: u32,
    #[serde(default = "default_confirmation_attempts")]
    pub confirmation_attempts: u32,
    #[serde(default = "default_confirmation_delay_ms")]
    pub confirmation_delay_ms: u64,
    #[serde(default = "default_refund_poll_interval_ms")]
    pub refund_poll_interval_ms: u64,
    #[serde(default = "default_worker_loop_delay_ms")]
    pub worker_loop_delay_ms: u64,
    #[serde(default = "default_low_funds_poll_interval_ms")]
    pub low_funds_poll_interval_ms: u64,
    #[serde(default = "default_failure_backoff_ms")]
    pub failure_backoff_ms: u64,
    /// Tokens minted to each convert worker before its first conversion.
    #[serde(default = "default_mint_amount")]
    pub mint_amount: Amount,
}

// ── Serde default helpers ──────────────────────────────────────────────

fn default_rpc_url() -> String {
    "http://127.0.0.1:8545".to_string()
}

fn default_api_url() -> String {
    "http://127.0.0.1:1317".to_string()
}

fn default_number_of_workers() -> usize {
    10
}

fn default_worker_kinds() -> Vec<WorkerKind> {
    WorkerKind::ALL.to_vec()
}

fn default_funds_per_account() -> Amount {
    Amount::new(1_000_000_000_000_000_000)
}

fn default_treasury_min_funds() -> Amount {
    Amount::new(10_000_000_000_000_000_000)
}

fn default_chain_id() -> u64 {
    9000
}

fn default_cosmos_chain_id() -> String {
    "evmos_9000-1".to_string()
}

fn default_gas_to_consume_per_tx() -> u64 {
    100_000
}

fn default_denom() -> String {
    "aevmos".to_string()
}

fn default_fee_amount() -> Amount {
    Amount::new(10_000_000_000_000)
}

fn default_fee_gas() -> u64 {
    2_000_000
}

fn default_receiver() -> Address {
    Address::from_bytes([
        0x0e, 0xec, 0xa1, 0xc5, 0x50, 0x80, 0x1c, 0x18, 0x55, 0x44, 0x8e, 0x0a, 0xda, 0xe3, 0xe0,
        0xfe, 0x3b, 0x57, 0xc4, 0x8d,
    ])
}

fn default_server_port() -> u16 {
    8080
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> LogFormat {
    LogFormat::Human
}

fn default_broadcast_retries() -> u32 {
    5
}

fn default_broadcast_retry_delay_ms() -> u64 {
    2000
}

fn default_requery_delay_ms() -> u64 {
    2000
}

fn default_funding_retries() -> u32 {
    5
}

fn default_funding_retry_delay_ms() -> u64 {
    1000
}

fn default_deploy_retries() -> u32 {
    5
}

fn default_confirmation_attempts() -> u32 {
    30
}

fn default_confirmation_delay_ms() -> u64 {
    1000
}

fn default_refund_poll_interval_ms() -> u64 {
    1000
}

fn default_worker_loop_delay_ms() -> u64 {
    100
}

fn default_low_funds_poll_interval_ms() -> u64 {
    1000
}

fn default_failure_backoff_ms() -> u64 {
    1000
}

fn default_mint_amount() -> Amount {
    Amount::new(100_000)
}

// ── Impl ───────────────────────────────────────────────────────────────

impl HarnessConfig {
    /// Load configuration from a TOML file.
    pub fn from_toml_file(path: &str) -> Result<Self, OrchestratorError> {
        let content =
            std::fs::read_to_string(path).map_err(|e| OrchestratorError::Config(e.to_string()))?;
        Self::from_toml_str(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn from_toml_str(s: &str) -> Result<Self, OrchestratorError> {
        toml::from_str(s).map_err(|e| OrchestratorError::Config(e.to_string()))
    }

    /// Serialize the configuration to a TOML string. The treasury key is omitted.
    pub fn to_toml_string(&self) -> String {
        toml::to_string_pretty(self).expect("HarnessConfig is always serializable to TOML")
    }

    /// Reject configurations the orchestrator cannot run with.
    pub fn validate(&self) -> Result<(), OrchestratorError> {
        let invalid = |msg: &str| Err(OrchestratorError::Config(msg.to_string()));
        if self.rpc_url.trim().is_empty() || self.api_url.trim().is_empty() {
            return invalid("rpc_url and api_url must be set");
        }
        if self.worker_kinds.is_empty() {
            return invalid("worker_kinds must not be empty");
        }
        if self.funds_per_account.is_zero() {
            return invalid("funds_per_account must be positive");
        }
        if self.retry.broadcast_retries == 0
            || self.retry.funding_retries == 0
            || self.retry.deploy_retries == 0
        {
            return invalid("retry counts must be at least 1");
        }
        self.treasury_key().map(|_| ())
    }

    /// Parse the configured treasury key.
    pub fn treasury_key(&self) -> Result<PrivateKey, OrchestratorError> {
        let raw = self
            .treasury_private_key
            .as_deref()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| OrchestratorError::Config("treasury_private_key is required".into()))?;
        PrivateKey::from_hex(raw).map_err(|e| OrchestratorError::Config(e.to_string()))
    }

    /// Fee for treasury and message-layer transactions.
    pub fn fee(&self) -> Fee {
        Fee::new(self.fee_amount, self.denom.clone(), self.fee_gas)
    }

    pub fn broadcast_policy(&self) -> RetryPolicy {
        RetryPolicy {
            retries: self.retry.broadcast_retries,
            retry_delay: Duration::from_millis(self.retry.broadcast_retry_delay_ms),
            requery_delay: Duration::from_millis(self.retry.requery_delay_ms),
            confirmation_attempts: self.retry.confirmation_attempts,
            confirmation_delay: Duration::from_millis(self.retry.confirmation_delay_ms),
        }
    }
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            rpc_url: default_rpc_url(),
            api_url: default_api_url(),
            treasury_private_key: None,
            number_of_workers: default_number_of_workers(),
            worker_kinds: default_worker_kinds(),
            funds_per_account: default_funds_per_account(),
            treasury_min_funds: default_treasury_min_funds(),
            wait_for_tx_confirmation: false,
            chain_id: default_chain_id(),
            cosmos_chain_id: default_cosmos_chain_id(),
            gas_to_consume_per_tx: default_gas_to_consume_per_tx(),
            denom: default_denom(),
            fee_amount: default_fee_amount(),
            fee_gas: default_fee_gas(),
            default_transfer_receiver: default_receiver(),
            default_raw_receiver: default_receiver(),
            server_port: default_server_port(),
            log_level: default_log_level(),
            log_format: default_log_format(),
            gas_consumer_artifact: None,
            token_artifact: None,
            retry: RetryConfig::default(),
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            broadcast_retries: default_broadcast_retries(),
            broadcast_retry_delay_ms: default_broadcast_retry_delay_ms(),
            requery_delay_ms: default_requery_delay_ms(),
            funding_retries: default_funding_retries(),
            funding_retry_delay_ms: default_funding_retry_delay_ms(),
            deploy_retries: default_deploy_retries(),
            confirmation_attempts: default_confirmation_attempts(),
            confirmation_delay_ms: default_confirmation_delay_ms(),
            refund_poll_interval_ms: default_refund_poll_interval_ms(),
            worker_loop_delay_ms: default_worker_loop_delay_ms(),
            low_funds_poll_interval_ms: default_low_funds_poll_interval_ms(),
            failure_backoff_ms: default_failure_backoff_ms(),
            mint_amount: default_mint_amount(),
        }
    }
}

impl RetryConfig {
    /// Millisecond-scale delays for tests against an in-memory ledger.
    pub fn fast() -> Self {
        Self {
            broadcast_retry_delay_ms: 1,
            requery_delay_ms: 1,
            funding_retry_delay_ms: 1,
            confirmation_delay_ms: 1,
            refund_poll_interval_ms: 5,
            worker_loop_delay_ms: 5,
            low_funds_poll_interval_ms: 5,
            failure_backoff_ms: 5,
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn default_config_round_trips_through_toml() {
        let config = HarnessConfig::default();
        let toml_str = config.to_toml_string();
        let parsed = HarnessConfig::from_toml_str(&toml_str).expect("should parse");
        assert_eq!(parsed.server_port, config.server_port);
        assert_eq!(parsed.worker_kinds, config.worker_kinds);
        assert_eq!(parsed.funds_per_account, config.funds_per_account);
        assert_eq!(parsed.default_raw_receiver, config.default_raw_receiver);
    }

    #[test]
    fn minimal_toml_uses_defaults() {
        let config = HarnessConfig::from_toml_str("").expect("empty toml should use defaults");
        assert_eq!(config.number_of_workers, 10);
        assert_eq!(config.chain_id, 9000);
        assert_eq!(config.cosmos_chain_id, "evmos_9000-1");
        assert_eq!(config.gas_to_consume_per_tx, 100_000);
        assert_eq!(config.server_port, 8080);
        assert!(!config.wait_for_tx_confirmation);
        assert_eq!(config.treasury_min_funds, Amount::new(10u128.pow(19)));
        assert_eq!(config.funds_per_account, Amount::new(10u128.pow(18)));
        assert_eq!(config.retry.worker_loop_delay_ms, 100);
        assert_eq!(config.log_format, LogFormat::Human);
    }

    #[test]
    fn partial_toml_overrides() {
        let toml = r#"
            number_of_workers = 3
            worker_kinds = ["raw-send", "gas-consume"]
            funds_per_account = "500"

            [retry]
            funding_retries = 9
        "#;
        let config = HarnessConfig::from_toml_str(toml).expect("should parse");
        assert_eq!(config.number_of_workers, 3);
        assert_eq!(
            config.worker_kinds,
            vec![WorkerKind::RawSend, WorkerKind::GasConsume]
        );
        assert_eq!(config.funds_per_account, Amount::new(500));
        assert_eq!(config.retry.funding_retries, 9);
        assert_eq!(config.retry.deploy_retries, 5); // default
    }

    #[test]
    fn treasury_key_is_never_serialized() {
        let config = HarnessConfig {
            treasury_private_key: Some("11".repeat(32)),
            ..HarnessConfig::default()
        };
        assert!(!config.to_toml_string().contains(&"11".repeat(32)));
    }

    #[test]
    fn validate_rejects_bad_configs() {
        let valid = HarnessConfig {
            treasury_private_key: Some(format!("0x{}", "ab".repeat(32))),
            ..HarnessConfig::default()
        };
        assert!(valid.validate().is_ok());

        let no_key = HarnessConfig::default();
        assert!(matches!(no_key.validate(), Err(OrchestratorError::Config(_))));

        let no_kinds = HarnessConfig {
            worker_kinds: vec![],
            ..valid.clone()
        };
        assert!(no_kinds.validate().is_err());

        let mut no_retries = valid.clone();
        no_retries.retry.funding_retries = 0;
        assert!(no_retries.validate().is_err());

        let zero_workers = HarnessConfig {
            number_of_workers: 0,
            ..valid
        };
        assert!(zero_workers.validate().is_ok());
    }

    #[test]
    fn loads_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "server_port = 9191\ndenom = \"atest\"").unwrap();
        let config = HarnessConfig::from_toml_file(file.path().to_str().unwrap()).unwrap();
        assert_eq!(config.server_port, 9191);
        assert_eq!(config.fee().denom, "atest");
    }

    #[test]
    fn missing_file_returns_config_error() {
        let result = HarnessConfig::from_toml_file("/nonexistent/txbot.toml");
        assert!(matches!(result, Err(OrchestratorError::Config(_))));
    }
}
