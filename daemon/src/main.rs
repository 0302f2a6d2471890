//! txbot daemon: entry point for running the transaction harness.

use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;

use txbot_client::RestLedgerClient;
use txbot_orchestrator::{ContractArtifacts, HarnessConfig, Orchestrator, ShutdownController};
use txbot_rpc::RpcServer;
use txbot_types::{Amount, WorkerKind};
use txbot_utils::LogFormat;

#[derive(Parser)]
#[command(name = "txbot-daemon", about = "Continuous transaction generator")]
struct Cli {
    /// Path to a TOML configuration file. If provided, file settings
    /// are used as the base; CLI flags and env vars override them.
    #[arg(long)]
    config: Option<PathBuf>,

    /// JSON-RPC endpoint.
    #[arg(long, env = "TXBOT_RPC_URL")]
    rpc_url: Option<String>,

    /// REST endpoint.
    #[arg(long, env = "TXBOT_API_URL")]
    api_url: Option<String>,

    /// Hex-encoded treasury private key.
    #[arg(long, env = "TXBOT_ORCH_PRIV_KEY", hide_env_values = true)]
    treasury_key: Option<String>,

    /// Initial worker population.
    #[arg(long, env = "TXBOT_NUMBER_OF_WORKERS")]
    workers: Option<usize>,

    /// Worker kinds, assigned round-robin (comma-separated).
    #[arg(long, env = "TXBOT_WORKER_KINDS", value_delimiter = ',')]
    worker_kinds: Vec<WorkerKind>,

    /// Amount sent to each worker on creation and refund.
    #[arg(long, env = "TXBOT_FUNDS_PER_ACCOUNT")]
    funds_per_account: Option<Amount>,

    /// Treasury balance below which funding stops.
    #[arg(long, env = "TXBOT_TREASURY_MIN_FUNDS")]
    treasury_min_funds: Option<Amount>,

    /// Wait for inclusion after every successful worker broadcast.
    #[arg(long, env = "TXBOT_WAIT_FOR_TX_CONFIRMATION")]
    wait_for_confirmation: bool,

    /// Numeric chain id.
    #[arg(long, env = "TXBOT_CHAIN_ID")]
    chain_id: Option<u64>,

    /// String chain id.
    #[arg(long, env = "TXBOT_COSMOS_CHAIN_ID")]
    cosmos_chain_id: Option<String>,

    /// Gas burned per gas-consume transaction.
    #[arg(long, env = "TXBOT_GAS_TO_CONSUME_PER_TX")]
    gas_per_tx: Option<u64>,

    /// Control server port.
    #[arg(long, env = "TXBOT_SERVER_PORT")]
    port: Option<u16>,

    /// Gas consumer contract artifact (JSON with a `bytecode` field).
    #[arg(long, env = "TXBOT_GAS_CONSUMER_ARTIFACT")]
    gas_consumer_artifact: Option<PathBuf>,

    /// Test token contract artifact.
    #[arg(long, env = "TXBOT_TOKEN_ARTIFACT")]
    token_artifact: Option<PathBuf>,

    /// Log level: "trace", "debug", "info", "warn", "error".
    #[arg(long, env = "TXBOT_LOG_LEVEL")]
    log_level: Option<String>,

    /// Log format: "human" or "json".
    #[arg(long, env = "TXBOT_LOG_FORMAT")]
    log_format: Option<LogFormat>,

    #[command(subcommand)]
    command: Command,
}

#[derive(clap::Subcommand)]
enum Command {
    /// Run the harness until SIGINT/SIGTERM.
    Run,
    /// Print the effective configuration as TOML (without the key).
    Config,
}

impl Cli {
    /// Layer CLI flags and env vars over the file (or default) configuration.
    fn into_config(self) -> anyhow::Result<(HarnessConfig, Command)> {
        let mut config = match &self.config {
            Some(path) => {
                let path_str = path
                    .to_str()
                    .with_context(|| format!("config path {} is not UTF-8", path.display()))?;
                HarnessConfig::from_toml_file(path_str)
                    .with_context(|| format!("loading {}", path.display()))?
            }
            None => HarnessConfig::default(),
        };

        if let Some(v) = self.rpc_url {
            config.rpc_url = v;
        }
        if let Some(v) = self.api_url {
            config.api_url = v;
        }
        if let Some(v) = self.treasury_key {
            config.treasury_private_key = Some(v);
        }
        if let Some(v) = self.workers {
            config.number_of_workers = v;
        }
        if !self.worker_kinds.is_empty() {
            config.worker_kinds = self.worker_kinds;
        }
        if let Some(v) = self.funds_per_account {
            config.funds_per_account = v;
        }
        if let Some(v) = self.treasury_min_funds {
            config.treasury_min_funds = v;
        }
        config.wait_for_tx_confirmation |= self.wait_for_confirmation;
        if let Some(v) = self.chain_id {
            config.chain_id = v;
        }
        if let Some(v) = self.cosmos_chain_id {
            config.cosmos_chain_id = v;
        }
        if let Some(v) = self.gas_per_tx {
            config.gas_to_consume_per_tx = v;
        }
        if let Some(v) = self.port {
            config.server_port = v;
        }
        if self.gas_consumer_artifact.is_some() {
            config.gas_consumer_artifact = self.gas_consumer_artifact;
        }
        if self.token_artifact.is_some() {
            config.token_artifact = self.token_artifact;
        }
        if let Some(v) = self.log_level {
            config.log_level = v;
        }
        if let Some(v) = self.log_format {
            config.log_format = v;
        }
        Ok((config, self.command))
    }
}

async fn run(config: HarnessConfig) -> anyhow::Result<()> {
    config.validate()?;
    txbot_utils::init_logging(config.log_format, &config.log_level);

    let artifacts = ContractArtifacts::load(&config)?;
    let client = Arc::new(RestLedgerClient::new(
        config.api_url.clone(),
        config.rpc_url.clone(),
        config.denom.clone(),
    ));
    let port = config.server_port;
    let orchestrator = Orchestrator::new(config, client, artifacts)?;
    tracing::info!(
        treasury = %orchestrator.treasury_address(),
        workers = orchestrator.config().number_of_workers,
        port,
        "starting txbot"
    );

    let shutdown = ShutdownController::new();
    let server = RpcServer::new(port, Arc::clone(&orchestrator));
    let server_rx = shutdown.subscribe();
    let server_task = tokio::spawn(async move {
        if let Err(e) = server.start(server_rx).await {
            tracing::error!(error = %e, "control server failed");
        }
    });

    let initialized = tokio::select! {
        result = orchestrator.initialize() => Ok(result),
        cause = shutdown.wait_for_signal() => Err(cause),
    };
    match initialized {
        Ok(Ok(())) => {
            let cause = shutdown.wait_for_signal().await;
            tracing::info!(%cause, "stopping harness");
        }
        Ok(Err(e)) => {
            tracing::error!(error = %e, "initialization failed");
            shutdown.shutdown();
            let _ = orchestrator.stop().await;
            let _ = server_task.await;
            return Err(e.into());
        }
        Err(cause) => tracing::info!(%cause, "stopped during initialization"),
    }

    orchestrator.stop().await?;
    let _ = server_task.await;
    tracing::info!("txbot daemon exited cleanly");
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let (config, command) = Cli::parse().into_config()?;
    match command {
        Command::Run => run(config).await,
        Command::Config => {
            print!("{}", config.to_toml_string());
            Ok(())
        }
    }
}
