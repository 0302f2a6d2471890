//! The treasury actor.
//!
//! One tokio task owns the treasury keypair and its cached sequence. Every
//! treasury-signed operation (bootstrap deploys, initial funding, refunds,
//! token mints) is sent to it as a [`Command`] and executed one at a time, so
//! two operations can never race on the treasury's sequence number.
//!
//! Sequence selection per attempt: a ledger-suggested value from the previous
//! rejection wins, then the cached value, then a fresh query. The cache is
//! dropped after anything other than a confirmed success.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn, Instrument};

use txbot_client::{FailureReason, LedgerClient, TxBroadcaster};
use txbot_types::{
    Account, Address, Amount, BroadcastOutcome, Fee, Message, TxBody, TxHash, TxResponse,
};

use crate::config::HarnessConfig;
use crate::contracts::ContractArtifact;
use crate::metrics::HarnessMetrics;
use crate::tracing_spans::treasury_span;
use crate::OrchestratorError;

const COMMAND_CHANNEL_CAPACITY: usize = 64;
/// `worker` label under which treasury-signed failures are counted.
pub const TREASURY_LABEL: &str = "orchestrator";

/// How a funding request reacts to an underfunded treasury.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FundingPolicy {
    /// Give up on the first `InsufficientTreasuryFunds` (worker admission).
    FailFast,
    /// Wait the retry delay and check again, up to the retry bound (refunds).
    Persistent,
}

/// Chain and retry settings the treasury signs with.
#[derive(Clone, Debug)]
pub struct TreasurySettings {
    pub chain_id: u64,
    pub cosmos_chain_id: String,
    pub denom: String,
    pub fee: Fee,
    pub min_funds: Amount,
    pub funding_retries: u32,
    pub retry_delay: Duration,
    pub deploy_retries: u32,
}

impl TreasurySettings {
    pub fn from_config(config: &HarnessConfig) -> Self {
        Self {
            chain_id: config.chain_id,
            cosmos_chain_id: config.cosmos_chain_id.clone(),
            denom: config.denom.clone(),
            fee: config.fee(),
            min_funds: config.treasury_min_funds,
            funding_retries: config.retry.funding_retries,
            retry_delay: Duration::from_millis(config.retry.funding_retry_delay_ms),
            deploy_retries: config.retry.deploy_retries,
        }
    }
}

enum Command {
    Fund {
        to: Address,
        amount: Amount,
        policy: FundingPolicy,
        reply: oneshot::Sender<Result<TxHash, OrchestratorError>>,
    },
    Deploy {
        artifact: ContractArtifact,
        args: Vec<String>,
        reply: oneshot::Sender<Result<Address, OrchestratorError>>,
    },
    Mint {
        contract: Address,
        to: Address,
        amount: Amount,
        reply: oneshot::Sender<Result<TxHash, OrchestratorError>>,
    },
}

#[derive(Clone, Copy)]
enum Route {
    Broadcast,
    Deploy,
}

enum ExecFailure {
    Fatal(OrchestratorError),
    Exhausted(String),
}

/// Cloneable handle for submitting treasury operations.
#[derive(Clone)]
pub struct TreasuryHandle {
    address: Address,
    tx: mpsc::Sender<Command>,
}

impl TreasuryHandle {
    pub fn address(&self) -> &Address {
        &self.address
    }

    /// Send `amount` to `to`, waiting for inclusion.
    pub async fn fund(
        &self,
        to: &Address,
        amount: Amount,
        policy: FundingPolicy,
    ) -> Result<TxHash, OrchestratorError> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Fund {
            to: to.clone(),
            amount,
            policy,
            reply,
        })
        .await?;
        rx.await.map_err(|_| OrchestratorError::TreasuryUnavailable)?
    }

    /// Deploy a contract and return its address.
    pub async fn deploy(
        &self,
        artifact: ContractArtifact,
        args: Vec<String>,
    ) -> Result<Address, OrchestratorError> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Deploy {
            artifact,
            args,
            reply,
        })
        .await?;
        rx.await.map_err(|_| OrchestratorError::TreasuryUnavailable)?
    }

    /// Mint `amount` of `contract`'s token to `to`.
    pub async fn mint(
        &self,
        contract: &Address,
        to: &Address,
        amount: Amount,
    ) -> Result<TxHash, OrchestratorError> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Mint {
            contract: contract.clone(),
            to: to.clone(),
            amount,
            reply,
        })
        .await?;
        rx.await.map_err(|_| OrchestratorError::TreasuryUnavailable)?
    }

    async fn send(&self, command: Command) -> Result<(), OrchestratorError> {
        self.tx
            .send(command)
            .await
            .map_err(|_| OrchestratorError::TreasuryUnavailable)
    }
}

/// Check the admission invariant: treasury balance at or above `threshold`.
pub async fn check_treasury_balance(
    client: &dyn LedgerClient,
    treasury: &Address,
    threshold: Amount,
) -> Result<Amount, OrchestratorError> {
    let balance = client.get_balance(treasury).await?;
    info!(%balance, %threshold, "treasury balance");
    if balance < threshold {
        return Err(OrchestratorError::InsufficientTreasuryFunds { balance, threshold });
    }
    Ok(balance)
}

/// The actor state. Owned by exactly one task.
pub struct Treasury {
    account: Account,
    broadcaster: TxBroadcaster,
    settings: TreasurySettings,
    metrics: Arc<HarnessMetrics>,
    account_number: Option<u64>,
    cached_sequence: Option<u64>,
}

impl Treasury {
    pub fn new(
        account: Account,
        broadcaster: TxBroadcaster,
        settings: TreasurySettings,
        metrics: Arc<HarnessMetrics>,
    ) -> Self {
        Self {
            account,
            broadcaster,
            settings,
            metrics,
            account_number: None,
            cached_sequence: None,
        }
    }

    /// Start the actor task. It exits on shutdown or once every handle is dropped.
    pub fn spawn(self, shutdown: broadcast::Receiver<()>) -> (TreasuryHandle, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(COMMAND_CHANNEL_CAPACITY);
        let handle = TreasuryHandle {
            address: self.account.address.clone(),
            tx,
        };
        let task = tokio::spawn(self.run(rx, shutdown));
        (handle, task)
    }

    async fn run(mut self, mut rx: mpsc::Receiver<Command>, mut shutdown: broadcast::Receiver<()>) {
        info!(address = %self.account.address, "treasury actor started");
        loop {
            tokio::select! {
                biased;
                _ = shutdown.recv() => {
                    info!("treasury actor shutting down");
                    break;
                }
                command = rx.recv() => match command {
                    Some(command) => self.handle(command).await,
                    None => break,
                },
            }
        }
    }

    async fn handle(&mut self, command: Command) {
        match command {
            Command::Fund {
                to,
                amount,
                policy,
                reply,
            } => {
                let result = self.fund(&to, amount, policy).instrument(treasury_span("fund")).await;
                let outcome = if result.is_ok() { "ok" } else { "failed" };
                self.metrics.funding.with_label_values(&[outcome]).inc();
                let _ = reply.send(result);
            }
            Command::Deploy {
                artifact,
                args,
                reply,
            } => {
                let result = self.deploy(artifact, args).instrument(treasury_span("deploy")).await;
                let _ = reply.send(result);
            }
            Command::Mint {
                contract,
                to,
                amount,
                reply,
            } => {
                let result = self
                    .mint(&contract, &to, amount)
                    .instrument(treasury_span("mint"))
                    .await;
                let _ = reply.send(result);
            }
        }
    }

    async fn fund(
        &mut self,
        to: &Address,
        amount: Amount,
        policy: FundingPolicy,
    ) -> Result<TxHash, OrchestratorError> {
        info!(%to, %amount, "funding account");
        let message = Message::Send {
            from: self.account.address.clone(),
            to: to.clone(),
            amount,
            denom: self.settings.denom.clone(),
        };
        let retries = self.settings.funding_retries;
        match self.execute(vec![message], Route::Broadcast, retries, Some(policy)).await {
            Ok(resp) => {
                info!(%to, hash = %resp.hash, height = resp.height, "account funded");
                Ok(resp.hash)
            }
            Err(ExecFailure::Fatal(e)) => Err(e),
            Err(ExecFailure::Exhausted(reason)) => {
                warn!(%to, %reason, "funding gave up");
                Err(OrchestratorError::FundingFailed {
                    address: to.clone(),
                    reason,
                })
            }
        }
    }

    async fn deploy(
        &mut self,
        artifact: ContractArtifact,
        args: Vec<String>,
    ) -> Result<Address, OrchestratorError> {
        info!(contract = %artifact.name, "deploying contract");
        let message = Message::Deploy {
            deployer: self.account.address.clone(),
            contract: artifact.name.clone(),
            bytecode: artifact.bytecode_hex().to_string(),
            args,
        };
        let retries = self.settings.deploy_retries;
        let failed = |reason: String| OrchestratorError::DeployFailed {
            contract: artifact.name.clone(),
            reason,
        };
        match self.execute(vec![message], Route::Deploy, retries, None).await {
            Ok(resp) => match resp.contract_address {
                Some(address) => {
                    info!(contract = %artifact.name, %address, "contract deployed");
                    Ok(address)
                }
                None => Err(failed("receipt carries no contract address".into())),
            },
            Err(ExecFailure::Fatal(e)) => Err(e),
            Err(ExecFailure::Exhausted(reason)) => Err(failed(reason)),
        }
    }

    async fn mint(
        &mut self,
        contract: &Address,
        to: &Address,
        amount: Amount,
    ) -> Result<TxHash, OrchestratorError> {
        let message = Message::ContractCall {
            contract: contract.clone(),
            caller: self.account.address.clone(),
            entrypoint: "mint".into(),
            args: vec![to.to_string(), amount.to_string()],
            value: Amount::ZERO,
        };
        let retries = self.settings.funding_retries;
        match self.execute(vec![message], Route::Broadcast, retries, None).await {
            Ok(resp) => {
                debug!(%to, %amount, hash = %resp.hash, "tokens minted");
                Ok(resp.hash)
            }
            Err(ExecFailure::Fatal(e)) => Err(e),
            Err(ExecFailure::Exhausted(reason)) => Err(OrchestratorError::FundingFailed {
                address: to.clone(),
                reason: format!("mint: {reason}"),
            }),
        }
    }

    /// Sign and submit `messages` until one attempt is confirmed or the retry
    /// bound is reached.
    async fn execute(
        &mut self,
        messages: Vec<Message>,
        route: Route,
        retries: u32,
        admission: Option<FundingPolicy>,
    ) -> Result<TxResponse, ExecFailure> {
        let attempts = retries.max(1);
        let mut suggested: Option<u64> = None;
        let mut last_reason = String::from("no attempt made");
        let mut short_of_funds: Option<OrchestratorError> = None;

        for attempt in 1..=attempts {
            if attempt > 1 && suggested.is_none() {
                tokio::time::sleep(self.settings.retry_delay).await;
            }

            if let Some(policy) = admission {
                match check_treasury_balance(
                    self.broadcaster.client().as_ref(),
                    &self.account.address,
                    self.settings.min_funds,
                )
                .await
                {
                    Ok(_) => short_of_funds = None,
                    Err(e @ OrchestratorError::InsufficientTreasuryFunds { .. }) => {
                        warn!(attempt, error = %e, "treasury below admission threshold");
                        if policy == FundingPolicy::FailFast {
                            return Err(ExecFailure::Fatal(e));
                        }
                        last_reason = e.to_string();
                        short_of_funds = Some(e);
                        continue;
                    }
                    Err(e) => {
                        warn!(attempt, error = %e, "treasury balance check failed");
                        last_reason = e.to_string();
                        continue;
                    }
                }
            }

            let (sequence, account_number) = match self.next_sequence(suggested.take()).await {
                Ok(pair) => pair,
                Err(e) => {
                    warn!(attempt, error = %e, "treasury sequence query failed");
                    last_reason = e.to_string();
                    continue;
                }
            };

            let body = TxBody {
                chain_id: self.settings.chain_id,
                cosmos_chain_id: self.settings.cosmos_chain_id.clone(),
                signer: self.account.address.clone(),
                account_number,
                sequence,
                fee: self.settings.fee.clone(),
                memo: String::new(),
                messages: messages.clone(),
            };
            let tx = txbot_crypto::sign_tx(body, &self.account.keys)
                .map_err(|e| ExecFailure::Fatal(e.into()))?;

            let outcome = match route {
                Route::Broadcast => self.broadcaster.broadcast_with_retry(&tx).await,
                Route::Deploy => self.broadcaster.deploy(&tx).await,
            };

            match outcome {
                BroadcastOutcome::Response(resp) if resp.is_success() => {
                    match self.broadcaster.wait_for_inclusion(&resp.hash).await {
                        Ok(included) if included.is_success() => {
                            self.cached_sequence = Some(sequence + 1);
                            let contract_address =
                                included.contract_address.clone().or(resp.contract_address);
                            return Ok(TxResponse {
                                contract_address,
                                ..included
                            });
                        }
                        Ok(included) => {
                            self.cached_sequence = None;
                            let reason = FailureReason::classify(included.code, &included.raw_log);
                            warn!(attempt, sequence, %reason, raw_log = %included.raw_log, "treasury tx failed in block");
                            self.metrics.record_failure(TREASURY_LABEL, reason.label());
                            last_reason = format!("{reason}: {}", included.raw_log);
                        }
                        Err(e) => {
                            self.cached_sequence = None;
                            warn!(attempt, sequence, error = %e, "treasury tx not confirmed");
                            last_reason = e.to_string();
                        }
                    }
                }
                BroadcastOutcome::Response(resp) => {
                    self.cached_sequence = None;
                    let reason = FailureReason::classify(resp.code, &resp.raw_log);
                    warn!(attempt, sequence, code = resp.code, %reason, raw_log = %resp.raw_log, "treasury tx rejected");
                    self.metrics.record_failure(TREASURY_LABEL, reason.label());
                    last_reason = format!("{reason}: {}", resp.raw_log);
                    if let FailureReason::SequenceMismatch {
                        expected: Some(expected),
                    } = reason
                    {
                        suggested = Some(expected);
                    }
                }
                BroadcastOutcome::NoResponse { code, message } => {
                    self.cached_sequence = None;
                    warn!(attempt, sequence, ?code, %message, "treasury tx got no response");
                    let reason = FailureReason::classify_unanswered(&message);
                    self.metrics.record_failure(TREASURY_LABEL, reason.label());
                    last_reason = message;
                }
            }
        }

        match short_of_funds {
            Some(e) => Err(ExecFailure::Fatal(e)),
            None => Err(ExecFailure::Exhausted(last_reason)),
        }
    }

    async fn next_sequence(&mut self, suggested: Option<u64>) -> Result<(u64, u64), OrchestratorError> {
        if let (Some(sequence), Some(number)) =
            (suggested.or(self.cached_sequence), self.account_number)
        {
            return Ok((sequence, number));
        }
        let info = self
            .broadcaster
            .client()
            .get_sequence(&self.account.address)
            .await?;
        self.account_number = Some(info.account_number);
        Ok((suggested.unwrap_or(info.sequence), info.account_number))
    }
}
