//! Workers: one task per ephemeral account, issuing transactions forever.
//!
//! The state machine is `Starting -> Running <-> LowOnFunds -> Stopped`.
//! A [`WorkerHandle`] is the shared half (flags the orchestrator and the
//! refund loop flip); [`Worker`] is the task-owned half holding the account,
//! the local sequence and the per-kind state. Only the worker's own task ever
//! touches its sequence.

pub mod kinds;

use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tracing::{debug, error, info, warn, Instrument};

use txbot_client::{FailureReason, TxBroadcaster};
use txbot_types::{
    Account, Address, Amount, BroadcastOutcome, Fee, TxBody, TxResponse, WorkerKind,
};

use crate::config::HarnessConfig;
use crate::funding::FundingQueue;
use crate::metrics::HarnessMetrics;
use crate::tracing_spans::worker_action_span;
use crate::treasury::TreasuryHandle;

pub use kinds::KindState;

/// Free-form parameters supplied when adding a worker (`receiver`,
/// `validator`, `gas`).
pub type WorkerParams = serde_json::Map<String, serde_json::Value>;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum WorkerState {
    Starting,
    Running,
    LowOnFunds,
    Stopped,
}

/// Shared view of one worker.
#[derive(Debug)]
pub struct WorkerHandle {
    id: u64,
    kind: WorkerKind,
    address: Address,
    started: AtomicBool,
    stopped: AtomicBool,
    low_on_funds: AtomicBool,
    wake: Notify,
}

impl WorkerHandle {
    pub fn new(id: u64, kind: WorkerKind, address: Address) -> Self {
        Self {
            id,
            kind,
            address,
            started: AtomicBool::new(false),
            stopped: AtomicBool::new(false),
            low_on_funds: AtomicBool::new(false),
            wake: Notify::new(),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn kind(&self) -> WorkerKind {
        self.kind
    }

    pub fn address(&self) -> &Address {
        &self.address
    }

    pub fn state(&self) -> WorkerState {
        if self.is_stopped() {
            WorkerState::Stopped
        } else if !self.started.load(Ordering::Acquire) {
            WorkerState::Starting
        } else if self.is_low_on_funds() {
            WorkerState::LowOnFunds
        } else {
            WorkerState::Running
        }
    }

    /// Request a stop. Terminal; returns `false` if already stopped.
    pub fn stop(&self) -> bool {
        let first = !self.stopped.swap(true, Ordering::AcqRel);
        self.wake.notify_one();
        first
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }

    pub fn is_low_on_funds(&self) -> bool {
        self.low_on_funds.load(Ordering::Acquire)
    }

    /// Enter the low-funds state. Returns `true` only for the transition
    /// itself, so the caller enqueues once per funding cycle.
    pub fn mark_low_on_funds(&self) -> bool {
        self.low_on_funds
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Leave the low-funds state after a confirmed refund.
    pub fn has_been_refunded(&self) {
        self.low_on_funds.store(false, Ordering::Release);
        self.wake.notify_one();
    }

    pub(crate) fn mark_running(&self) {
        self.started.store(true, Ordering::Release);
    }
}

/// Settings every worker reads.
#[derive(Clone, Debug)]
pub struct WorkerSettings {
    pub chain_id: u64,
    pub cosmos_chain_id: String,
    pub denom: String,
    pub fee: Fee,
    pub wait_for_confirmation: bool,
    pub loop_delay: Duration,
    pub low_funds_poll: Duration,
    pub failure_backoff: Duration,
    pub mint_amount: Amount,
    pub transfer_receiver: Address,
    pub raw_receiver: Address,
    pub gas_to_consume: u64,
}

impl WorkerSettings {
    pub fn from_config(config: &HarnessConfig) -> Self {
        Self {
            chain_id: config.chain_id,
            cosmos_chain_id: config.cosmos_chain_id.clone(),
            denom: config.denom.clone(),
            fee: config.fee(),
            wait_for_confirmation: config.wait_for_tx_confirmation,
            loop_delay: Duration::from_millis(config.retry.worker_loop_delay_ms),
            low_funds_poll: Duration::from_millis(config.retry.low_funds_poll_interval_ms),
            failure_backoff: Duration::from_millis(config.retry.failure_backoff_ms),
            mint_amount: config.retry.mint_amount,
            transfer_receiver: config.default_transfer_receiver.clone(),
            raw_receiver: config.default_raw_receiver.clone(),
            gas_to_consume: config.gas_to_consume_per_tx,
        }
    }

    #[cfg(test)]
    pub(crate) fn for_tests() -> Self {
        let mut config = HarnessConfig {
            retry: crate::config::RetryConfig::fast(),
            ..HarnessConfig::default()
        };
        config.fee_amount = Amount::new(10);
        config.fee_gas = 200_000;
        Self::from_config(&config)
    }
}

/// Collaborators shared by all workers.
pub struct WorkerContext {
    pub broadcaster: TxBroadcaster,
    pub metrics: Arc<HarnessMetrics>,
    pub funding: Arc<FundingQueue>,
    pub treasury: TreasuryHandle,
    pub settings: WorkerSettings,
}

/// Local sequence after a failed transaction.
///
/// A ledger-suggested value is adopted as-is. A mismatch without a
/// suggestion, or an outcome whose effect is unknown, drops the local value
/// so the next cycle re-queries the ledger. Rejections that do not consume a
/// sequence leave it alone.
pub fn next_local_sequence(current: Option<u64>, reason: &FailureReason) -> Option<u64> {
    match reason {
        FailureReason::SequenceMismatch {
            expected: Some(expected),
        } => Some(*expected),
        FailureReason::SequenceMismatch { expected: None }
        | FailureReason::TransientBroadcastFailure
        | FailureReason::UnknownFailure => None,
        FailureReason::InsufficientWorkerFunds | FailureReason::InsufficientFee => current,
    }
}

/// The task-owned half of a worker.
pub struct Worker {
    handle: Arc<WorkerHandle>,
    account: Account,
    state: KindState,
    ctx: Arc<WorkerContext>,
    sequence: Option<u64>,
    account_number: Option<u64>,
}

impl Worker {
    pub fn new(
        handle: Arc<WorkerHandle>,
        account: Account,
        state: KindState,
        ctx: Arc<WorkerContext>,
    ) -> Self {
        Self {
            handle,
            account,
            state,
            ctx,
            sequence: None,
            account_number: None,
        }
    }

    pub fn handle(&self) -> &Arc<WorkerHandle> {
        &self.handle
    }

    /// Run until stopped. Never returns an error: every failure is classified,
    /// counted and handled here.
    pub async fn run(mut self) {
        self.handle.mark_running();
        info!(worker = %self.handle.address(), kind = %self.handle.kind(), "worker started");

        while !self.handle.is_stopped() {
            if self.handle.is_low_on_funds() {
                self.pause(self.ctx.settings.low_funds_poll).await;
                continue;
            }
            let span = worker_action_span(self.handle.address().as_str(), self.handle.kind().as_str());
            self.action().instrument(span).await;
            self.pause(self.ctx.settings.loop_delay).await;
        }

        info!(worker = %self.handle.address(), "worker stopped");
    }

    /// Sleep for `duration`, waking early on stop or refund.
    async fn pause(&self, duration: Duration) {
        tokio::select! {
            _ = tokio::time::sleep(duration) => {}
            _ = self.handle.wake.notified() => {}
        }
    }

    /// One build/sign/broadcast/classify cycle.
    async fn action(&mut self) {
        if let Err(e) = self.prepare().await {
            warn!(error = %e, "worker preparation failed");
            self.pause(self.ctx.settings.failure_backoff).await;
            return;
        }

        let (sequence, account_number) = match self.current_sequence().await {
            Ok(pair) => pair,
            Err(e) => {
                warn!(error = %e, "sequence query failed");
                self.pause(self.ctx.settings.failure_backoff).await;
                return;
            }
        };

        let settings = &self.ctx.settings;
        let messages = self
            .state
            .create_messages(&self.account.address, sequence, &settings.denom);
        let fee = self.state.fee(settings);
        let body = TxBody {
            chain_id: settings.chain_id,
            cosmos_chain_id: settings.cosmos_chain_id.clone(),
            signer: self.account.address.clone(),
            account_number,
            sequence,
            fee: fee.clone(),
            memo: String::new(),
            messages,
        };
        let tx = match txbot_crypto::sign_tx(body, &self.account.keys) {
            Ok(tx) => tx,
            Err(e) => {
                error!(error = %e, "signing failed");
                self.pause(self.ctx.settings.failure_backoff).await;
                return;
            }
        };

        if self.handle.is_stopped() {
            return;
        }

        match self.ctx.broadcaster.broadcast_with_retry(&tx).await {
            BroadcastOutcome::Response(resp) if resp.is_success() => {
                self.on_success(sequence, &fee, resp).await
            }
            BroadcastOutcome::Response(resp) => {
                let reason = FailureReason::classify(resp.code, &resp.raw_log);
                self.on_failed_tx(reason, &resp.raw_log).await;
            }
            BroadcastOutcome::NoResponse { code, message } => {
                let reason = FailureReason::classify_unanswered(&message);
                let message = match code {
                    Some(code) => format!("UNKNOWN (code {code}): {message}"),
                    None => format!("UNKNOWN: {message}"),
                };
                self.on_failed_tx(reason, &message).await;
            }
        }
    }

    /// Convert workers need minted tokens before their first conversion.
    async fn prepare(&mut self) -> Result<(), crate::OrchestratorError> {
        if let KindState::Convert { token, minted, .. } = &mut self.state {
            if !*minted {
                self.ctx
                    .treasury
                    .mint(token, &self.account.address, self.ctx.settings.mint_amount)
                    .await?;
                *minted = true;
                info!(amount = %self.ctx.settings.mint_amount, "source tokens minted");
            }
        }
        Ok(())
    }

    async fn current_sequence(&mut self) -> Result<(u64, u64), txbot_client::ClientError> {
        if let (Some(sequence), Some(number)) = (self.sequence, self.account_number) {
            return Ok((sequence, number));
        }
        let info = self
            .ctx
            .broadcaster
            .client()
            .get_sequence(&self.account.address)
            .await?;
        debug!(sequence = info.sequence, "sequence synced from ledger");
        self.account_number = Some(info.account_number);
        self.sequence = Some(info.sequence);
        Ok((info.sequence, info.account_number))
    }

    async fn on_success(&mut self, sequence: u64, fee: &Fee, resp: TxResponse) {
        // Included or not, the ledger has consumed this sequence.
        self.sequence = Some(sequence + 1);
        debug!(hash = %resp.hash, sequence, "tx accepted");

        let resp = if self.ctx.settings.wait_for_confirmation {
            match self.ctx.broadcaster.wait_for_inclusion(&resp.hash).await {
                Ok(included) if included.is_success() => {
                    debug!(hash = %included.hash, height = included.height, "tx included");
                    included
                }
                Ok(included) => {
                    let reason = FailureReason::classify(included.code, &included.raw_log);
                    let log = format!("failed in block {}: {}", included.height, included.raw_log);
                    self.on_failed_tx(reason, &log).await;
                    self.sequence = Some(sequence + 1);
                    return;
                }
                Err(e) => {
                    warn!(hash = %resp.hash, error = %e, "tx confirmation timed out");
                    resp
                }
            }
        } else {
            resp
        };

        let paid = self.state.paid_fee(fee, resp.gas_used);
        self.ctx
            .metrics
            .record_success(self.handle.address().as_str(), paid.raw() as f64);
    }

    async fn on_failed_tx(&mut self, reason: FailureReason, log: &str) {
        let worker = self.handle.address().as_str();
        self.ctx.metrics.record_failure(worker, reason.label());
        warn!(%reason, sequence = ?self.sequence, raw_log = %log, "tx failed");

        self.sequence = next_local_sequence(self.sequence, &reason);

        match reason {
            FailureReason::InsufficientWorkerFunds => {
                if self.handle.mark_low_on_funds() {
                    info!("worker out of funds, queued for refund");
                    if self.ctx.funding.push(Arc::clone(&self.handle)) {
                        self.ctx
                            .metrics
                            .funding_queue_depth
                            .set(self.ctx.funding.depth() as i64);
                    }
                }
                return;
            }
            FailureReason::InsufficientFee => self.escalate_gas_price().await,
            _ => {}
        }

        self.pause(self.ctx.settings.failure_backoff).await;
    }

    async fn escalate_gas_price(&mut self) {
        let KindState::RawSend { gas_price, .. } = &mut self.state else {
            return;
        };
        let ledger_price = match self.ctx.broadcaster.client().gas_price().await {
            Ok(price) => price,
            Err(e) => {
                debug!(error = %e, "gas price query failed");
                Amount::ZERO
            }
        };
        let next = kinds::escalate_gas_price(*gas_price, ledger_price);
        info!(from = %gas_price, to = %next, "raising gas price");
        *gas_price = next;
    }
}
