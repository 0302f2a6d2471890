//! The orchestrator: bootstrap, worker registry, refund loop.

use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{info, warn, Instrument};

use txbot_client::{LedgerClient, TxBroadcaster};
use txbot_types::{Account, Address, Amount, WorkerKind};

use crate::config::HarnessConfig;
use crate::contracts::{ContractArtifacts, ContractKind, ContractRegistry};
use crate::funding::FundingQueue;
use crate::metrics::HarnessMetrics;
use crate::shutdown::ShutdownController;
use crate::tracing_spans::funding_span;
use crate::treasury::{check_treasury_balance, FundingPolicy, Treasury, TreasuryHandle, TreasurySettings};
use crate::worker::{KindState, Worker, WorkerContext, WorkerHandle, WorkerParams, WorkerSettings, WorkerState};
use crate::OrchestratorError;

/// Maximum time to wait for worker and background tasks on stop.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// Kind of the `index`-th initial worker: `kinds[index mod kinds.len()]`.
pub fn kind_for_index(kinds: &[WorkerKind], index: usize) -> Option<WorkerKind> {
    if kinds.is_empty() {
        None
    } else {
        Some(kinds[index % kinds.len()])
    }
}

/// The contract a worker kind depends on, if any.
fn contract_for(kind: WorkerKind) -> Option<ContractKind> {
    match kind {
        WorkerKind::GasConsume => Some(ContractKind::GasConsumer),
        WorkerKind::Convert => Some(ContractKind::Token),
        _ => None,
    }
}

/// Snapshot of one registered worker.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct WorkerInfo {
    pub address: Address,
    pub kind: WorkerKind,
    pub state: WorkerState,
}

struct WorkerEntry {
    handle: Arc<WorkerHandle>,
    task: JoinHandle<()>,
}

pub struct Orchestrator {
    config: HarnessConfig,
    client: Arc<dyn LedgerClient>,
    artifacts: ContractArtifacts,
    treasury: TreasuryHandle,
    metrics: Arc<HarnessMetrics>,
    funding: Arc<FundingQueue>,
    contracts: ContractRegistry,
    validators: OnceLock<Vec<String>>,
    worker_ctx: Arc<WorkerContext>,
    workers: Mutex<Vec<WorkerEntry>>,
    /// Tasks of killed workers, joined on stop.
    retired: Mutex<Vec<JoinHandle<()>>>,
    /// Treasury actor and refund loop.
    background: Mutex<Vec<JoinHandle<()>>>,
    deploy_lock: tokio::sync::Mutex<()>,
    next_worker_id: AtomicU64,
    initializing: AtomicBool,
    initialized: AtomicBool,
    stopped: AtomicBool,
    shutdown: ShutdownController,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl Orchestrator {
    /// Validate the configuration and start the treasury actor. Must be
    /// called from within a tokio runtime.
    pub fn new(
        config: HarnessConfig,
        client: Arc<dyn LedgerClient>,
        artifacts: ContractArtifacts,
    ) -> Result<Arc<Self>, OrchestratorError> {
        config.validate()?;
        let keys = txbot_crypto::keypair_from_private(config.treasury_key()?);
        let account = Account {
            address: txbot_crypto::derive_address(&keys.public),
            keys,
        };
        info!(treasury = %account.address, "treasury account loaded");

        let metrics = Arc::new(HarnessMetrics::new());
        let broadcaster = TxBroadcaster::new(Arc::clone(&client), config.broadcast_policy());
        let shutdown = ShutdownController::new();
        let (treasury, treasury_task) = Treasury::new(
            account,
            broadcaster.clone(),
            TreasurySettings::from_config(&config),
            Arc::clone(&metrics),
        )
        .spawn(shutdown.subscribe());

        let funding = Arc::new(FundingQueue::new());
        let worker_ctx = Arc::new(WorkerContext {
            broadcaster,
            metrics: Arc::clone(&metrics),
            funding: Arc::clone(&funding),
            treasury: treasury.clone(),
            settings: WorkerSettings::from_config(&config),
        });

        Ok(Arc::new(Self {
            config,
            client,
            artifacts,
            treasury,
            metrics,
            funding,
            contracts: ContractRegistry::new(),
            validators: OnceLock::new(),
            worker_ctx,
            workers: Mutex::new(Vec::new()),
            retired: Mutex::new(Vec::new()),
            background: Mutex::new(vec![treasury_task]),
            deploy_lock: tokio::sync::Mutex::new(()),
            next_worker_id: AtomicU64::new(0),
            initializing: AtomicBool::new(false),
            initialized: AtomicBool::new(false),
            stopped: AtomicBool::new(false),
            shutdown,
        }))
    }

    pub fn treasury_address(&self) -> &Address {
        self.treasury.address()
    }

    pub fn metrics(&self) -> &Arc<HarnessMetrics> {
        &self.metrics
    }

    pub fn config(&self) -> &HarnessConfig {
        &self.config
    }

    pub fn contracts(&self) -> &ContractRegistry {
        &self.contracts
    }

    pub fn funding_queue(&self) -> &Arc<FundingQueue> {
        &self.funding
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::Acquire)
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }

    /// Bootstrap: validators, admission check, contracts, initial workers,
    /// refund loop. Any error is fatal to the run.
    ///
    /// Runs at most once; a failed run may be retried.
    pub async fn initialize(&self) -> Result<(), OrchestratorError> {
        if self.is_stopped() {
            return Err(OrchestratorError::Stopped);
        }
        if self
            .initializing
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(OrchestratorError::AlreadyInitialized);
        }
        let result = self.bootstrap().await;
        if result.is_err() {
            self.initializing.store(false, Ordering::Release);
        }
        result
    }

    async fn bootstrap(&self) -> Result<(), OrchestratorError> {

        let validators = match self.client.get_validators().await {
            Ok(validators) => validators,
            Err(e) => {
                warn!(error = %e, "validator discovery failed, delegate workers need an explicit validator");
                Vec::new()
            }
        };
        info!(count = validators.len(), "validator set loaded");
        let _ = self.validators.set(validators);

        check_treasury_balance(
            self.client.as_ref(),
            self.treasury.address(),
            self.config.treasury_min_funds,
        )
        .await?;

        for kind in [ContractKind::GasConsumer, ContractKind::Token] {
            if self
                .config
                .worker_kinds
                .iter()
                .any(|k| contract_for(*k) == Some(kind))
            {
                self.ensure_contract(kind).await?;
            }
        }

        let params = WorkerParams::new();
        let mut created = Vec::with_capacity(self.config.number_of_workers);
        for index in 0..self.config.number_of_workers {
            let Some(kind) = kind_for_index(&self.config.worker_kinds, index) else {
                break;
            };
            match self.create_worker(kind, &params).await? {
                Some(worker) => created.push(worker),
                None => info!(index, %kind, "initial worker skipped: cannot be constructed"),
            }
        }

        let count = created.len();
        for worker in created {
            self.start_worker(worker)?;
        }

        let task = tokio::spawn(refund_loop(
            Arc::clone(&self.funding),
            self.treasury.clone(),
            Arc::clone(&self.metrics),
            self.config.funds_per_account,
            Duration::from_millis(self.config.retry.refund_poll_interval_ms),
            self.shutdown.subscribe(),
        ));
        lock(&self.background).push(task);

        self.initialized.store(true, Ordering::Release);
        info!(workers = count, "orchestrator initialized");
        Ok(())
    }

    /// Create, fund and start one worker.
    ///
    /// `Ok(None)` when the worker cannot be constructed (no validator for a
    /// delegate worker, malformed params); nothing is funded in that case.
    pub async fn add_worker(
        &self,
        kind: WorkerKind,
        params: WorkerParams,
    ) -> Result<Option<Address>, OrchestratorError> {
        if self.is_stopped() {
            return Err(OrchestratorError::Stopped);
        }
        let Some(worker) = self.create_worker(kind, &params).await? else {
            info!(%kind, "worker not added: cannot be constructed");
            return Ok(None);
        };
        self.start_worker(worker).map(Some)
    }

    /// Stop the first live worker of `kind`. Returns whether one was found.
    pub fn kill_worker(&self, kind: WorkerKind) -> bool {
        let entry = {
            let mut workers = lock(&self.workers);
            let Some(pos) = workers
                .iter()
                .position(|e| e.handle.kind() == kind && !e.handle.is_stopped())
            else {
                return false;
            };
            workers.remove(pos)
        };
        entry.handle.stop();
        self.metrics.active_workers.dec();
        info!(worker = %entry.handle.address(), %kind, "worker killed");
        let mut retired = lock(&self.retired);
        retired.retain(|task| !task.is_finished());
        retired.push(entry.task);
        true
    }

    pub fn workers(&self) -> Vec<WorkerInfo> {
        lock(&self.workers)
            .iter()
            .map(|e| WorkerInfo {
                address: e.handle.address().clone(),
                kind: e.handle.kind(),
                state: e.handle.state(),
            })
            .collect()
    }

    /// Stop every worker, the refund loop and the treasury actor, then join
    /// them. In-flight broadcasts are allowed to finish.
    pub async fn stop(&self) -> Result<(), OrchestratorError> {
        if self.stopped.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        info!("orchestrator stopping");
        self.shutdown.shutdown();

        let entries = std::mem::take(&mut *lock(&self.workers));
        let mut handles = Vec::with_capacity(entries.len());
        for entry in entries {
            entry.handle.stop();
            handles.push(entry.task);
        }
        handles.append(&mut *lock(&self.retired));
        handles.append(&mut *lock(&self.background));
        self.metrics.active_workers.set(0);

        let joined = tokio::time::timeout(SHUTDOWN_TIMEOUT, async {
            for handle in handles {
                let _ = handle.await;
            }
        })
        .await;

        match joined {
            Ok(()) => {
                info!("orchestrator stopped");
                Ok(())
            }
            Err(_) => {
                warn!("timed out waiting for tasks to finish");
                Err(OrchestratorError::ShutdownTimeout)
            }
        }
    }

    /// Deploy `kind` unless it already is. Serialized so two concurrent
    /// callers never deploy the same contract twice.
    async fn ensure_contract(&self, kind: ContractKind) -> Result<Address, OrchestratorError> {
        let _guard = self.deploy_lock.lock().await;
        if let Some(address) = self.contracts.get(kind) {
            return Ok(address);
        }
        let artifact = self
            .artifacts
            .get(kind)
            .cloned()
            .ok_or_else(|| OrchestratorError::ContractMissing(kind.name().to_string()))?;
        let address = self.treasury.deploy(artifact, kind.deploy_args()).await?;
        self.contracts.set(kind, address.clone());
        Ok(address)
    }

    async fn create_worker(
        &self,
        kind: WorkerKind,
        params: &WorkerParams,
    ) -> Result<Option<Worker>, OrchestratorError> {
        if let Some(contract) = contract_for(kind) {
            self.ensure_contract(contract).await?;
        }
        let validators = self.validators.get().map(Vec::as_slice).unwrap_or(&[]);
        let Some(state) = KindState::build(
            kind,
            params,
            &self.worker_ctx.settings,
            validators,
            &self.contracts,
        )?
        else {
            return Ok(None);
        };

        let account = txbot_crypto::generate_account()?;
        self.treasury
            .fund(
                &account.address,
                self.config.funds_per_account,
                FundingPolicy::FailFast,
            )
            .instrument(funding_span(account.address.as_str(), "new-worker"))
            .await?;

        let id = self.next_worker_id.fetch_add(1, Ordering::Relaxed);
        let handle = Arc::new(WorkerHandle::new(id, kind, account.address.clone()));
        info!(worker = %account.address, %kind, "worker created");
        Ok(Some(Worker::new(
            handle,
            account,
            state,
            Arc::clone(&self.worker_ctx),
        )))
    }

    /// Spawn the worker's loop and register it. Checked under the registry
    /// lock so a concurrent `stop` either sees the worker or prevents it.
    fn start_worker(&self, worker: Worker) -> Result<Address, OrchestratorError> {
        let handle = Arc::clone(worker.handle());
        let address = handle.address().clone();
        let mut workers = lock(&self.workers);
        if self.is_stopped() {
            handle.stop();
            return Err(OrchestratorError::Stopped);
        }
        let task = tokio::spawn(worker.run());
        workers.push(WorkerEntry { handle, task });
        self.metrics.active_workers.inc();
        Ok(address)
    }
}

/// Drain the funding queue one worker at a time.
async fn refund_loop(
    funding: Arc<FundingQueue>,
    treasury: TreasuryHandle,
    metrics: Arc<HarnessMetrics>,
    amount: Amount,
    poll: Duration,
    mut shutdown_rx: broadcast::Receiver<()>,
) {
    info!("refund loop started");
    loop {
        let Some(worker) = funding.pop() else {
            tokio::select! {
                biased;
                _ = shutdown_rx.recv() => break,
                _ = funding.notified() => {}
                _ = tokio::time::sleep(poll) => {}
            }
            continue;
        };

        if worker.is_stopped() {
            funding.complete(worker.id());
            metrics.funding_queue_depth.set(funding.depth() as i64);
            continue;
        }

        let result = treasury
            .fund(worker.address(), amount, FundingPolicy::Persistent)
            .instrument(funding_span(worker.address().as_str(), "low-on-funds"))
            .await;

        match result {
            Ok(hash) => {
                funding.complete(worker.id());
                worker.has_been_refunded();
                info!(worker = %worker.address(), %hash, "worker refunded");
            }
            Err(e) => {
                warn!(worker = %worker.address(), error = %e, "refund failed, worker stays queued");
                funding.requeue(worker);
                metrics.funding_queue_depth.set(funding.depth() as i64);
                tokio::select! {
                    biased;
                    _ = shutdown_rx.recv() => break,
                    _ = tokio::time::sleep(poll) => {}
                }
                continue;
            }
        }
        metrics.funding_queue_depth.set(funding.depth() as i64);
    }
    info!("refund loop stopped");
}
