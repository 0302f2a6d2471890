//! End-to-end orchestrator runs against the in-memory ledger.

use std::sync::Arc;
use std::time::{Duration, Instant};

use txbot_nullables::NullLedger;
use txbot_orchestrator::{
    ContractArtifact, ContractArtifacts, HarnessConfig, Orchestrator, OrchestratorError,
    RetryConfig, WorkerParams, WorkerState,
};
use txbot_types::{Address, Amount, WorkerKind};

fn config(kinds: Vec<WorkerKind>, workers: usize) -> HarnessConfig {
    HarnessConfig {
        treasury_private_key: Some(format!("0x{}", "11".repeat(32))),
        number_of_workers: workers,
        worker_kinds: kinds,
        funds_per_account: Amount::new(1_000_000_000),
        treasury_min_funds: Amount::new(10),
        fee_amount: Amount::new(10),
        fee_gas: 200_000,
        retry: RetryConfig {
            broadcast_retries: 2,
            funding_retries: 3,
            deploy_retries: 3,
            confirmation_attempts: 5,
            ..RetryConfig::fast()
        },
        ..HarnessConfig::default()
    }
}

fn artifacts() -> ContractArtifacts {
    ContractArtifacts {
        gas_consumer: Some(ContractArtifact::new("GasConsumer", "0x6080")),
        token: Some(ContractArtifact::new("ERC20MinterBurnerDecimals", "0x6080")),
    }
}

async fn eventually(what: &str, mut condition: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(10);
    while !condition() {
        assert!(Instant::now() < deadline, "timed out waiting for {what}");
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

fn start(
    config: HarnessConfig,
    artifacts: ContractArtifacts,
    treasury_funds: u128,
) -> (Arc<NullLedger>, Arc<Orchestrator>) {
    let ledger = Arc::new(NullLedger::new());
    let orchestrator = Orchestrator::new(config, ledger.clone(), artifacts).unwrap();
    ledger.fund(orchestrator.treasury_address(), Amount::new(treasury_funds));
    (ledger, orchestrator)
}

#[tokio::test]
async fn underfunded_treasury_aborts_initialization() {
    let mut cfg = config(WorkerKind::ALL.to_vec(), 5);
    cfg.treasury_min_funds = Amount::new(10);
    let (ledger, orchestrator) = start(cfg, artifacts(), 5);

    let err = orchestrator.initialize().await.unwrap_err();
    assert!(matches!(
        err,
        OrchestratorError::InsufficientTreasuryFunds { balance, threshold }
            if balance == Amount::new(5) && threshold == Amount::new(10)
    ));
    assert!(ledger.contracts().is_empty());
    assert!(orchestrator.workers().is_empty());
    assert!(!orchestrator.is_initialized());
    orchestrator.stop().await.unwrap();
}

#[tokio::test]
async fn delegate_without_validators_is_a_silent_no_op() {
    let (ledger, orchestrator) = start(config(vec![WorkerKind::Delegate], 0), artifacts(), 10u128.pow(15));
    let before = ledger.balance_of(orchestrator.treasury_address());

    let added = orchestrator
        .add_worker(WorkerKind::Delegate, WorkerParams::new())
        .await
        .unwrap();

    assert!(added.is_none());
    assert!(orchestrator.workers().is_empty());
    assert_eq!(ledger.balance_of(orchestrator.treasury_address()), before);
    assert_eq!(ledger.calls("broadcast"), 0);
    orchestrator.stop().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn every_kind_makes_progress() {
    let (ledger, orchestrator) = start(config(WorkerKind::ALL.to_vec(), 5), artifacts(), 10u128.pow(18));
    ledger.set_validators(vec!["evmosvaloper1abc".into()]);

    orchestrator.initialize().await.unwrap();

    let workers = orchestrator.workers();
    let kinds: Vec<WorkerKind> = workers.iter().map(|w| w.kind).collect();
    assert_eq!(kinds, WorkerKind::ALL.to_vec());
    assert_eq!(ledger.contracts().len(), 2);

    let metrics = orchestrator.metrics().clone();
    eventually("a success from every worker", || {
        workers
            .iter()
            .all(|w| metrics.successes(w.address.as_str()) > 0)
    })
    .await;
    assert!(ledger.gas_consumed() > 0);
    assert!(ledger.delegated_to("evmosvaloper1abc") > Amount::ZERO);

    orchestrator.stop().await.unwrap();
    assert!(orchestrator.workers().is_empty());
    assert_eq!(metrics.active_workers.get(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn drained_worker_is_refunded_and_resumes() {
    let mut cfg = config(vec![WorkerKind::Transfer], 1);
    // Four transfers (fee 10, amounts 1..4) exhaust 50.
    cfg.funds_per_account = Amount::new(50);
    let (_ledger, orchestrator) = start(cfg, ContractArtifacts::default(), 10u128.pow(15));

    orchestrator.initialize().await.unwrap();
    let address = orchestrator.workers()[0].address.clone();
    let metrics = orchestrator.metrics().clone();
    let queue = orchestrator.funding_queue().clone();

    eventually("the worker to run dry", || {
        assert!(queue.depth() <= 1);
        metrics.failures(address.as_str(), "InsufficientWorkerFunds") > 0
    })
    .await;
    eventually("a refund and more successes", || {
        metrics.funding.with_label_values(&["ok"]).get() >= 2 && metrics.successes(address.as_str()) > 4
    })
    .await;

    orchestrator.stop().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn kill_stops_only_the_first_matching_worker() {
    let (ledger, orchestrator) = start(config(vec![WorkerKind::Transfer], 2), ContractArtifacts::default(), 10u128.pow(15));
    orchestrator.initialize().await.unwrap();

    let before = orchestrator.workers();
    assert_eq!(before.len(), 2);
    let (first, second) = (before[0].address.clone(), before[1].address.clone());

    assert!(orchestrator.kill_worker(WorkerKind::Transfer));
    let after = orchestrator.workers();
    assert_eq!(after.len(), 1);
    assert_eq!(after[0].address, second);
    assert_ne!(after[0].state, WorkerState::Stopped);

    // The killed worker's sequence settles; the survivor keeps going.
    tokio::time::sleep(Duration::from_millis(50)).await;
    let frozen = ledger.sequence_of(&first);
    let running = ledger.sequence_of(&second);
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(ledger.sequence_of(&first), frozen);
    assert!(ledger.sequence_of(&second) > running);

    assert!(!orchestrator.kill_worker(WorkerKind::RawSend));
    assert!(orchestrator.kill_worker(WorkerKind::Transfer));
    assert!(!orchestrator.kill_worker(WorkerKind::Transfer));
    orchestrator.stop().await.unwrap();
}

#[tokio::test]
async fn admission_holds_under_concurrent_funding() {
    let mut cfg = config(vec![WorkerKind::Transfer], 0);
    cfg.funds_per_account = Amount::new(1_000);
    cfg.treasury_min_funds = Amount::new(2_000);
    // Each funding costs 1010. Balances seen: 4525, 3515, 2505, then 1495 < 2000.
    let (ledger, orchestrator) = start(cfg, ContractArtifacts::default(), 4_525);

    let tasks: Vec<_> = (0..8)
        .map(|_| {
            let orchestrator = Arc::clone(&orchestrator);
            tokio::spawn(async move {
                orchestrator
                    .add_worker(WorkerKind::Transfer, WorkerParams::new())
                    .await
            })
        })
        .collect();

    let mut added = 0;
    let mut refused = 0;
    for task in tasks {
        match task.await.unwrap() {
            Ok(Some(_)) => added += 1,
            Err(OrchestratorError::InsufficientTreasuryFunds { .. }) => refused += 1,
            other => panic!("unexpected result {other:?}"),
        }
    }
    assert_eq!(added, 3);
    assert_eq!(refused, 5);
    assert_eq!(ledger.balance_of(orchestrator.treasury_address()), Amount::new(1_495));
    orchestrator.stop().await.unwrap();
}

#[tokio::test]
async fn contract_kinds_without_artifacts_are_refused() {
    let (ledger, orchestrator) = start(config(vec![WorkerKind::Transfer], 0), ContractArtifacts::default(), 10u128.pow(15));
    let err = orchestrator
        .add_worker(WorkerKind::GasConsume, WorkerParams::new())
        .await
        .unwrap_err();
    assert!(matches!(err, OrchestratorError::ContractMissing(_)));
    assert_eq!(ledger.calls("broadcast"), 0);
    orchestrator.stop().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn added_gas_consumer_deploys_its_contract_lazily() {
    let (ledger, orchestrator) = start(config(vec![WorkerKind::Transfer], 0), artifacts(), 10u128.pow(15));
    orchestrator.initialize().await.unwrap();
    assert!(ledger.contracts().is_empty());

    let mut params = WorkerParams::new();
    params.insert("gas".into(), serde_json::json!(777));
    let address = orchestrator
        .add_worker(WorkerKind::GasConsume, params)
        .await
        .unwrap()
        .expect("gas consumer should be constructible");
    assert_eq!(ledger.contracts(), vec!["GasConsumer".to_string()]);

    let metrics = orchestrator.metrics().clone();
    eventually("gas consumption", || metrics.successes(address.as_str()) > 0).await;
    assert_eq!(ledger.gas_consumed() % 777, 0);
    orchestrator.stop().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn confirmation_waiting_still_progresses() {
    let mut cfg = config(vec![WorkerKind::Transfer], 1);
    cfg.wait_for_tx_confirmation = true;
    let receiver = Address::from_bytes([0x42; 20]);
    cfg.default_transfer_receiver = receiver.clone();
    let (ledger, orchestrator) = start(cfg, ContractArtifacts::default(), 10u128.pow(15));
    orchestrator.initialize().await.unwrap();

    eventually("transfers to land", || ledger.balance_of(&receiver) >= Amount::new(6)).await;
    orchestrator.stop().await.unwrap();
}

#[tokio::test]
async fn stop_is_idempotent_and_blocks_new_workers() {
    let (_ledger, orchestrator) = start(config(vec![WorkerKind::Transfer], 0), ContractArtifacts::default(), 10u128.pow(15));
    orchestrator.stop().await.unwrap();
    orchestrator.stop().await.unwrap();
    assert!(matches!(
        orchestrator
            .add_worker(WorkerKind::Transfer, WorkerParams::new())
            .await,
        Err(OrchestratorError::Stopped)
    ));
    assert!(matches!(orchestrator.initialize().await, Err(OrchestratorError::Stopped)));
}

#[tokio::test]
async fn second_initialize_is_refused() {
    let (_ledger, orchestrator) = start(config(vec![WorkerKind::Transfer], 2), artifacts(), 10u128.pow(15));
    orchestrator.initialize().await.unwrap();

    let err = orchestrator.initialize().await.unwrap_err();
    assert!(matches!(err, OrchestratorError::AlreadyInitialized));
    assert_eq!(orchestrator.workers().len(), 2);
    orchestrator.stop().await.unwrap();
}

#[tokio::test]
async fn failed_initialize_can_be_retried() {
    let (ledger, orchestrator) = start(config(vec![WorkerKind::Transfer], 1), artifacts(), 5);
    assert!(orchestrator.initialize().await.is_err());

    ledger.fund(orchestrator.treasury_address(), Amount::new(10u128.pow(15)));
    orchestrator.initialize().await.unwrap();
    assert!(orchestrator.is_initialized());
    assert_eq!(orchestrator.workers().len(), 1);
    orchestrator.stop().await.unwrap();
}
