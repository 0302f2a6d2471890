use axum::body::{self, Body};
use axum::http::{Request, StatusCode};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tower::ServiceExt;

use txbot_nullables::NullLedger;
use txbot_orchestrator::{ContractArtifacts, HarnessConfig, Orchestrator, RetryConfig};
use txbot_rpc::router;
use txbot_types::{Amount, WorkerKind};

fn orchestrator() -> Arc<Orchestrator> {
    let config = HarnessConfig {
        treasury_private_key: Some("22".repeat(32)),
        number_of_workers: 0,
        worker_kinds: vec![WorkerKind::Transfer],
        funds_per_account: Amount::new(1_000_000),
        treasury_min_funds: Amount::new(10),
        fee_amount: Amount::new(10),
        retry: RetryConfig::fast(),
        ..HarnessConfig::default()
    };
    let ledger = Arc::new(NullLedger::new());
    let orchestrator = Orchestrator::new(config, ledger.clone(), ContractArtifacts::default()).unwrap();
    ledger.fund(orchestrator.treasury_address(), Amount::new(10u128.pow(15)));
    orchestrator
}

fn post(uri: &str, payload: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(payload.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

async fn json_body(resp: axum::response::Response) -> Value {
    let bytes = body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

async fn wait_for_workers(orchestrator: &Orchestrator, n: usize) {
    let deadline = Instant::now() + Duration::from_secs(10);
    while orchestrator.workers().len() < n {
        assert!(Instant::now() < deadline, "worker was never added");
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

#[tokio::test]
async fn add_defaults_to_transfer_and_returns_immediately() {
    let orchestrator = orchestrator();
    let app = router(orchestrator.clone());

    let resp = app.clone().oneshot(post("/add_worker", json!({}))).await.unwrap();
    assert_eq!(resp.status(), StatusCode::ACCEPTED);
    let body = json_body(resp).await;
    assert_eq!(body["worker"], "transfer");
    assert_eq!(body["accepted"], true);

    wait_for_workers(&orchestrator, 1).await;
    let resp = app.oneshot(get("/workers")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body = json_body(resp).await;
    assert_eq!(body["workers"][0]["kind"], "transfer");
    orchestrator.stop().await.unwrap();
}

#[tokio::test]
async fn add_accepts_legacy_aliases() {
    let orchestrator = orchestrator();
    let resp = router(orchestrator.clone())
        .oneshot(post("/add_worker", json!({ "worker": "ethSender", "params": {} })))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::ACCEPTED);
    assert_eq!(json_body(resp).await["worker"], "raw-send");
    orchestrator.stop().await.unwrap();
}

#[tokio::test]
async fn unknown_kind_is_a_bad_request() {
    let orchestrator = orchestrator();
    let resp = router(orchestrator.clone())
        .oneshot(post("/add_worker", json!({ "worker": "teleport" })))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert!(json_body(resp).await["error"]
        .as_str()
        .unwrap()
        .contains("teleport"));
    assert!(orchestrator.workers().is_empty());
    orchestrator.stop().await.unwrap();
}

#[tokio::test]
async fn delete_stops_one_worker() {
    let orchestrator = orchestrator();
    let app = router(orchestrator.clone());
    for _ in 0..2 {
        orchestrator
            .add_worker(WorkerKind::Transfer, Default::default())
            .await
            .unwrap();
    }

    let resp = app
        .clone()
        .oneshot(post("/delete_worker", json!({ "worker": "transfer" })))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(json_body(resp).await["stopped"], true);
    assert_eq!(orchestrator.workers().len(), 1);

    let resp = app
        .oneshot(post("/delete_worker", json!({ "worker": "delegate" })))
        .await
        .unwrap();
    assert_eq!(json_body(resp).await["stopped"], false);
    orchestrator.stop().await.unwrap();
}

#[tokio::test]
async fn metrics_are_exposed_as_text() {
    let orchestrator = orchestrator();
    orchestrator
        .add_worker(WorkerKind::Transfer, Default::default())
        .await
        .unwrap();
    let resp = router(orchestrator.clone()).oneshot(get("/metrics")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let bytes = body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    let text = String::from_utf8(bytes.to_vec()).unwrap();
    assert!(text.contains("txbot_active_workers 1"));
    assert!(text.contains("txbot_funding_total"));
    orchestrator.stop().await.unwrap();
}

#[tokio::test]
async fn stopped_orchestrator_refuses_requests() {
    let orchestrator = orchestrator();
    orchestrator.stop().await.unwrap();
    let resp = router(orchestrator)
        .oneshot(post("/add_worker", json!({ "worker": "transfer" })))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
}
