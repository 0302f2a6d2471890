//! RPC request handlers.

use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::Json;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

use txbot_orchestrator::{Orchestrator, WorkerInfo, WorkerParams};
use txbot_types::WorkerKind;

use crate::error::RpcError;

// ── Add / delete ─────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct AddWorkerRequest {
    /// Worker kind; defaults to `transfer` when absent.
    #[serde(default)]
    pub worker: Option<String>,
    #[serde(default)]
    pub params: WorkerParams,
}

#[derive(Debug, Serialize)]
pub struct AddWorkerResponse {
    pub accepted: bool,
    pub worker: WorkerKind,
}

#[derive(Debug, Deserialize)]
pub struct DeleteWorkerRequest {
    #[serde(default)]
    pub worker: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct DeleteWorkerResponse {
    pub worker: WorkerKind,
    pub stopped: bool,
}

// ── Listing ──────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct WorkersResponse {
    pub workers: Vec<WorkerInfo>,
}

fn parse_kind(raw: Option<&str>) -> Result<WorkerKind, RpcError> {
    match raw {
        None => Ok(WorkerKind::Transfer),
        Some(name) => name
            .parse()
            .map_err(|e: txbot_types::BotError| RpcError::InvalidRequest(e.to_string())),
    }
}

fn ensure_running(orchestrator: &Orchestrator) -> Result<(), RpcError> {
    if orchestrator.is_stopped() {
        return Err(RpcError::Unavailable("orchestrator is stopped".into()));
    }
    Ok(())
}

/// Accept the request and create the worker in the background; funding and
/// contract deployment may take several blocks.
pub async fn add_worker(
    State(orchestrator): State<Arc<Orchestrator>>,
    Json(request): Json<AddWorkerRequest>,
) -> Result<(StatusCode, Json<AddWorkerResponse>), RpcError> {
    ensure_running(&orchestrator)?;
    let kind = parse_kind(request.worker.as_deref())?;

    let params = request.params;
    tokio::spawn(async move {
        match orchestrator.add_worker(kind, params).await {
            Ok(Some(address)) => info!(worker = %address, %kind, "worker added"),
            Ok(None) => info!(%kind, "worker request ignored: cannot be constructed"),
            Err(e) => warn!(%kind, error = %e, "adding worker failed"),
        }
    });

    Ok((
        StatusCode::ACCEPTED,
        Json(AddWorkerResponse {
            accepted: true,
            worker: kind,
        }),
    ))
}

pub async fn delete_worker(
    State(orchestrator): State<Arc<Orchestrator>>,
    Json(request): Json<DeleteWorkerRequest>,
) -> Result<Json<DeleteWorkerResponse>, RpcError> {
    ensure_running(&orchestrator)?;
    let kind = parse_kind(request.worker.as_deref())?;
    let stopped = orchestrator.kill_worker(kind);
    if !stopped {
        info!(%kind, "no running worker of this kind");
    }
    Ok(Json(DeleteWorkerResponse {
        worker: kind,
        stopped,
    }))
}

pub async fn list_workers(State(orchestrator): State<Arc<Orchestrator>>) -> Json<WorkersResponse> {
    Json(WorkersResponse {
        workers: orchestrator.workers(),
    })
}

pub async fn metrics(State(orchestrator): State<Arc<Orchestrator>>) -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        orchestrator.metrics().encode_text(),
    )
}
