//! Axum-based control server.

use axum::routing::{get, post};
use axum::Router;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::info;

use txbot_orchestrator::Orchestrator;

use crate::error::RpcError;
use crate::handlers;

/// All control routes over a shared orchestrator.
pub fn router(orchestrator: Arc<Orchestrator>) -> Router {
    Router::new()
        .route("/add_worker", post(handlers::add_worker))
        .route("/delete_worker", post(handlers::delete_worker))
        .route("/workers", get(handlers::list_workers))
        .route("/metrics", get(handlers::metrics))
        .with_state(orchestrator)
}

pub struct RpcServer {
    pub port: u16,
    orchestrator: Arc<Orchestrator>,
}

impl RpcServer {
    pub fn new(port: u16, orchestrator: Arc<Orchestrator>) -> Self {
        Self { port, orchestrator }
    }

    /// Serve until `shutdown_rx` fires.
    pub async fn start(&self, mut shutdown_rx: broadcast::Receiver<()>) -> Result<(), RpcError> {
        let addr = format!("0.0.0.0:{}", self.port);
        let listener = tokio::net::TcpListener::bind(&addr)
            .await
            .map_err(|e| RpcError::Server(format!("bind {addr}: {e}")))?;
        info!(%addr, "control server listening");

        axum::serve(listener, router(Arc::clone(&self.orchestrator)))
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.recv().await;
                info!("control server shutting down");
            })
            .await
            .map_err(|e| RpcError::Server(e.to_string()))
    }
}
