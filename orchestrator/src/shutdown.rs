//! Process shutdown: OS signals fanned out to the harness tasks.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::signal;
use tokio::sync::broadcast;

/// What ended the run.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StopCause {
    Interrupt,
    Terminate,
    /// [`ShutdownController::shutdown`] was called directly.
    Requested,
}

impl fmt::Display for StopCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            StopCause::Interrupt => "SIGINT",
            StopCause::Terminate => "SIGTERM",
            StopCause::Requested => "request",
        })
    }
}

/// Fans a single stop event out to the treasury actor, the refund loop and
/// the control server. Only the first trigger is broadcast.
pub struct ShutdownController {
    tx: broadcast::Sender<()>,
    triggered: AtomicBool,
}

impl ShutdownController {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(1);
        Self {
            tx,
            triggered: AtomicBool::new(false),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.tx.subscribe()
    }

    pub fn is_triggered(&self) -> bool {
        self.triggered.load(Ordering::Acquire)
    }

    /// Returns `false` if shutdown had already been triggered.
    pub fn shutdown(&self) -> bool {
        if self.triggered.swap(true, Ordering::AcqRel) {
            return false;
        }
        let _ = self.tx.send(());
        true
    }

    /// Resolve on SIGINT or SIGTERM and trigger shutdown. Returns at once
    /// with [`StopCause::Requested`] if shutdown was already triggered.
    pub async fn wait_for_signal(&self) -> StopCause {
        let mut requested = self.subscribe();
        if self.is_triggered() {
            return StopCause::Requested;
        }
        let cause = tokio::select! {
            cause = os_signal() => cause,
            _ = requested.recv() => StopCause::Requested,
        };
        tracing::info!(%cause, "shutting down");
        self.shutdown();
        cause
    }
}

impl Default for ShutdownController {
    fn default() -> Self {
        Self::new()
    }
}

async fn os_signal() -> StopCause {
    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "SIGTERM handler unavailable");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = signal::ctrl_c() => StopCause::Interrupt,
        _ = terminate => StopCause::Terminate,
    }
}
