//! Pre-built [`tracing::Span`] constructors for common harness operations.
//!
//! Using consistent span names and field sets makes it easy to filter and
//! correlate log lines for one worker or one treasury operation.

use tracing::{info_span, Span};

/// Span covering one build/sign/broadcast/classify cycle of a worker.
pub fn worker_action_span(worker: &str, kind: &str) -> Span {
    info_span!("worker_action", worker = %worker, kind = %kind)
}

/// Span covering one treasury-signed operation (fund, deploy, mint).
pub fn treasury_span(op: &str) -> Span {
    info_span!("treasury_op", op = %op)
}

/// Span covering the funding of a worker account.
pub fn funding_span(target: &str, reason: &str) -> Span {
    info_span!("funding", target = %target, reason = %reason)
}
