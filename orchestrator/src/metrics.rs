//! Prometheus metrics for the harness.
//!
//! The three per-worker instruments (successes, failures by reason, last
//! successful fee) are keyed by worker address. [`HarnessMetrics`] owns a
//! dedicated [`Registry`] that the control surface's `/metrics` endpoint
//! encodes into the Prometheus text exposition format.

use prometheus::{
    register_gauge_vec_with_registry, register_int_counter_vec_with_registry,
    register_int_gauge_with_registry, Encoder, GaugeVec, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};

/// Central collection of all harness-level Prometheus metrics.
pub struct HarnessMetrics {
    /// The Prometheus registry that owns every metric below.
    pub registry: Registry,

    // ── Per-worker ──────────────────────────────────────────────────────
    /// Successful transactions, by worker address.
    pub successful_tx: IntCounterVec,
    /// Failed transactions, by worker address and normalised reason.
    pub failed_tx: IntCounterVec,
    /// Fee paid by the last successful transaction, by worker address.
    pub successful_tx_fee: GaugeVec,

    // ── Treasury ────────────────────────────────────────────────────────
    /// Funding transfers, by outcome (`ok` / `failed`).
    pub funding: IntCounterVec,

    // ── Gauges ──────────────────────────────────────────────────────────
    /// Workers currently registered and not stopped.
    pub active_workers: IntGauge,
    /// Workers waiting in (or being served from) the funding queue.
    pub funding_queue_depth: IntGauge,
}

impl HarnessMetrics {
    /// Create a fresh set of metrics, all registered under a new
    /// [`Registry`].
    pub fn new() -> Self {
        let registry = Registry::new();

        let successful_tx = register_int_counter_vec_with_registry!(
            Opts::new(
                "txbot_successful_tx_total",
                "Total successful transactions per worker"
            ),
            &["worker"],
            registry
        )
        .expect("failed to register successful_tx counter");

        let failed_tx = register_int_counter_vec_with_registry!(
            Opts::new(
                "txbot_failed_tx_total",
                "Total failed transactions per worker and reason"
            ),
            &["worker", "reason"],
            registry
        )
        .expect("failed to register failed_tx counter");

        let successful_tx_fee = register_gauge_vec_with_registry!(
            Opts::new(
                "txbot_successful_tx_fee",
                "Fee paid by the last successful transaction per worker"
            ),
            &["worker"],
            registry
        )
        .expect("failed to register successful_tx_fee gauge");

        let funding = register_int_counter_vec_with_registry!(
            Opts::new("txbot_funding_total", "Treasury funding transfers by outcome"),
            &["outcome"],
            registry
        )
        .expect("failed to register funding counter");

        let active_workers = register_int_gauge_with_registry!(
            Opts::new("txbot_active_workers", "Workers currently running"),
            registry
        )
        .expect("failed to register active_workers gauge");

        let funding_queue_depth = register_int_gauge_with_registry!(
            Opts::new(
                "txbot_funding_queue_depth",
                "Workers waiting for a treasury refund"
            ),
            registry
        )
        .expect("failed to register funding_queue_depth gauge");

        Self {
            registry,
            successful_tx,
            failed_tx,
            successful_tx_fee,
            funding,
            active_workers,
            funding_queue_depth,
        }
    }

    pub fn record_success(&self, worker: &str, fee: f64) {
        self.successful_tx.with_label_values(&[worker]).inc();
        self.successful_tx_fee.with_label_values(&[worker]).set(fee);
    }

    pub fn record_failure(&self, worker: &str, reason: &str) {
        self.failed_tx.with_label_values(&[worker, reason]).inc();
    }

    pub fn successes(&self, worker: &str) -> u64 {
        self.successful_tx.with_label_values(&[worker]).get()
    }

    pub fn failures(&self, worker: &str, reason: &str) -> u64 {
        self.failed_tx.with_label_values(&[worker, reason]).get()
    }

    /// Fee recorded for the worker's most recent successful tx.
    pub fn last_fee(&self, worker: &str) -> f64 {
        self.successful_tx_fee.with_label_values(&[worker]).get()
    }

    /// Render every metric in the Prometheus text exposition format.
    pub fn encode_text(&self) -> String {
        let mut buffer = Vec::new();
        if let Err(e) = TextEncoder::new().encode(&self.registry.gather(), &mut buffer) {
            tracing::warn!(error = %e, "failed to encode metrics");
            return String::new();
        }
        String::from_utf8(buffer).unwrap_or_default()
    }
}

impl Default for HarnessMetrics {
    fn default() -> Self {
        Self::new()
    }
}
