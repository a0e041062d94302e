// Private module declaration
mod server;

use prometheus::{HistogramOpts, HistogramVec, IntCounterVec, Opts, Registry};

// Re-export for public API
pub use server::start_metrics_server;

// ============================================================================
// Metrics Module - Prometheus metrics for the scheduling service
// ============================================================================
//
// - Operation outcomes per operation (schedule/start/complete/cancel) and
//   outcome label (ok or an error code such as `insufficient_funds`)
// - Operation latency, lock waits included
// - Caller-side retry attempts
//
// All metrics are registered with Prometheus and can be scraped via /metrics
// ============================================================================

pub const OUTCOME_OK: &str = "ok";

/// Central metrics registry for the entire application
pub struct Metrics {
    registry: Registry,

    pub operations_total: IntCounterVec,
    pub operation_duration: HistogramVec,
    pub retry_attempts_total: IntCounterVec,
}

impl Metrics {
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();

        let operations_total = IntCounterVec::new(
            Opts::new("scheduling_operations_total", "Scheduling operations by outcome"),
            &["operation", "outcome"],
        )?;
        registry.register(Box::new(operations_total.clone()))?;

        let operation_duration = HistogramVec::new(
            HistogramOpts::new(
                "scheduling_operation_duration_seconds",
                "Scheduling operation duration, lock waits included",
            )
            .buckets(vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0]),
            &["operation"],
        )?;
        registry.register(Box::new(operation_duration.clone()))?;

        let retry_attempts_total = IntCounterVec::new(
            Opts::new(
                "scheduling_retry_attempts_total",
                "Attempts made after a transient scheduling failure",
            ),
            &["operation"],
        )?;
        registry.register(Box::new(retry_attempts_total.clone()))?;

        Ok(Self {
            registry,
            operations_total,
            operation_duration,
            retry_attempts_total,
        })
    }

    /// Get the Prometheus registry for exposing metrics via HTTP
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn record_operation(&self, operation: &str, outcome: &str, duration_secs: f64) {
        self.operations_total
            .with_label_values(&[operation, outcome])
            .inc();
        self.operation_duration
            .with_label_values(&[operation])
            .observe(duration_secs);
    }

    pub fn record_retry_attempt(&self, operation: &str) {
        self.retry_attempts_total.with_label_values(&[operation]).inc();
    }
}
