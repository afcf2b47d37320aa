//! Metrics for tracking usage of deprecated callables.
//!
//! Provides Prometheus counters for calls, warnings, forwards, and skips.

use prometheus::{IntCounterVec, Opts, Registry};

/// Metrics collector for deprecated callable usage.
#[derive(Clone)]
pub struct DeprecationMetrics {
    /// Registry for all metrics
    registry: Registry,

    /// Counter for calls to deprecated callables
    pub calls_total: IntCounterVec,

    /// Counter for deprecation warnings emitted
    pub warnings_total: IntCounterVec,

    /// Counter for calls forwarded to a replacement
    pub forwards_total: IntCounterVec,

    /// Counter for calls that bypassed deprecation handling
    pub skipped_total: IntCounterVec,
}

impl DeprecationMetrics {
    /// Create a new metrics collector with the given prefix.
    pub fn new(prefix: &str) -> Self {
        let registry = Registry::new();

        let calls_total = IntCounterVec::new(
            Opts::new(
                format!("{}_calls_total", prefix),
                "Total number of calls to deprecated callables",
            ),
            &["callable"],
        )
        .expect("Failed to create calls_total metric");

        let warnings_total = IntCounterVec::new(
            Opts::new(
                format!("{}_warnings_total", prefix),
                "Total number of deprecation warnings emitted",
            ),
            &["callable", "reason"],
        )
        .expect("Failed to create warnings_total metric");

        let forwards_total = IntCounterVec::new(
            Opts::new(
                format!("{}_forwards_total", prefix),
                "Total number of calls forwarded to a replacement",
            ),
            &["source", "target"],
        )
        .expect("Failed to create forwards_total metric");

        let skipped_total = IntCounterVec::new(
            Opts::new(
                format!("{}_skipped_total", prefix),
                "Total number of calls that skipped deprecation handling",
            ),
            &["callable"],
        )
        .expect("Failed to create skipped_total metric");

        // Register all metrics
        registry
            .register(Box::new(calls_total.clone()))
            .expect("Failed to register calls_total");
        registry
            .register(Box::new(warnings_total.clone()))
            .expect("Failed to register warnings_total");
        registry
            .register(Box::new(forwards_total.clone()))
            .expect("Failed to register forwards_total");
        registry
            .register(Box::new(skipped_total.clone()))
            .expect("Failed to register skipped_total");

        Self {
            registry,
            calls_total,
            warnings_total,
            forwards_total,
            skipped_total,
        }
    }

    /// Record a call to a deprecated callable.
    pub fn record_call(&self, callable: &str) {
        self.calls_total.with_label_values(&[callable]).inc();
    }

    /// Record an emitted warning; `reason` is `callable` or `arguments`.
    pub fn record_warning(&self, callable: &str, reason: &str) {
        self.warnings_total
            .with_label_values(&[callable, reason])
            .inc();
    }

    /// Record a forwarded call.
    pub fn record_forward(&self, source: &str, target: &str) {
        self.forwards_total
            .with_label_values(&[source, target])
            .inc();
    }

    /// Record a call that skipped deprecation handling.
    pub fn record_skip(&self, callable: &str) {
        self.skipped_total.with_label_values(&[callable]).inc();
    }

    /// Get the Prometheus registry.
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Encode metrics in Prometheus text format.
    pub fn encode(&self) -> String {
        use prometheus::Encoder;
        let encoder = prometheus::TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
            tracing::warn!(error = %e, "Failed to encode metrics");
            return String::new();
        }
        String::from_utf8_lossy(&buffer).into_owned()
    }
}

impl std::fmt::Debug for DeprecationMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeprecationMetrics").finish_non_exhaustive()
    }
}

impl Default for DeprecationMetrics {
    fn default() -> Self {
        Self::new("deprecate")
    }
}
