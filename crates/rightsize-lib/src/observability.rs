//! Observability infrastructure for the admission engine
//!
//! Provides:
//! - Prometheus metrics (admission outcomes, adjusted containers, stats fetch latency/errors)
//! - Structured JSON logging with tracing

use prometheus::{
    register_histogram, register_int_counter, register_int_counter_vec, Histogram, IntCounter,
    IntCounterVec,
};
use std::sync::OnceLock;
use tracing::{info, warn};

/// Histogram buckets for statistics fetch latency (in seconds)
const FETCH_LATENCY_BUCKETS: &[f64] = &[
    0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
];

/// Global metrics instance (registered once)
static GLOBAL_METRICS: OnceLock<RightsizeMetricsInner> = OnceLock::new();

struct RightsizeMetricsInner {
    admissions: IntCounterVec,
    containers_adjusted: IntCounter,
    stats_fetch_latency_seconds: Histogram,
    stats_fetch_errors: IntCounter,
}

impl RightsizeMetricsInner {
    fn new() -> Self {
        Self {
            admissions: register_int_counter_vec!(
                "rightsize_admissions_total",
                "Admission requests processed, by outcome",
                &["outcome"]
            )
            .expect("Failed to register admissions"),

            containers_adjusted: register_int_counter!(
                "rightsize_containers_adjusted_total",
                "Containers whose resources were rewritten"
            )
            .expect("Failed to register containers_adjusted"),

            stats_fetch_latency_seconds: register_histogram!(
                "rightsize_stats_fetch_latency_seconds",
                "Time spent fetching the statistics snapshot",
                FETCH_LATENCY_BUCKETS.to_vec()
            )
            .expect("Failed to register stats_fetch_latency_seconds"),

            stats_fetch_errors: register_int_counter!(
                "rightsize_stats_fetch_errors_total",
                "Statistics snapshot fetches that failed"
            )
            .expect("Failed to register stats_fetch_errors"),
        }
    }
}

/// Handle to the process-wide Prometheus metrics
///
/// Clones share the same underlying metrics.
#[derive(Clone)]
pub struct RightsizeMetrics {
    _private: (),
}

impl Default for RightsizeMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl RightsizeMetrics {
    /// Create a new metrics handle (initializes global metrics if needed)
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(RightsizeMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &RightsizeMetricsInner {
        GLOBAL_METRICS.get_or_init(RightsizeMetricsInner::new)
    }

    /// Count an admission outcome (see `AdmissionDecision::outcome`)
    pub fn inc_admission(&self, outcome: &str) {
        self.inner().admissions.with_label_values(&[outcome]).inc();
    }

    pub fn admissions(&self, outcome: &str) -> u64 {
        self.inner().admissions.with_label_values(&[outcome]).get()
    }

    pub fn add_containers_adjusted(&self, count: u64) {
        self.inner().containers_adjusted.inc_by(count);
    }

    pub fn observe_stats_fetch_latency(&self, duration_secs: f64) {
        self.inner().stats_fetch_latency_seconds.observe(duration_secs);
    }

    pub fn inc_stats_fetch_errors(&self) {
        self.inner().stats_fetch_errors.inc();
    }

    pub fn stats_fetch_errors(&self) -> u64 {
        self.inner().stats_fetch_errors.get()
    }
}

/// Structured logger for admission events
#[derive(Clone)]
pub struct StructuredLogger {
    instance: String,
}

impl StructuredLogger {
    pub fn new(instance: impl Into<String>) -> Self {
        Self {
            instance: instance.into(),
        }
    }

    /// Log the final decision for one admission request
    pub fn log_decision(&self, uid: &str, namespace: &str, pod_name: &str, outcome: &str, changed: bool) {
        if changed {
            info!(
                event = "admission_decided",
                instance = %self.instance,
                uid = %uid,
                namespace = %namespace,
                pod_name = %pod_name,
                outcome = %outcome,
                changed = true,
                "Applied resource adjustments to pod"
            );
        } else {
            info!(
                event = "admission_decided",
                instance = %self.instance,
                uid = %uid,
                namespace = %namespace,
                pod_name = %pod_name,
                outcome = %outcome,
                changed = false,
                "No resource adjustments needed for pod"
            );
        }
    }

    /// Log a per-container resource rewrite
    pub fn log_container_adjusted(
        &self,
        workload: &str,
        container: &str,
        resource: &str,
        from: &str,
        to: &str,
    ) {
        info!(
            event = "container_adjusted",
            instance = %self.instance,
            workload = %workload,
            container = %container,
            resource = %resource,
            from = %from,
            to = %to,
            "Adjusted container resources"
        );
    }

    /// Log a failed statistics fetch
    pub fn log_stats_unavailable(&self, url: &str, error: &str) {
        warn!(
            event = "stats_unavailable",
            instance = %self.instance,
            url = %url,
            error = %error,
            "Could not fetch statistics, allowing pod without adjustment"
        );
    }

    pub fn log_startup(&self, version: &str, stats_url: &str) {
        info!(
            event = "webhook_started",
            instance = %self.instance,
            version = %version,
            stats_url = %stats_url,
            "Rightsize webhook started"
        );
    }

    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "webhook_shutdown",
            instance = %self.instance,
            reason = %reason,
            "Rightsize webhook shutting down"
        );
    }
}
