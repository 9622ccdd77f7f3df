//! Prometheus metrics for reconciliation-engine.

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::Lazy;
use prometheus::{
    register_counter_vec, register_histogram_vec, CounterVec, Encoder, HistogramVec, TextEncoder,
};
use std::sync::OnceLock;

/// Recorder behind the `metrics` facade used by the HTTP middleware.
static HTTP_METRICS: OnceLock<PrometheusHandle> = OnceLock::new();

/// Histogram for database query duration by operation.
pub static DB_QUERY_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "reconciliation_db_query_duration_seconds",
        "Database query duration in seconds",
        &["operation"],
        vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5]
    )
    .expect("Failed to register DB_QUERY_DURATION")
});

/// Counter for match attempts by outcome.
pub static MATCH_OUTCOMES: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "reconciliation_match_outcomes_total",
        "Total number of match attempts by outcome",
        &["result", "mode"]
    )
    .expect("Failed to register MATCH_OUTCOMES")
});

/// Counter for refused or failed applies.
pub static APPLY_REFUSALS: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "reconciliation_apply_refusals_total",
        "Total number of refused payment applies",
        &["reason"]
    )
    .expect("Failed to register APPLY_REFUSALS")
});

/// Counter for batch runs by status.
pub static BATCH_RUNS: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "reconciliation_batch_runs_total",
        "Total number of reconciliation batch runs",
        &["trigger", "status"]
    )
    .expect("Failed to register BATCH_RUNS")
});

/// Histogram for batch duration.
pub static BATCH_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "reconciliation_batch_duration_seconds",
        "Reconciliation batch duration in seconds",
        &["trigger"],
        vec![0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0]
    )
    .expect("Failed to register BATCH_DURATION")
});

/// Counter for review notifications by delivery status.
pub static REVIEW_NOTIFICATIONS: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "reconciliation_review_notifications_total",
        "Total number of review notifications",
        &["status"]
    )
    .expect("Failed to register REVIEW_NOTIFICATIONS")
});

/// Counter for errors.
pub static ERRORS: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "reconciliation_errors_total",
        "Total number of errors",
        &["error_type"]
    )
    .expect("Failed to register ERRORS")
});

/// Initialize all metrics (forces lazy initialization) and install the
/// recorder for request metrics. Safe to call more than once.
pub fn init_metrics() {
    HTTP_METRICS.get_or_init(|| {
        PrometheusBuilder::new()
            .install_recorder()
            .expect("failed to install Prometheus recorder")
    });
    Lazy::force(&DB_QUERY_DURATION);
    Lazy::force(&MATCH_OUTCOMES);
    Lazy::force(&APPLY_REFUSALS);
    Lazy::force(&BATCH_RUNS);
    Lazy::force(&BATCH_DURATION);
    Lazy::force(&REVIEW_NOTIFICATIONS);
    Lazy::force(&ERRORS);
}

/// Get all metrics as Prometheus text format: the engine registry followed
/// by the request metrics.
pub fn get_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!(error = %e, "Failed to encode metrics");
        return String::new();
    }
    let mut text = String::from_utf8(buffer).unwrap_or_default();
    if let Some(handle) = HTTP_METRICS.get() {
        text.push_str(&handle.render());
    }
    text
}

/// Record one match attempt; `mode` is `auto` or `manual`.
pub fn record_match_outcome(result: &str, mode: &str) {
    MATCH_OUTCOMES.with_label_values(&[result, mode]).inc();
}

pub fn record_apply_refusal(reason: &str) {
    APPLY_REFUSALS.with_label_values(&[reason]).inc();
}

/// Record a finished batch; `trigger` is `api` or `scheduler`.
pub fn record_batch_run(trigger: &str, status: &str, duration_secs: f64) {
    BATCH_RUNS.with_label_values(&[trigger, status]).inc();
    BATCH_DURATION
        .with_label_values(&[trigger])
        .observe(duration_secs);
}

pub fn record_review_notification(status: &str) {
    REVIEW_NOTIFICATIONS.with_label_values(&[status]).inc();
}

/// Record an error.
pub fn record_error(error_type: &str) {
    ERRORS.with_label_values(&[error_type]).inc();
}
