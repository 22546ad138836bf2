//! Prometheus metrics for observability.
//!
//! This module provides metrics for monitoring the curator server:
//! - HTTP request metrics (latency, counts)
//! - Log stream connections
//! - Queue, executor and watcher state (collected dynamically)

use once_cell::sync::Lazy;
use prometheus::{
    self, Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts,
    Registry, TextEncoder,
};

/// Global metrics registry.
pub static REGISTRY: Lazy<Registry> = Lazy::new(|| {
    let registry = Registry::new();
    register_metrics(&registry);
    registry
});

// =============================================================================
// HTTP Request Metrics
// =============================================================================

/// HTTP request duration in seconds.
pub static HTTP_REQUEST_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "curator_http_request_duration_seconds",
            "HTTP request duration in seconds",
        )
        .buckets(vec![
            0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
        ]),
        &["method", "path", "status"],
    )
    .unwrap()
});

/// HTTP requests total count.
pub static HTTP_REQUESTS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("curator_http_requests_total", "Total HTTP requests"),
        &["method", "path", "status"],
    )
    .unwrap()
});

/// HTTP requests currently in flight.
pub static HTTP_REQUESTS_IN_FLIGHT: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "curator_http_requests_in_flight",
        "Number of HTTP requests currently being processed",
    )
    .unwrap()
});

// =============================================================================
// Log Stream Metrics
// =============================================================================

/// Log streams opened (cumulative).
pub static LOG_STREAMS_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "curator_log_streams_total",
        "Task log streams opened since startup",
    )
    .unwrap()
});

/// Lines a slow log stream client missed.
pub static LOG_STREAM_LAGGED_LINES: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "curator_log_stream_lagged_lines_total",
        "Log lines skipped because a stream client fell behind",
    )
    .unwrap()
});

// =============================================================================
// Engine Metrics (collected dynamically)
// =============================================================================

/// Tasks waiting in the queue.
pub static TASKS_QUEUED: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new("curator_tasks_queued", "Tasks waiting for a worker").unwrap()
});

/// Tasks currently running.
pub static TASKS_RUNNING: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new("curator_tasks_running", "Tasks currently running").unwrap()
});

/// Whether the worker pool is halted (0 or 1).
pub static EXECUTOR_HALTED: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "curator_executor_halted",
        "Whether the worker pool is halted (0 or 1)",
    )
    .unwrap()
});

/// Whether the watcher runs degraded (0 or 1).
pub static WATCHER_DEGRADED: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "curator_watcher_degraded",
        "Whether the directory watcher runs without a backend (0 or 1)",
    )
    .unwrap()
});

/// Active process-wide alerts.
pub static ALERTS_ACTIVE: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new("curator_alerts_active", "Active process-wide alerts").unwrap()
});

// =============================================================================
// Registration
// =============================================================================

fn register_metrics(registry: &Registry) {
    // HTTP
    registry
        .register(Box::new(HTTP_REQUEST_DURATION.clone()))
        .unwrap();
    registry
        .register(Box::new(HTTP_REQUESTS_TOTAL.clone()))
        .unwrap();
    registry
        .register(Box::new(HTTP_REQUESTS_IN_FLIGHT.clone()))
        .unwrap();

    // Log streams
    registry
        .register(Box::new(LOG_STREAMS_TOTAL.clone()))
        .unwrap();
    registry
        .register(Box::new(LOG_STREAM_LAGGED_LINES.clone()))
        .unwrap();

    // Engine
    registry.register(Box::new(TASKS_QUEUED.clone())).unwrap();
    registry.register(Box::new(TASKS_RUNNING.clone())).unwrap();
    registry
        .register(Box::new(EXECUTOR_HALTED.clone()))
        .unwrap();
    registry
        .register(Box::new(WATCHER_DEGRADED.clone()))
        .unwrap();
    registry.register(Box::new(ALERTS_ACTIVE.clone())).unwrap();

    // Core metrics (queue, executor, triggers, history)
    for metric in curator_core::metrics::all_metrics() {
        registry.register(metric).unwrap();
    }
}

/// Encode all metrics as Prometheus text format.
pub fn encode_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer).unwrap();
    String::from_utf8(buffer).unwrap()
}

/// Update gauges from the current engine state before encoding.
pub fn collect_dynamic_metrics(state: &crate::state::AppState) {
    let status = state.engine().status();
    TASKS_QUEUED.set(status.executor.queued as i64);
    TASKS_RUNNING.set(status.executor.running_tasks as i64);
    EXECUTOR_HALTED.set(i64::from(status.executor.halted));
    WATCHER_DEGRADED.set(i64::from(
        status.watcher.map(|w| w.degraded).unwrap_or(false),
    ));
    ALERTS_ACTIVE.set(status.active_alerts as i64);
}

static UUID_RE: Lazy<regex_lite::Regex> = Lazy::new(|| {
    regex_lite::Regex::new(
        r"[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}",
    )
    .unwrap()
});

static PRESET_RE: Lazy<regex_lite::Regex> =
    Lazy::new(|| regex_lite::Regex::new(r"^(/api/v1/rules/presets)/[^/]+").unwrap());

/// Normalize a path for metric labels (replace IDs and names with placeholders).
pub fn normalize_path(path: &str) -> String {
    let result = UUID_RE.replace_all(path, "{id}");
    let result = PRESET_RE.replace(&result, "$1/{name}");
    result.to_string()
}
