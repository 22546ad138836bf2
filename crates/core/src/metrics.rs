//! Prometheus metrics for core components.
//!
//! This module provides metrics for:
//! - Task queue (submissions, duplicates, skips)
//! - Executor (finished tasks, durations, halts)
//! - Watcher and scheduler (backend errors, sweeps)

use once_cell::sync::Lazy;
use prometheus::{HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts};

// =============================================================================
// Queue Metrics
// =============================================================================

/// Work items accepted into the queue, by trigger origin.
pub static TASKS_SUBMITTED: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("curator_tasks_submitted_total", "Work items accepted into the queue"),
        &["origin"], // "manual", "watch", "schedule"
    )
    .unwrap()
});

/// Submissions answered with an already-active task.
pub static DUPLICATE_SUBMISSIONS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "curator_duplicate_submissions_total",
            "Submissions whose identity already had an active task",
        ),
        &["origin"],
    )
    .unwrap()
});

// =============================================================================
// Executor Metrics
// =============================================================================

/// Tasks reaching a terminal state.
pub static TASKS_FINISHED: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("curator_tasks_finished_total", "Tasks reaching a terminal state"),
        &["state"], // "succeeded", "failed", "skipped", "cancelled"
    )
    .unwrap()
});

/// Scrape run duration in seconds.
pub static TASK_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "curator_task_duration_seconds",
            "Wall-clock duration of scrape runs",
        )
        .buckets(vec![1.0, 5.0, 15.0, 30.0, 60.0, 120.0, 300.0, 900.0, 3600.0]),
        &["state"],
    )
    .unwrap()
});

/// Times the worker pool was halted for resource exhaustion.
pub static EXECUTOR_HALTS: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "curator_executor_halts_total",
        "Worker pool halts caused by resource exhaustion",
    )
    .unwrap()
});

// =============================================================================
// Trigger Metrics
// =============================================================================

/// Watcher backend failures.
pub static WATCHER_ERRORS: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "curator_watcher_backend_errors_total",
        "Directory watcher backend failures",
    )
    .unwrap()
});

/// Scheduled sweeps by result.
pub static SWEEPS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("curator_sweeps_total", "Directory sweeps by result"),
        &["result"], // "completed", "suppressed", "failed"
    )
    .unwrap()
});

/// History records deleted.
pub static HISTORY_DELETES: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new("curator_history_deletes_total", "History records deleted").unwrap()
});

// =============================================================================
// Helper functions
// =============================================================================

/// Get all core metrics for registration in a registry.
pub fn all_metrics() -> Vec<Box<dyn prometheus::core::Collector>> {
    vec![
        Box::new(TASKS_SUBMITTED.clone()),
        Box::new(DUPLICATE_SUBMISSIONS.clone()),
        Box::new(TASKS_FINISHED.clone()),
        Box::new(TASK_DURATION.clone()),
        Box::new(EXECUTOR_HALTS.clone()),
        Box::new(WATCHER_ERRORS.clone()),
        Box::new(SWEEPS.clone()),
        Box::new(HISTORY_DELETES.clone()),
    ]
}
