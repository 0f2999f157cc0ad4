//! Prometheus metrics for core components.
//!
//! This module provides metrics for:
//! - Dispatch (endpoint calls, task results, in-flight calls)
//! - File lifecycle (terminal states)
//! - Runs and audit persistence

use once_cell::sync::Lazy;
use prometheus::{
    Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts,
};

// =============================================================================
// Dispatch
// =============================================================================

/// Endpoint calls by result.
pub static DEACTIVATION_ATTEMPTS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "deactivator_attempts_total",
            "Total calls to the deactivation endpoint",
        ),
        &["result"], // "deactivated", "already_expired", or an error kind
    )
    .unwrap()
});

/// Tasks reaching a terminal state.
pub static TASKS_FINISHED: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("deactivator_tasks_total", "Tasks by terminal state"),
        &["state"], // "succeeded", "failed_permanent"
    )
    .unwrap()
});

/// Endpoint call latency in seconds.
pub static ENDPOINT_CALL_DURATION: Lazy<Histogram> = Lazy::new(|| {
    Histogram::with_opts(
        HistogramOpts::new(
            "deactivator_endpoint_call_duration_seconds",
            "Latency of deactivation endpoint calls",
        )
        .buckets(vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0]),
    )
    .unwrap()
});

/// Calls currently in flight.
pub static DISPATCH_IN_FLIGHT: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "deactivator_dispatch_in_flight",
        "Endpoint calls currently in flight",
    )
    .unwrap()
});

// =============================================================================
// Files and runs
// =============================================================================

/// Files by the state they ended the run in.
pub static FILES_FINISHED: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("deactivator_files_total", "Files by final state in a run"),
        &["state"], // "archived", "pending_retry", "skipped"
    )
    .unwrap()
});

/// Runs by outcome.
pub static RUNS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("deactivator_runs_total", "Runs by outcome"),
        &["outcome"],
    )
    .unwrap()
});

/// Audit writes abandoned after retries.
pub static AUDIT_WRITE_FAILURES: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "deactivator_audit_write_failures_total",
        "Audit writes abandoned after retries",
    )
    .unwrap()
});

// =============================================================================
// Helper functions
// =============================================================================

/// Get all core metrics for registration in a registry.
pub fn all_metrics() -> Vec<Box<dyn prometheus::core::Collector>> {
    vec![
        // Dispatch
        Box::new(DEACTIVATION_ATTEMPTS.clone()),
        Box::new(TASKS_FINISHED.clone()),
        Box::new(ENDPOINT_CALL_DURATION.clone()),
        Box::new(DISPATCH_IN_FLIGHT.clone()),
        // Files and runs
        Box::new(FILES_FINISHED.clone()),
        Box::new(RUNS.clone()),
        Box::new(AUDIT_WRITE_FAILURES.clone()),
    ]
}
