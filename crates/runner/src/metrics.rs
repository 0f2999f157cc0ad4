//! Prometheus metrics for the runner process.
//!
//! A run is a short-lived batch job, so metrics are not scraped: after each
//! run they are written in text format to a file picked up by the node
//! exporter's textfile collector.

use std::path::Path;

use once_cell::sync::Lazy;
use prometheus::{self, Encoder, IntGauge, Registry, TextEncoder};

/// Global metrics registry.
pub static REGISTRY: Lazy<Registry> = Lazy::new(|| {
    let registry = Registry::new();
    register_metrics(&registry);
    registry
});

/// Unix time the last run finished.
pub static LAST_RUN_TIMESTAMP: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "deactivator_last_run_timestamp_seconds",
        "Unix time the last run finished",
    )
    .unwrap()
});

/// Exit code of the last run.
pub static LAST_RUN_EXIT_CODE: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "deactivator_last_run_exit_code",
        "Exit code of the last run (0 success, 1 fatal, 2 partial, 3 already running)",
    )
    .unwrap()
});

fn register_metrics(registry: &Registry) {
    registry
        .register(Box::new(LAST_RUN_TIMESTAMP.clone()))
        .unwrap();
    registry
        .register(Box::new(LAST_RUN_EXIT_CODE.clone()))
        .unwrap();

    // Core metrics (dispatch, files, runs, audit)
    for metric in deactivator_core::metrics::all_metrics() {
        registry.register(metric).unwrap();
    }
}

/// Encode all metrics as Prometheus text format.
pub fn encode_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    if encoder.encode(&metric_families, &mut buffer).is_err() {
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}

/// Write the metrics next to `path` and rename into place, so the
/// collector never reads a half-written file.
pub fn write_textfile(path: &Path) -> std::io::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let tmp = path.with_extension("prom.tmp");
    std::fs::write(&tmp, encode_metrics())?;
    std::fs::rename(&tmp, path)
}
