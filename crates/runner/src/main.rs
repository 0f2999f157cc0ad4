mod metrics;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use deactivator_core::config::RunConfig;
use deactivator_core::{
    abort_before_run, create_notifier, load_config, validate_config, AuditStore,
    DeactivationEndpoint, ErrorKind, FatalError, FileSource, LocalDirSource, LockError, Notifier,
    RspClient, RunCoordinator, RunStatus, SanitizedConfig, SqliteAuditStore,
};

/// Application version
const VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() {
    init_tracing();

    let status = match run().await {
        Ok(status) => status,
        Err(e) => {
            error!("Fatal error: {:#}", e);
            RunStatus::Fatal
        }
    };
    std::process::exit(status.exit_code());
}

fn init_tracing() {
    let json = std::env::var("DEACTIVATOR_LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));
    let (plain, json) = if json {
        (None, Some(tracing_subscriber::fmt::layer().json()))
    } else {
        (Some(tracing_subscriber::fmt::layer()), None)
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(plain)
        .with(json)
        .init();
}

async fn run() -> Result<RunStatus> {
    let config_path = std::env::var("DEACTIVATOR_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("config.toml"));

    info!(version = VERSION, "Loading configuration from {:?}", config_path);
    let config = load_config(&config_path)
        .with_context(|| format!("Failed to load config from {:?}", config_path))?;
    validate_config(&config).context("Configuration validation failed")?;

    let sanitized = SanitizedConfig::from(&config);
    info!(
        source = %sanitized.source.root.display(),
        pattern = %sanitized.source.pattern,
        endpoint = %sanitized.endpoint.base_url,
        ranges = sanitized.ranges.iter().filter(|r| r.enabled).count(),
        "Configuration loaded"
    );

    // Built first so later setup failures can still be reported.
    let notifier = Arc::new(create_notifier(&config.notify).context("Failed to create notifier")?);

    let audit_store: Arc<dyn AuditStore> = match SqliteAuditStore::new(&config.audit.path) {
        Ok(store) => Arc::new(store),
        Err(e) => {
            let message = format!("Failed to create audit store: {e}");
            let status = setup_failed(notifier.as_ref(), ErrorKind::PersistenceError, message).await;
            publish_metrics(&config.run, status);
            return Ok(status);
        }
    };
    let source: Arc<dyn FileSource> = Arc::new(LocalDirSource::new(&config.source.root));
    let endpoint: Arc<dyn DeactivationEndpoint> =
        Arc::new(RspClient::new(&config.endpoint).context("Failed to create RSP client")?);

    let coordinator =
        RunCoordinator::from_config(&config, source, endpoint, audit_store, notifier.clone())
            .context("Invalid identifier ranges")?;

    let status = match coordinator.run_locked(&config.run.lock_path).await {
        Ok(report) => report.status(),
        Err(LockError::AlreadyHeld(path)) => {
            info!(lock = %path.display(), "Another run is in progress, exiting");
            RunStatus::AlreadyRunning
        }
        Err(e) => {
            let message = format!("Failed to take run lock: {e}");
            setup_failed(notifier.as_ref(), ErrorKind::PersistenceError, message).await
        }
    };

    publish_metrics(&config.run, status);
    Ok(status)
}

fn publish_metrics(run: &RunConfig, status: RunStatus) {
    metrics::LAST_RUN_TIMESTAMP.set(unix_now_secs());
    metrics::LAST_RUN_EXIT_CODE.set(i64::from(status.exit_code()));
    if let Some(path) = &run.metrics_textfile {
        if let Err(e) = metrics::write_textfile(path) {
            warn!(path = %path.display(), error = %e, "Failed to write metrics textfile");
        }
    }
}

async fn setup_failed(notifier: &dyn Notifier, error_kind: ErrorKind, message: String) -> RunStatus {
    abort_before_run(
        notifier,
        FatalError {
            error_kind,
            message,
            file: None,
        },
    )
    .await
    .status()
}

fn unix_now_secs() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or_default()
}
