use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{error, info, warn};
use uuid::Uuid;

use super::report::{FatalError, FileReport, RunReport, SkippedFile};
use crate::audit::{AuditEvent, AuditRecorder, AuditStore};
use crate::classifier::{select_in_scope, InvalidRange, LookupMode, RangeSet};
use crate::config::{config_hash, Config};
use crate::dispatch::{DispatchContext, DispatchEngine, DispatchSettings, ErrorKind};
use crate::endpoint::DeactivationEndpoint;
use crate::export::parse_export;
use crate::lifecycle::{FileLifecycle, FileState, LifecycleError, LifecycleSettings, SourceFile};
use crate::lock::{LockError, RunLock};
use crate::metrics;
use crate::notify::Notifier;
use crate::outcome::{OutcomeAggregator, Verdict};
use crate::source::FileSource;

/// Report a run that failed before a coordinator could be built.
///
/// Used when setup itself fails (audit store, lock file), so the failure
/// still reaches the notification sink.
pub async fn abort_before_run(notifier: &dyn Notifier, error: FatalError) -> RunReport {
    let run_id = Uuid::new_v4().to_string();
    error!(
        run_id = %run_id,
        error_kind = %error.error_kind,
        reason = %error.message,
        "Run aborted during setup"
    );
    let report = RunReport::fatal(run_id, Utc::now(), error, Vec::new());
    deliver(notifier, &report).await;
    report
}

async fn deliver(notifier: &dyn Notifier, report: &RunReport) {
    metrics::RUNS
        .with_label_values(&[report.outcome.as_str()])
        .inc();
    if let Err(e) = notifier.send(report).await {
        warn!(run_id = %report.run_id, notifier = notifier.name(), error = %e, "Failed to deliver run report");
    }
}

/// Everything a run needs from the configuration.
#[derive(Debug, Clone)]
pub struct CoordinatorSettings {
    pub lifecycle: LifecycleSettings,
    pub dispatch: DispatchSettings,
    pub success_threshold: f64,
    pub required_action: Option<String>,
    /// Recorded with the run-start audit event
    pub config_hash: String,
}

impl From<&Config> for CoordinatorSettings {
    fn from(config: &Config) -> Self {
        Self {
            lifecycle: LifecycleSettings::from(&config.source),
            dispatch: DispatchSettings::from(&config.dispatch),
            success_threshold: config.policy.success_threshold,
            required_action: config.export.required_action.clone(),
            config_hash: config_hash(config),
        }
    }
}

/// How processing of a single file ended, short of aborting the run.
enum FileResult {
    Processed(FileReport),
    Skipped(SkippedFile),
}

/// Drives one run from discovery to the final report.
///
/// Files are handled one at a time in discovery order. A problem with one
/// file is recorded and the run moves on; only an unreachable source or an
/// endpoint that rejects authorization for every task of a file aborts it.
pub struct RunCoordinator {
    source: Arc<dyn FileSource>,
    endpoint: Arc<dyn DeactivationEndpoint>,
    audit: AuditRecorder,
    notifier: Arc<dyn Notifier>,
    ranges: RangeSet,
    settings: CoordinatorSettings,
}

impl RunCoordinator {
    pub fn new(
        settings: CoordinatorSettings,
        ranges: RangeSet,
        source: Arc<dyn FileSource>,
        endpoint: Arc<dyn DeactivationEndpoint>,
        audit: AuditRecorder,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            source,
            endpoint,
            audit,
            notifier,
            ranges,
            settings,
        }
    }

    /// Build a coordinator from a validated config.
    pub fn from_config(
        config: &Config,
        source: Arc<dyn FileSource>,
        endpoint: Arc<dyn DeactivationEndpoint>,
        audit_store: Arc<dyn AuditStore>,
        notifier: Arc<dyn Notifier>,
    ) -> Result<Self, InvalidRange> {
        let ranges = RangeSet::from_config(&config.ranges)?;
        let audit = AuditRecorder::new(
            audit_store,
            config.audit.max_write_attempts,
            Duration::from_millis(config.audit.write_retry_delay_ms),
        );
        Ok(Self::new(
            CoordinatorSettings::from(config),
            ranges,
            source,
            endpoint,
            audit,
            notifier,
        ))
    }

    /// Take the single-instance lock, then run.
    ///
    /// If the lock is held elsewhere nothing is done: no discovery, no
    /// report.
    pub async fn run_locked(&self, lock_path: &Path) -> Result<RunReport, LockError> {
        let _lock = match RunLock::try_acquire(lock_path) {
            Ok(lock) => lock,
            Err(e) => {
                warn!(path = %lock_path.display(), error = %e, "Run lock not acquired");
                return Err(e);
            }
        };
        Ok(self.run().await)
    }

    /// Process every candidate file and deliver the report.
    pub async fn run(&self) -> RunReport {
        let run_id = Uuid::new_v4().to_string();
        let started_at = Utc::now();
        let mut warnings = Vec::new();

        info!(run_id = %run_id, ranges = self.ranges.ranges().len(), "Run started");
        if self.ranges.mode() == LookupMode::Linear {
            warnings.push("configured ranges overlap; using linear lookup".to_string());
        }
        self.audit_run_event(
            AuditEvent::RunStarted {
                run_id: run_id.clone(),
                version: env!("CARGO_PKG_VERSION").to_string(),
                config_hash: self.settings.config_hash.clone(),
            },
            &mut warnings,
        )
        .await;

        let lifecycle = FileLifecycle::new(
            self.source.clone(),
            self.audit.clone(),
            run_id.clone(),
            self.settings.lifecycle.clone(),
        );
        let engine = DispatchEngine::new(
            self.endpoint.clone(),
            self.audit.clone(),
            self.settings.dispatch.clone(),
        );

        let report = match self.process_all(&run_id, &lifecycle, &engine, &mut warnings).await {
            Ok((files, skipped)) => {
                let outcome = RunReport::classify(&files, &skipped);
                let files_archived = files
                    .iter()
                    .filter(|f| f.final_state == FileState::Archived)
                    .count();
                self.audit_run_event(
                    AuditEvent::RunFinished {
                        run_id: run_id.clone(),
                        outcome: outcome.as_str().to_string(),
                        files_processed: files.len(),
                        files_archived,
                        warnings: warnings.len(),
                    },
                    &mut warnings,
                )
                .await;
                RunReport {
                    run_id: run_id.clone(),
                    started_at,
                    finished_at: Utc::now(),
                    outcome,
                    files,
                    skipped,
                    warnings,
                    fatal_error: None,
                }
            }
            Err(fatal) => {
                error!(
                    run_id = %run_id,
                    error_kind = %fatal.error_kind,
                    file = ?fatal.file,
                    reason = %fatal.message,
                    "Run aborted"
                );
                self.audit_run_event(
                    AuditEvent::RunAborted {
                        run_id: run_id.clone(),
                        error_kind: fatal.error_kind.as_str().to_string(),
                        reason: fatal.message.clone(),
                    },
                    &mut warnings,
                )
                .await;
                RunReport::fatal(run_id.clone(), started_at, fatal, warnings)
            }
        };

        lifecycle.cleanup_staging().await;
        deliver(self.notifier.as_ref(), &report).await;
        report
    }

    async fn process_all(
        &self,
        run_id: &str,
        lifecycle: &FileLifecycle,
        engine: &DispatchEngine,
        warnings: &mut Vec<String>,
    ) -> Result<(Vec<FileReport>, Vec<SkippedFile>), FatalError> {
        let files = lifecycle.discover().await.map_err(|e| FatalError {
            error_kind: ErrorKind::SourceUnavailable,
            message: e.to_string(),
            file: None,
        })?;
        if files.is_empty() {
            info!(run_id, "No candidate files");
        }

        let mut processed = Vec::new();
        let mut skipped = Vec::new();
        for file in files {
            match self.process_file(run_id, lifecycle, engine, file).await? {
                FileResult::Processed(report) => {
                    if report.outcome.audit_failures > 0 {
                        warnings.push(format!(
                            "{} audit write(s) failed for {}",
                            report.outcome.audit_failures, report.outcome.file
                        ));
                    }
                    processed.push(report);
                }
                FileResult::Skipped(file) => skipped.push(file),
            }
        }
        Ok((processed, skipped))
    }

    async fn process_file(
        &self,
        run_id: &str,
        lifecycle: &FileLifecycle,
        engine: &DispatchEngine,
        mut file: SourceFile,
    ) -> Result<FileResult, FatalError> {
        info!(run_id, file = %file.name, "Processing file");

        let content = match lifecycle.stage(&mut file).await {
            Ok(content) => content,
            Err(LifecycleError::Source(e)) if e.is_unavailable() => {
                return Err(FatalError {
                    error_kind: ErrorKind::SourceUnavailable,
                    message: e.to_string(),
                    file: Some(file.name.clone()),
                });
            }
            Err(e) => {
                let kind = match e {
                    LifecycleError::Staging { .. } => ErrorKind::PersistenceError,
                    _ => ErrorKind::SourceUnavailable,
                };
                return Ok(self.skip(lifecycle, &mut file, kind, e.to_string()).await);
            }
        };

        let parsed = match parse_export(&content) {
            Ok(parsed) => parsed,
            Err(e) => {
                return Ok(self
                    .skip(lifecycle, &mut file, ErrorKind::UnparsableFile, e.to_string())
                    .await);
            }
        };

        let selection = select_in_scope(
            &parsed.records,
            &self.ranges,
            self.settings.required_action.as_deref(),
        );
        info!(
            file = %file.name,
            records = parsed.total(),
            invalid = parsed.invalid.len(),
            in_scope = selection.in_scope(),
            duplicates = selection.duplicates,
            out_of_range = selection.out_of_range,
            other_action = selection.other_action,
            "Selected records"
        );

        if let Err(e) = lifecycle
            .begin_processing(&mut file, parsed.total(), selection.in_scope())
            .await
        {
            return Ok(self
                .skip(lifecycle, &mut file, ErrorKind::PersistenceError, e.to_string())
                .await);
        }

        let aggregator = OutcomeAggregator::new(
            file.name.clone(),
            selection.in_scope(),
            self.settings.success_threshold,
        );
        let ctx = DispatchContext {
            run_id: run_id.to_string(),
            file: file.name.clone(),
        };
        let in_scope = selection.in_scope();
        let counts = (
            parsed.invalid.len(),
            selection.duplicates,
            selection.out_of_range,
            selection.other_action,
        );
        if !selection.tasks.is_empty() {
            engine.dispatch(&ctx, selection.tasks, &aggregator).await;
        }

        let auth_fatal = aggregator.snapshot().authorization_rejected_everything();
        // An auth-fatal file is never archived.
        let verdict = if auth_fatal {
            Verdict::Incomplete
        } else {
            aggregator.verdict()
        };

        let final_state = match lifecycle.conclude(&mut file, verdict).await {
            Ok(state) => state,
            Err(e) => {
                return Ok(self
                    .skip(lifecycle, &mut file, ErrorKind::PersistenceError, e.to_string())
                    .await);
            }
        };
        // State-change audit writes given up on for this file.
        for _ in 0..file.audit_failures {
            aggregator.record_audit_failure();
        }

        if auth_fatal {
            return Err(FatalError {
                error_kind: ErrorKind::AuthorizationError,
                message: format!(
                    "endpoint rejected authorization for all {in_scope} task(s)"
                ),
                file: Some(file.name.clone()),
            });
        }

        let outcome = aggregator.snapshot();
        info!(
            file = %file.name,
            state = %final_state,
            succeeded = outcome.succeeded,
            failed = outcome.failed,
            success_rate = %format!("{:.2}%", outcome.success_rate * 100.0),
            "File concluded"
        );

        let (invalid_records, duplicates, out_of_range, other_action) = counts;
        Ok(FileResult::Processed(FileReport {
            outcome,
            final_state,
            records_parsed: parsed.total(),
            invalid_records,
            duplicates,
            out_of_range,
            other_action,
        }))
    }

    async fn skip(
        &self,
        lifecycle: &FileLifecycle,
        file: &mut SourceFile,
        error_kind: ErrorKind,
        reason: String,
    ) -> FileResult {
        warn!(file = %file.name, error_kind = %error_kind, reason = %reason, "Skipping file");
        if let Err(e) = lifecycle.skip(file, &reason).await {
            warn!(file = %file.name, error = %e, "Could not mark file skipped");
        }
        FileResult::Skipped(SkippedFile {
            file: file.name.clone(),
            error_kind,
            reason,
        })
    }

    async fn audit_run_event(&self, event: AuditEvent, warnings: &mut Vec<String>) {
        let event_type = event.event_type();
        if let Err(e) = self.audit.record(event).await {
            warnings.push(format!("audit write failed for {event_type}: {e}"));
        }
    }
}
