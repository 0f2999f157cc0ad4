//! Chunked, bounded-concurrency dispatch of deactivation tasks.

use std::sync::Arc;

use chrono::Utc;
use futures::future::join_all;
use tokio::sync::Semaphore;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::audit::{hash_identifier, AuditEvent, AuditRecorder};
use crate::endpoint::{DeactivationEndpoint, Disposition, ExpireMetadata};
use crate::metrics;
use crate::outcome::OutcomeAggregator;

use super::rate_limiter::RequestLimiter;
use super::types::{
    backoff_delay, AttemptRecord, AttemptStatus, DeactivationTask, DispatchSettings, ErrorKind,
    TaskOutcome, TaskState,
};

/// Identifies the run and file a dispatch belongs to, for audit.
#[derive(Debug, Clone)]
pub struct DispatchContext {
    pub run_id: String,
    pub file: String,
}

/// Runs tasks against the endpoint.
///
/// Chunks are processed one after another with a cooldown in between.
/// With `concurrency` 1 each task runs to completion, retries included,
/// before the next one starts. Wider pools keep at most `concurrency` calls
/// in flight; a task waiting out its backoff holds no permit, so it does not
/// block its siblings.
pub struct DispatchEngine {
    endpoint: Arc<dyn DeactivationEndpoint>,
    audit: AuditRecorder,
    settings: DispatchSettings,
    limiter: Option<Arc<RequestLimiter>>,
    permits: Arc<Semaphore>,
}

impl DispatchEngine {
    pub fn new(
        endpoint: Arc<dyn DeactivationEndpoint>,
        audit: AuditRecorder,
        settings: DispatchSettings,
    ) -> Self {
        let limiter = settings
            .requests_per_minute
            .map(|rpm| Arc::new(RequestLimiter::new(rpm)));
        let permits = Arc::new(Semaphore::new(settings.concurrency.max(1)));
        Self {
            endpoint,
            audit,
            settings,
            limiter,
            permits,
        }
    }

    pub fn settings(&self) -> &DispatchSettings {
        &self.settings
    }

    /// Dispatch every task and return outcomes in input order.
    ///
    /// Each attempt is reported to the audit sink and to `aggregator` before
    /// the task moves on; each finished task is reported to `aggregator`.
    pub async fn dispatch(
        &self,
        ctx: &DispatchContext,
        tasks: Vec<DeactivationTask>,
        aggregator: &OutcomeAggregator,
    ) -> Vec<TaskOutcome> {
        let chunk_size = self.settings.chunk_size.max(1);
        let chunk_count = tasks.len().div_ceil(chunk_size);
        let mut outcomes = Vec::with_capacity(tasks.len());

        for (index, chunk) in tasks.chunks(chunk_size).enumerate() {
            if index > 0 && !self.settings.chunk_cooldown.is_zero() {
                tokio::time::sleep(self.settings.chunk_cooldown).await;
            }

            debug!(
                file = %ctx.file,
                chunk = index + 1,
                of = chunk_count,
                size = chunk.len(),
                "Dispatching chunk"
            );

            if self.settings.concurrency <= 1 {
                for task in chunk.iter().cloned() {
                    outcomes.push(self.run_task(ctx, task, aggregator).await);
                }
            } else {
                let runs = chunk
                    .iter()
                    .cloned()
                    .map(|task| self.run_task(ctx, task, aggregator));
                outcomes.extend(join_all(runs).await);
            }
        }

        let succeeded = outcomes.iter().filter(|o| o.succeeded()).count();
        info!(
            file = %ctx.file,
            tasks = outcomes.len(),
            succeeded,
            failed = outcomes.len() - succeeded,
            "Dispatch finished"
        );

        outcomes
    }

    async fn run_task(
        &self,
        ctx: &DispatchContext,
        mut task: DeactivationTask,
        aggregator: &OutcomeAggregator,
    ) -> TaskOutcome {
        let mut attempts = Vec::new();
        let mut audit_failures = 0;

        loop {
            task.attempt += 1;
            let record = self.attempt_once(&task).await;

            if self.audit_attempt(ctx, &task, &record).await.is_err() {
                audit_failures += 1;
            }
            aggregator.record_attempt(&record);

            let error = record.error;
            attempts.push(record);

            match error {
                None => {
                    task.state = TaskState::Succeeded;
                    break;
                }
                Some(kind) => {
                    task.last_error = Some(kind);
                    if task.attempt >= self.settings.max_attempts {
                        task.state = TaskState::FailedPermanent;
                        warn!(
                            file = %ctx.file,
                            identifier = %hash_identifier(&task.identifier),
                            attempts = task.attempt,
                            last_error = %kind,
                            "Task failed permanently"
                        );
                        break;
                    }
                    let delay = backoff_delay(self.settings.base_delay, task.attempt);
                    debug!(
                        attempt = task.attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %kind,
                        "Retrying after backoff"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }

        let state = match task.state {
            TaskState::Succeeded => "succeeded",
            _ => "failed_permanent",
        };
        metrics::TASKS_FINISHED.with_label_values(&[state]).inc();

        let outcome = TaskOutcome {
            task,
            attempts,
            audit_failures,
        };
        aggregator.record_outcome(&outcome);
        outcome
    }

    /// One call, holding a pool permit for its duration only.
    async fn attempt_once(&self, task: &DeactivationTask) -> AttemptRecord {
        let _permit = self.permits.acquire().await.ok();
        if let Some(limiter) = &self.limiter {
            limiter.acquire().await;
        }

        let metadata = ExpireMetadata {
            attempt: task.attempt,
            ..Default::default()
        };

        metrics::DISPATCH_IN_FLIGHT.inc();
        let started = Instant::now();
        let result = tokio::time::timeout(
            self.settings.call_timeout,
            self.endpoint.expire(&task.identifier, &metadata),
        )
        .await;
        let elapsed = started.elapsed();
        metrics::DISPATCH_IN_FLIGHT.dec();
        metrics::ENDPOINT_CALL_DURATION.observe(elapsed.as_secs_f64());

        let (status, error, http_status, detail) = match result {
            Err(_) => (
                AttemptStatus::Failed,
                Some(ErrorKind::TransientEndpointError),
                None,
                Some(format!(
                    "timed out after {}s",
                    self.settings.call_timeout.as_secs()
                )),
            ),
            Ok(Err(e)) => (
                AttemptStatus::Failed,
                Some(ErrorKind::TransientEndpointError),
                None,
                Some(e.to_string()),
            ),
            Ok(Ok(response)) => {
                let (status, error) = match response.disposition() {
                    Disposition::Deactivated => (AttemptStatus::Deactivated, None),
                    Disposition::AlreadyExpired => (AttemptStatus::AlreadyExpired, None),
                    Disposition::Transient => {
                        (AttemptStatus::Failed, Some(ErrorKind::TransientEndpointError))
                    }
                    Disposition::Authorization => {
                        (AttemptStatus::Failed, Some(ErrorKind::AuthorizationError))
                    }
                    Disposition::Rejected => {
                        (AttemptStatus::Failed, Some(ErrorKind::EndpointRejected))
                    }
                };
                let detail = error.map(|_| response.summary());
                (status, error, Some(response.status), detail)
            }
        };

        let label = match (status, error) {
            (AttemptStatus::Deactivated, _) => "deactivated",
            (AttemptStatus::AlreadyExpired, _) => "already_expired",
            (_, Some(kind)) => kind.as_str(),
            (_, None) => "failed",
        };
        metrics::DEACTIVATION_ATTEMPTS.with_label_values(&[label]).inc();

        AttemptRecord {
            attempt: task.attempt,
            status,
            error,
            http_status,
            detail,
            at: Utc::now(),
            elapsed_ms: elapsed.as_millis() as u64,
        }
    }

    async fn audit_attempt(
        &self,
        ctx: &DispatchContext,
        task: &DeactivationTask,
        record: &AttemptRecord,
    ) -> Result<(), crate::audit::AuditError> {
        let status = match record.status {
            AttemptStatus::Deactivated => "deactivated",
            AttemptStatus::AlreadyExpired => "already_expired",
            AttemptStatus::Failed => "failed",
        };
        self.audit
            .record(AuditEvent::DeactivationAttempt {
                run_id: ctx.run_id.clone(),
                file: ctx.file.clone(),
                identifier_hash: hash_identifier(&task.identifier),
                attempt: record.attempt,
                status: status.to_string(),
                error_kind: record.error.map(|k| k.as_str().to_string()),
                http_status: record.http_status,
                detail: record.detail.clone(),
                elapsed_ms: record.elapsed_ms,
            })
            .await
            .map(|_| ())
    }
}
