use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::export::ExportRecord;

/// Closed set of failure categories.
///
/// Per-task kinds are carried as data on outcomes; only `SourceUnavailable`
/// ends a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// File source unreachable. Fatal for the run.
    SourceUnavailable,
    /// File could not be parsed. File skipped.
    UnparsableFile,
    /// Timeout, connection failure, 5xx or 429.
    TransientEndpointError,
    /// 401/403 from the endpoint.
    AuthorizationError,
    /// Endpoint refused the request (other 4xx or a business refusal).
    EndpointRejected,
    /// Retry budget exhausted.
    PermanentTaskFailure,
    /// Audit sink write failed after retries.
    PersistenceError,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::SourceUnavailable => "source_unavailable",
            ErrorKind::UnparsableFile => "unparsable_file",
            ErrorKind::TransientEndpointError => "transient_endpoint_error",
            ErrorKind::AuthorizationError => "authorization_error",
            ErrorKind::EndpointRejected => "endpoint_rejected",
            ErrorKind::PermanentTaskFailure => "permanent_task_failure",
            ErrorKind::PersistenceError => "persistence_error",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a task is in its life.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    Pending,
    Succeeded,
    FailedPermanent,
}

/// One unique in-scope identifier to deactivate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeactivationTask {
    pub identifier: String,
    pub imsi: Option<String>,
    pub msisdn: Option<String>,
    /// Attempts made so far
    pub attempt: u32,
    pub last_error: Option<ErrorKind>,
    pub state: TaskState,
}

impl DeactivationTask {
    pub fn new(identifier: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            imsi: None,
            msisdn: None,
            attempt: 0,
            last_error: None,
            state: TaskState::Pending,
        }
    }
}

impl From<&ExportRecord> for DeactivationTask {
    fn from(record: &ExportRecord) -> Self {
        Self {
            imsi: record.imsi.clone(),
            msisdn: record.msisdn.clone(),
            ..Self::new(record.iccid.clone())
        }
    }
}

/// Result of a single call to the endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptStatus {
    Deactivated,
    /// The platform reported the identifier as already expired.
    AlreadyExpired,
    Failed,
}

/// One call and what came of it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttemptRecord {
    pub attempt: u32,
    pub status: AttemptStatus,
    pub error: Option<ErrorKind>,
    pub http_status: Option<u16>,
    pub detail: Option<String>,
    pub at: DateTime<Utc>,
    pub elapsed_ms: u64,
}

/// Final state of a task after dispatch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskOutcome {
    pub task: DeactivationTask,
    pub attempts: Vec<AttemptRecord>,
    /// Audit writes for this task that failed after retries
    pub audit_failures: u32,
}

impl TaskOutcome {
    pub fn succeeded(&self) -> bool {
        self.task.state == TaskState::Succeeded
    }

    pub fn already_expired(&self) -> bool {
        self.attempts
            .last()
            .is_some_and(|a| a.status == AttemptStatus::AlreadyExpired)
    }
}

/// Dispatch tuning, built from the dispatch config section.
#[derive(Debug, Clone)]
pub struct DispatchSettings {
    pub chunk_size: usize,
    pub chunk_cooldown: Duration,
    pub concurrency: usize,
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub call_timeout: Duration,
    pub requests_per_minute: Option<u32>,
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self::from(&crate::config::DispatchConfig::default())
    }
}

impl From<&crate::config::DispatchConfig> for DispatchSettings {
    fn from(config: &crate::config::DispatchConfig) -> Self {
        Self {
            chunk_size: config.chunk_size.max(1),
            chunk_cooldown: Duration::from_millis(config.chunk_cooldown_ms),
            concurrency: config.concurrency.max(1),
            max_attempts: config.max_attempts.max(1),
            base_delay: Duration::from_millis(config.base_delay_ms),
            call_timeout: Duration::from_secs(config.call_timeout_secs),
            requests_per_minute: config.requests_per_minute,
        }
    }
}

/// Delay before attempt `attempt + 1`, given `attempt` attempts so far.
///
/// `base * 2^(attempt-1)`: base after the first failure, twice base after
/// the second, and so on.
pub fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    let exp = attempt.saturating_sub(1).min(16);
    base.saturating_mul(1u32 << exp)
}
