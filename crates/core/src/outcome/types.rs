use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::dispatch::ErrorKind;

/// Whether a file met the success threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Complete,
    Incomplete,
}

/// How a file's result should be surfaced to operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertClass {
    /// Nothing in the file was in scope.
    NoInScopeRecords,
    FullSuccess,
    /// Threshold met, but some tasks failed.
    SuccessWithRetries,
    /// Threshold missed; file stays at the source.
    PartialEscalate,
}

impl AlertClass {
    /// Severity used by report consumers: success, warning or danger.
    pub fn severity(&self) -> &'static str {
        match self {
            AlertClass::NoInScopeRecords | AlertClass::FullSuccess => "success",
            AlertClass::SuccessWithRetries => "warning",
            AlertClass::PartialEscalate => "danger",
        }
    }
}

/// A task that ended in `FailedPermanent`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedTask {
    pub identifier_hash: String,
    pub attempts: u32,
    /// Kind of the last failed attempt
    pub last_error: Option<ErrorKind>,
}

/// Immutable per-file result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileOutcome {
    pub file: String,
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// Succeeded tasks the platform reported as already expired
    pub already_expired: usize,
    /// Endpoint calls made, retries included
    pub attempts: usize,
    pub success_rate: f64,
    pub duration_ms: u64,
    pub verdict: Verdict,
    pub alert: AlertClass,
    /// Failed attempts by kind
    pub errors_by_kind: BTreeMap<ErrorKind, usize>,
    pub audit_failures: u32,
    pub failed_tasks: Vec<FailedTask>,
}

impl FileOutcome {
    /// Every task failed, and every one of them on authorization.
    pub fn authorization_rejected_everything(&self) -> bool {
        self.total > 0
            && self.succeeded == 0
            && self.failed == self.total
            && self
                .failed_tasks
                .iter()
                .all(|t| t.last_error == Some(ErrorKind::AuthorizationError))
    }
}
