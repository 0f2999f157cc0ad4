use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

use tokio::time::Instant;

use super::types::{AlertClass, FailedTask, FileOutcome, Verdict};
use crate::audit::hash_identifier;
use crate::dispatch::{AttemptRecord, ErrorKind, TaskOutcome};

/// Tolerance for the threshold comparison, so 19/20 against 0.95 is not
/// lost to float rounding.
const RATE_EPSILON: f64 = 1e-9;

#[derive(Debug, Default)]
struct Tally {
    succeeded: usize,
    failed: usize,
    already_expired: usize,
    attempts: usize,
    errors_by_kind: BTreeMap<ErrorKind, usize>,
    audit_failures: u32,
    failed_tasks: Vec<FailedTask>,
}

/// Accumulates results for one file.
///
/// Shared by every worker dispatching the file's tasks; each call takes a
/// short lock.
#[derive(Debug)]
pub struct OutcomeAggregator {
    file: String,
    total: usize,
    threshold: f64,
    started: Instant,
    tally: Mutex<Tally>,
}

impl OutcomeAggregator {
    pub fn new(file: impl Into<String>, total: usize, threshold: f64) -> Self {
        Self {
            file: file.into(),
            total,
            threshold,
            started: Instant::now(),
            tally: Mutex::new(Tally::default()),
        }
    }

    fn tally(&self) -> MutexGuard<'_, Tally> {
        self.tally.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Count one endpoint call.
    pub fn record_attempt(&self, attempt: &AttemptRecord) {
        let mut tally = self.tally();
        tally.attempts += 1;
        if let Some(kind) = attempt.error {
            *tally.errors_by_kind.entry(kind).or_default() += 1;
        }
    }

    /// Count a task that reached a terminal state.
    pub fn record_outcome(&self, outcome: &TaskOutcome) {
        let mut tally = self.tally();
        if outcome.audit_failures > 0 {
            tally.audit_failures += outcome.audit_failures;
            *tally.errors_by_kind.entry(ErrorKind::PersistenceError).or_default() +=
                outcome.audit_failures as usize;
        }
        if outcome.succeeded() {
            tally.succeeded += 1;
            if outcome.already_expired() {
                tally.already_expired += 1;
            }
        } else {
            tally.failed += 1;
            tally.failed_tasks.push(FailedTask {
                identifier_hash: hash_identifier(&outcome.task.identifier),
                attempts: outcome.task.attempt,
                last_error: outcome.task.last_error,
            });
        }
    }

    /// Count audit writes for this file that were given up on outside of
    /// task dispatch (state changes).
    pub fn record_audit_failure(&self) {
        let mut tally = self.tally();
        tally.audit_failures += 1;
        *tally.errors_by_kind.entry(ErrorKind::PersistenceError).or_default() += 1;
    }

    pub fn success_rate(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        self.tally().succeeded as f64 / self.total as f64
    }

    /// Complete when the success rate meets the threshold, or when there was
    /// nothing to do.
    pub fn verdict(&self) -> Verdict {
        if self.total == 0 || self.success_rate() + RATE_EPSILON >= self.threshold {
            Verdict::Complete
        } else {
            Verdict::Incomplete
        }
    }

    pub fn snapshot(&self) -> FileOutcome {
        let verdict = self.verdict();
        let success_rate = self.success_rate();
        let tally = self.tally();

        let alert = if self.total == 0 {
            AlertClass::NoInScopeRecords
        } else {
            match verdict {
                Verdict::Complete if tally.failed == 0 => AlertClass::FullSuccess,
                Verdict::Complete => AlertClass::SuccessWithRetries,
                Verdict::Incomplete => AlertClass::PartialEscalate,
            }
        };

        FileOutcome {
            file: self.file.clone(),
            total: self.total,
            succeeded: tally.succeeded,
            failed: tally.failed,
            already_expired: tally.already_expired,
            attempts: tally.attempts,
            success_rate,
            duration_ms: self.started.elapsed().as_millis() as u64,
            verdict,
            alert,
            errors_by_kind: tally.errors_by_kind.clone(),
            audit_failures: tally.audit_failures,
            failed_tasks: tally.failed_tasks.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::{AttemptStatus, DeactivationTask, TaskState};
    use chrono::Utc;

    fn outcome(id: &str, state: TaskState, status: AttemptStatus, error: Option<ErrorKind>) -> TaskOutcome {
        let mut task = DeactivationTask::new(id);
        task.state = state;
        task.attempt = 1;
        task.last_error = error;
        TaskOutcome {
            task,
            attempts: vec![AttemptRecord {
                attempt: 1,
                status,
                error,
                http_status: None,
                detail: None,
                at: Utc::now(),
                elapsed_ms: 0,
            }],
            audit_failures: 0,
        }
    }

    fn ok(id: &str) -> TaskOutcome {
        outcome(id, TaskState::Succeeded, AttemptStatus::Deactivated, None)
    }

    fn failed(id: &str, kind: ErrorKind) -> TaskOutcome {
        outcome(id, TaskState::FailedPermanent, AttemptStatus::Failed, Some(kind))
    }

    fn aggregate(total: usize, succeeded: usize) -> OutcomeAggregator {
        let agg = OutcomeAggregator::new("f.xml", total, 0.95);
        for i in 0..total {
            let o = if i < succeeded {
                ok(&i.to_string())
            } else {
                failed(&i.to_string(), ErrorKind::TransientEndpointError)
            };
            agg.record_outcome(&o);
        }
        agg
    }

    #[test]
    fn test_threshold_boundary_is_inclusive() {
        let agg = aggregate(20, 19);
        let outcome = agg.snapshot();
        assert_eq!(outcome.verdict, Verdict::Complete);
        assert_eq!(outcome.alert, AlertClass::SuccessWithRetries);

        let agg = aggregate(20, 18);
        let outcome = agg.snapshot();
        assert_eq!(outcome.verdict, Verdict::Incomplete);
        assert_eq!(outcome.alert, AlertClass::PartialEscalate);
        assert_eq!(outcome.failed, 2);
        assert_eq!(outcome.failed_tasks.len(), 2);
    }

    #[test]
    fn test_full_success() {
        let outcome = aggregate(7, 7).snapshot();
        assert_eq!(outcome.verdict, Verdict::Complete);
        assert_eq!(outcome.alert, AlertClass::FullSuccess);
        assert!((outcome.success_rate - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_empty_file_is_vacuously_complete() {
        let agg = OutcomeAggregator::new("empty.xml", 0, 0.95);
        let outcome = agg.snapshot();
        assert_eq!(outcome.verdict, Verdict::Complete);
        assert_eq!(outcome.alert, AlertClass::NoInScopeRecords);
        assert_eq!(outcome.success_rate, 0.0);
    }

    #[test]
    fn test_attempts_and_error_kinds_counted() {
        let agg = OutcomeAggregator::new("f.xml", 1, 0.95);
        let failing = failed("1", ErrorKind::TransientEndpointError);
        agg.record_attempt(&failing.attempts[0]);
        agg.record_attempt(&failing.attempts[0]);
        agg.record_attempt(&ok("1").attempts[0]);
        agg.record_outcome(&ok("1"));

        let outcome = agg.snapshot();
        assert_eq!(outcome.attempts, 3);
        assert_eq!(outcome.errors_by_kind[&ErrorKind::TransientEndpointError], 2);
        assert_eq!(outcome.alert, AlertClass::FullSuccess);
    }

    #[test]
    fn test_already_expired_counts_as_success() {
        let agg = OutcomeAggregator::new("f.xml", 1, 1.0);
        agg.record_outcome(&outcome(
            "1",
            TaskState::Succeeded,
            AttemptStatus::AlreadyExpired,
            None,
        ));
        let snapshot = agg.snapshot();
        assert_eq!(snapshot.succeeded, 1);
        assert_eq!(snapshot.already_expired, 1);
        assert_eq!(snapshot.verdict, Verdict::Complete);
    }

    #[test]
    fn test_authorization_rejected_everything() {
        let agg = OutcomeAggregator::new("f.xml", 2, 0.95);
        agg.record_outcome(&failed("1", ErrorKind::AuthorizationError));
        agg.record_outcome(&failed("2", ErrorKind::AuthorizationError));
        assert!(agg.snapshot().authorization_rejected_everything());

        let agg = OutcomeAggregator::new("f.xml", 2, 0.95);
        agg.record_outcome(&failed("1", ErrorKind::AuthorizationError));
        agg.record_outcome(&failed("2", ErrorKind::TransientEndpointError));
        assert!(!agg.snapshot().authorization_rejected_everything());
    }

    #[test]
    fn test_failed_tasks_hash_identifiers() {
        let agg = aggregate(1, 0);
        let outcome = agg.snapshot();
        assert_eq!(outcome.failed_tasks[0].identifier_hash, hash_identifier("0"));
    }
}
