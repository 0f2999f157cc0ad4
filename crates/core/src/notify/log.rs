use async_trait::async_trait;
use tracing::{error, info, warn};

use super::{Notifier, NotifyError};
use crate::coordinator::{RunOutcome, RunReport};

/// Writes the report summary to the log.
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    fn name(&self) -> &str {
        "log"
    }

    async fn send(&self, report: &RunReport) -> Result<(), NotifyError> {
        for file in &report.files {
            info!(
                run_id = %report.run_id,
                file = %file.outcome.file,
                state = %file.final_state,
                total = file.outcome.total,
                succeeded = file.outcome.succeeded,
                failed = file.outcome.failed,
                already_expired = file.outcome.already_expired,
                success_rate = %format!("{:.2}%", file.outcome.success_rate * 100.0),
                alert = ?file.outcome.alert,
                "File summary"
            );
        }
        for skipped in &report.skipped {
            warn!(run_id = %report.run_id, file = %skipped.file, error_kind = %skipped.error_kind, reason = %skipped.reason, "File skipped");
        }

        let duration_ms = (report.finished_at - report.started_at).num_milliseconds();
        match report.outcome {
            RunOutcome::Fatal => {
                let (kind, reason) = report
                    .fatal_error
                    .as_ref()
                    .map(|e| (e.error_kind.as_str(), e.message.as_str()))
                    .unwrap_or(("unknown", ""));
                error!(run_id = %report.run_id, error_kind = kind, reason, duration_ms, "Run aborted");
            }
            RunOutcome::Partial => warn!(
                run_id = %report.run_id,
                files = report.files.len(),
                archived = report.files_archived(),
                skipped = report.skipped.len(),
                tasks = report.total_tasks(),
                succeeded = report.total_succeeded(),
                failed = report.total_failed(),
                warnings = report.warnings.len(),
                duration_ms,
                "Run finished with pending files"
            ),
            RunOutcome::Success | RunOutcome::NoData => info!(
                run_id = %report.run_id,
                outcome = ?report.outcome,
                files = report.files.len(),
                tasks = report.total_tasks(),
                succeeded = report.total_succeeded(),
                warnings = report.warnings.len(),
                duration_ms,
                "Run finished"
            ),
        }
        Ok(())
    }
}
