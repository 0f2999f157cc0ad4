use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::dispatch::ErrorKind;
use crate::lifecycle::FileState;
use crate::outcome::{AlertClass, FileOutcome, Verdict};

/// Overall result of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunOutcome {
    /// Every discovered file was archived.
    Success,
    /// At least one file is pending retry or was skipped.
    Partial,
    /// No candidate files were found.
    NoData,
    /// The run was aborted.
    Fatal,
}

impl RunOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunOutcome::Success => "success",
            RunOutcome::Partial => "partial",
            RunOutcome::NoData => "no_data",
            RunOutcome::Fatal => "fatal",
        }
    }
}

/// Process-level status, mapped to the exit code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Success,
    PartialSuccess,
    Fatal,
    /// Another instance holds the lock; nothing was done.
    AlreadyRunning,
}

impl RunStatus {
    pub fn exit_code(&self) -> i32 {
        match self {
            RunStatus::Success => 0,
            RunStatus::Fatal => 1,
            RunStatus::PartialSuccess => 2,
            RunStatus::AlreadyRunning => 3,
        }
    }
}

impl From<RunOutcome> for RunStatus {
    fn from(outcome: RunOutcome) -> Self {
        match outcome {
            RunOutcome::Success | RunOutcome::NoData => RunStatus::Success,
            RunOutcome::Partial => RunStatus::PartialSuccess,
            RunOutcome::Fatal => RunStatus::Fatal,
        }
    }
}

/// Per-file entry of a run report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileReport {
    #[serde(flatten)]
    pub outcome: FileOutcome,
    pub final_state: FileState,
    /// Record elements in the file, valid or not
    pub records_parsed: usize,
    pub invalid_records: usize,
    pub duplicates: usize,
    pub out_of_range: usize,
    pub other_action: usize,
}

/// A file that was not processed this run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkippedFile {
    pub file: String,
    pub error_kind: ErrorKind,
    pub reason: String,
}

/// Why a run was aborted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FatalError {
    pub error_kind: ErrorKind,
    pub message: String,
    /// File being processed when the run stopped, if any
    pub file: Option<String>,
}

/// Summary of one run, handed to the notification sink.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub outcome: RunOutcome,
    pub files: Vec<FileReport>,
    pub skipped: Vec<SkippedFile>,
    pub warnings: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fatal_error: Option<FatalError>,
}

impl RunReport {
    /// Report for an aborted run: no per-file entries.
    pub fn fatal(
        run_id: impl Into<String>,
        started_at: DateTime<Utc>,
        error: FatalError,
        warnings: Vec<String>,
    ) -> Self {
        Self {
            run_id: run_id.into(),
            started_at,
            finished_at: Utc::now(),
            outcome: RunOutcome::Fatal,
            files: Vec::new(),
            skipped: Vec::new(),
            warnings,
            fatal_error: Some(error),
        }
    }

    pub fn status(&self) -> RunStatus {
        self.outcome.into()
    }

    pub fn total_tasks(&self) -> usize {
        self.files.iter().map(|f| f.outcome.total).sum()
    }

    pub fn total_succeeded(&self) -> usize {
        self.files.iter().map(|f| f.outcome.succeeded).sum()
    }

    pub fn total_failed(&self) -> usize {
        self.files.iter().map(|f| f.outcome.failed).sum()
    }

    pub fn files_archived(&self) -> usize {
        self.files
            .iter()
            .filter(|f| f.final_state == FileState::Archived)
            .count()
    }

    /// Worst alert across files, as a severity: success, warning or danger.
    pub fn severity(&self) -> &'static str {
        if self.outcome == RunOutcome::Fatal {
            return "danger";
        }
        let worst = self
            .files
            .iter()
            .map(|f| f.outcome.alert)
            .max_by_key(|a| match a {
                AlertClass::NoInScopeRecords | AlertClass::FullSuccess => 0,
                AlertClass::SuccessWithRetries => 1,
                AlertClass::PartialEscalate => 2,
            });
        match worst {
            Some(alert) => alert.severity(),
            None if self.skipped.is_empty() => "success",
            None => "warning",
        }
    }

    /// Outcome for a run that was not aborted.
    pub(crate) fn classify(files: &[FileReport], skipped: &[SkippedFile]) -> RunOutcome {
        if files.is_empty() && skipped.is_empty() {
            RunOutcome::NoData
        } else if skipped.is_empty()
            && files.iter().all(|f| {
                f.outcome.verdict == Verdict::Complete && f.final_state == FileState::Archived
            })
        {
            RunOutcome::Success
        } else {
            RunOutcome::Partial
        }
    }
}
