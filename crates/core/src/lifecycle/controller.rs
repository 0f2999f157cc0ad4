use std::path::PathBuf;
use std::sync::Arc;

use tokio::fs;
use tracing::{debug, info, warn};

use super::types::{FileState, SourceFile};
use super::LifecycleError;
use crate::audit::{AuditEvent, AuditRecorder};
use crate::metrics;
use crate::outcome::Verdict;
use crate::source::{FileSource, SourceError};

/// Where files are found and where they go.
#[derive(Debug, Clone)]
pub struct LifecycleSettings {
    pub pattern: String,
    pub done_folder: String,
    pub staging_dir: PathBuf,
}

impl From<&crate::config::SourceConfig> for LifecycleSettings {
    fn from(config: &crate::config::SourceConfig) -> Self {
        Self {
            pattern: config.pattern.clone(),
            done_folder: config.done_folder.clone(),
            staging_dir: config.staging_dir.clone(),
        }
    }
}

/// Owns every file state change in a run.
///
/// Each change is checked against the allowed transitions and written to
/// the audit sink. Archival is committed by relocating the file at the
/// source; if that fails the file stays pending.
pub struct FileLifecycle {
    source: Arc<dyn FileSource>,
    audit: AuditRecorder,
    run_id: String,
    settings: LifecycleSettings,
}

impl FileLifecycle {
    pub fn new(
        source: Arc<dyn FileSource>,
        audit: AuditRecorder,
        run_id: impl Into<String>,
        settings: LifecycleSettings,
    ) -> Self {
        Self {
            source,
            audit,
            run_id: run_id.into(),
            settings,
        }
    }

    /// Candidate files, oldest first by the timestamp in their name.
    pub async fn discover(&self) -> Result<Vec<SourceFile>, SourceError> {
        let descriptors = self.source.list(&self.settings.pattern).await?;
        let mut files: Vec<SourceFile> = descriptors.into_iter().map(SourceFile::discovered).collect();
        files.sort_by(|a, b| {
            a.timestamp_key()
                .cmp(b.timestamp_key())
                .then_with(|| a.name.cmp(&b.name))
        });

        info!(count = files.len(), pattern = %self.settings.pattern, "Discovered files");
        for file in &files {
            debug!(file = %file.name, "Candidate");
        }
        Ok(files)
    }

    /// Fetch the file and keep a local copy in the staging directory.
    ///
    /// Returns the content. On a fetch error the file is left in
    /// `Discovered`; the caller decides whether to skip it or abort.
    pub async fn stage(&self, file: &mut SourceFile) -> Result<Vec<u8>, LifecycleError> {
        self.check(file, FileState::Staged)?;

        let content = self.source.fetch(&file.descriptor).await?;

        fs::create_dir_all(&self.settings.staging_dir)
            .await
            .map_err(|e| LifecycleError::Staging {
                path: self.settings.staging_dir.clone(),
                error: e,
            })?;
        let staged = self.settings.staging_dir.join(&file.name);
        fs::write(&staged, &content)
            .await
            .map_err(|e| LifecycleError::Staging {
                path: staged.clone(),
                error: e,
            })?;
        file.staged_path = Some(staged);

        self.transition(file, FileState::Staged, None).await?;
        Ok(content)
    }

    pub async fn begin_processing(
        &self,
        file: &mut SourceFile,
        total_records: usize,
        in_scope_count: usize,
    ) -> Result<(), LifecycleError> {
        file.total_records = total_records;
        file.in_scope_count = in_scope_count;
        self.transition(
            file,
            FileState::Processing,
            Some(format!("{in_scope_count} of {total_records} records in scope")),
        )
        .await
    }

    /// Move the file to its terminal state for this run, driven only by the
    /// verdict. The staged copy is always removed.
    pub async fn conclude(
        &self,
        file: &mut SourceFile,
        verdict: Verdict,
    ) -> Result<FileState, LifecycleError> {
        // Archived and PendingRetry are both reached from Processing only.
        self.check(file, FileState::Archived)?;

        let (next, reason) = match verdict {
            Verdict::Complete => {
                match self
                    .source
                    .relocate(&file.descriptor, &self.settings.done_folder)
                    .await
                {
                    Ok(()) => (FileState::Archived, None),
                    Err(e) => {
                        warn!(file = %file.name, error = %e, "Relocation failed, leaving file pending");
                        (FileState::PendingRetry, Some(format!("relocation failed: {e}")))
                    }
                }
            }
            Verdict::Incomplete => (
                FileState::PendingRetry,
                Some("success threshold not met".to_string()),
            ),
        };

        self.remove_staged(file).await;
        self.transition(file, next, reason).await?;
        Ok(next)
    }

    /// Give up on the file for this run without touching it at the source.
    pub async fn skip(&self, file: &mut SourceFile, reason: &str) -> Result<(), LifecycleError> {
        self.remove_staged(file).await;
        self.transition(file, FileState::Skipped, Some(reason.to_string()))
            .await
    }

    /// Remove whatever is left in the staging directory.
    pub async fn cleanup_staging(&self) {
        let mut entries = match fs::read_dir(&self.settings.staging_dir).await {
            Ok(entries) => entries,
            Err(_) => return,
        };
        let mut removed = 0;
        while let Ok(Some(entry)) = entries.next_entry().await {
            let is_file = entry.file_type().await.map(|t| t.is_file()).unwrap_or(false);
            if is_file && fs::remove_file(entry.path()).await.is_ok() {
                removed += 1;
            }
        }
        debug!(removed, dir = %self.settings.staging_dir.display(), "Cleaned staging directory");
    }

    async fn remove_staged(&self, file: &mut SourceFile) {
        if let Some(path) = file.staged_path.take() {
            if let Err(e) = fs::remove_file(&path).await {
                warn!(path = %path.display(), error = %e, "Failed to remove staged copy");
            }
        }
    }

    fn check(&self, file: &SourceFile, next: FileState) -> Result<(), LifecycleError> {
        if file.state.can_transition_to(next) {
            Ok(())
        } else {
            Err(LifecycleError::InvalidTransition {
                file: file.name.clone(),
                from: file.state,
                to: next,
            })
        }
    }

    async fn transition(
        &self,
        file: &mut SourceFile,
        next: FileState,
        reason: Option<String>,
    ) -> Result<(), LifecycleError> {
        self.check(file, next)?;
        let from = file.state;
        file.state = next;

        info!(file = %file.name, from = %from, to = %next, "File state changed");
        if next.is_terminal() {
            metrics::FILES_FINISHED.with_label_values(&[next.as_str()]).inc();
        }

        let event = AuditEvent::FileStateChanged {
            run_id: self.run_id.clone(),
            file: file.name.clone(),
            from_state: from.as_str().to_string(),
            to_state: next.as_str().to_string(),
            reason,
        };
        if self.audit.record(event).await.is_err() {
            file.audit_failures += 1;
        }
        Ok(())
    }
}
