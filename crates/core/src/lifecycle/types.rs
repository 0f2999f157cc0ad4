use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::source::FileDescriptor;

/// Where a source file is in its life within a run.
///
/// ```text
/// Discovered -> Staged -> Processing -> Archived
///     |           |           |-------> PendingRetry
///     +-----------+-----------+-------> Skipped
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileState {
    Discovered,
    Staged,
    Processing,
    /// Complete and moved to the done folder at the source.
    Archived,
    /// Left in place; the next run processes it again from scratch.
    PendingRetry,
    /// Could not be fetched or parsed; left in place.
    Skipped,
}

impl FileState {
    pub fn as_str(&self) -> &'static str {
        match self {
            FileState::Discovered => "discovered",
            FileState::Staged => "staged",
            FileState::Processing => "processing",
            FileState::Archived => "archived",
            FileState::PendingRetry => "pending_retry",
            FileState::Skipped => "skipped",
        }
    }

    /// Terminal for the current run.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            FileState::Archived | FileState::PendingRetry | FileState::Skipped
        )
    }

    pub fn can_transition_to(&self, next: FileState) -> bool {
        use FileState::*;
        matches!(
            (self, next),
            (Discovered, Staged)
                | (Staged, Processing)
                | (Processing, Archived)
                | (Processing, PendingRetry)
                | (Discovered, Skipped)
                | (Staged, Skipped)
                | (Processing, Skipped)
        )
    }
}

impl std::fmt::Display for FileState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A file being tracked through a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceFile {
    pub name: String,
    pub descriptor: FileDescriptor,
    pub discovered_at: DateTime<Utc>,
    pub state: FileState,
    pub total_records: usize,
    pub in_scope_count: usize,
    /// Local copy while staged
    pub staged_path: Option<PathBuf>,
    /// State-change audit writes that were given up on
    pub audit_failures: u32,
}

impl SourceFile {
    pub fn discovered(descriptor: FileDescriptor) -> Self {
        Self {
            name: descriptor.name.clone(),
            descriptor,
            discovered_at: Utc::now(),
            state: FileState::Discovered,
            total_records: 0,
            in_scope_count: 0,
            staged_path: None,
            audit_failures: 0,
        }
    }

    /// Ordering key: the last `_`-separated segment of the name without its
    /// extension, e.g. `20240101` for `NGIN_DataFile_20240101.xml`.
    pub fn timestamp_key(&self) -> &str {
        let stem = self
            .name
            .rsplit_once('.')
            .map(|(stem, _)| stem)
            .unwrap_or(&self.name);
        stem.rsplit_once('_').map(|(_, key)| key).unwrap_or(stem)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allowed_transitions() {
        use FileState::*;
        assert!(Discovered.can_transition_to(Staged));
        assert!(Staged.can_transition_to(Processing));
        assert!(Processing.can_transition_to(Archived));
        assert!(Processing.can_transition_to(PendingRetry));
        assert!(Staged.can_transition_to(Skipped));

        assert!(!Discovered.can_transition_to(Processing));
        assert!(!Discovered.can_transition_to(Archived));
        assert!(!Archived.can_transition_to(Processing));
        assert!(!PendingRetry.can_transition_to(Archived));
        assert!(!Skipped.can_transition_to(Staged));
    }

    #[test]
    fn test_terminal_states() {
        assert!(FileState::Archived.is_terminal());
        assert!(FileState::PendingRetry.is_terminal());
        assert!(FileState::Skipped.is_terminal());
        assert!(!FileState::Processing.is_terminal());
    }

    #[test]
    fn test_timestamp_key() {
        let file = |name: &str| SourceFile::discovered(FileDescriptor::new(name, name));
        assert_eq!(file("NGIN_DataFile_20240101.xml").timestamp_key(), "20240101");
        assert_eq!(file("plain.xml").timestamp_key(), "plain");
        assert_eq!(file("no_extension_7").timestamp_key(), "7");
    }
}
