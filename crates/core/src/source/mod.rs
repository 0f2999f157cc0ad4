//! Where export files come from.
//!
//! The source location is the authoritative record of a file's lifecycle:
//! a file still matching the pattern at the root has not been archived.

mod local;
mod pattern;

pub use local::LocalDirSource;
pub use pattern::FilePattern;

use std::path::PathBuf;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A candidate file at the source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileDescriptor {
    /// File name, used as the file's identity in reports and audit
    pub name: String,
    /// Location at the source
    pub location: PathBuf,
    pub size_bytes: u64,
    pub modified: Option<DateTime<Utc>>,
}

impl FileDescriptor {
    pub fn new(name: impl Into<String>, location: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            location: location.into(),
            size_bytes: 0,
            modified: None,
        }
    }
}

#[derive(Debug, Error)]
pub enum SourceError {
    /// The source cannot be reached at all.
    #[error("File source unavailable: {0}")]
    Unavailable(String),

    #[error("File not found at source: {0}")]
    NotFound(String),

    #[error("Invalid file pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },

    #[error("Failed to move {file} to {destination}")]
    RelocateFailed {
        file: String,
        destination: String,
        #[source]
        error: std::io::Error,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl SourceError {
    /// Whether the error means the source itself is unreachable.
    pub fn is_unavailable(&self) -> bool {
        matches!(self, SourceError::Unavailable(_))
    }
}

/// File transfer source.
#[async_trait]
pub trait FileSource: Send + Sync {
    /// Files at the source root whose names match `pattern`.
    async fn list(&self, pattern: &str) -> Result<Vec<FileDescriptor>, SourceError>;

    /// Full content of a file.
    async fn fetch(&self, file: &FileDescriptor) -> Result<Vec<u8>, SourceError>;

    /// Move a file into `destination`, a folder relative to the source root.
    async fn relocate(&self, file: &FileDescriptor, destination: &str) -> Result<(), SourceError>;
}
