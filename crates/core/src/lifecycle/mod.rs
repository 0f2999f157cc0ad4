//! File lifecycle: discovery, staging, processing and the terminal state.

mod controller;
mod types;

pub use controller::{FileLifecycle, LifecycleSettings};
pub use types::*;

use std::path::PathBuf;

use thiserror::Error;

use crate::source::SourceError;

#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("Invalid transition for {file}: {from} -> {to}")]
    InvalidTransition {
        file: String,
        from: FileState,
        to: FileState,
    },

    #[error(transparent)]
    Source(#[from] SourceError),

    #[error("Failed to stage file at {path}")]
    Staging {
        path: PathBuf,
        #[source]
        error: std::io::Error,
    },
}
