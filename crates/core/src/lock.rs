//! Single-instance run lock.
//!
//! An exclusive OS lock on a well-known file. The lock belongs to the
//! open file, so it goes away with the process even after a crash; the
//! file itself is left behind and only carries the holder's PID.

use std::fs::{File, OpenOptions, TryLockError};
use std::io::Write;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum LockError {
    #[error("Another run holds the lock at {0}")]
    AlreadyHeld(PathBuf),

    #[error("Failed to lock {path}")]
    Io {
        path: PathBuf,
        #[source]
        error: std::io::Error,
    },
}

/// Held for the duration of a run; released on drop.
#[derive(Debug)]
pub struct RunLock {
    file: File,
    path: PathBuf,
}

impl RunLock {
    /// Take the lock without waiting.
    pub fn try_acquire(path: &Path) -> Result<Self, LockError> {
        let io_err = |error| LockError::Io {
            path: path.to_path_buf(),
            error,
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(io_err)?;
        }

        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)
            .map_err(io_err)?;

        match file.try_lock() {
            Ok(()) => {}
            Err(TryLockError::WouldBlock) => {
                return Err(LockError::AlreadyHeld(path.to_path_buf()))
            }
            Err(TryLockError::Error(e)) => return Err(io_err(e)),
        }

        file.set_len(0).map_err(io_err)?;
        writeln!(file, "{}", std::process::id()).map_err(io_err)?;
        debug!(path = %path.display(), pid = std::process::id(), "Acquired run lock");

        Ok(Self {
            file,
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for RunLock {
    fn drop(&mut self) {
        if let Err(e) = self.file.unlock() {
            warn!(path = %self.path.display(), error = %e, "Failed to release run lock");
        }
    }
}
