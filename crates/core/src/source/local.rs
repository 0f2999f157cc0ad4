//! File source over a local (or mounted) directory.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::fs;
use tracing::{debug, info};

use super::{FileDescriptor, FilePattern, FileSource, SourceError};

/// Reads candidate files from a directory and archives them into a
/// sub-folder of it.
pub struct LocalDirSource {
    root: PathBuf,
}

impl LocalDirSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Rename, or report `false` when source and destination are on
    /// different filesystems.
    async fn try_atomic_move(source: &Path, destination: &Path) -> Result<bool, std::io::Error> {
        match fs::rename(source, destination).await {
            Ok(()) => Ok(true),
            Err(e) => {
                // EXDEV is 18 on Linux
                if e.kind() == ErrorKind::CrossesDevices || e.raw_os_error() == Some(18) {
                    Ok(false)
                } else {
                    Err(e)
                }
            }
        }
    }
}

#[async_trait]
impl FileSource for LocalDirSource {
    async fn list(&self, pattern: &str) -> Result<Vec<FileDescriptor>, SourceError> {
        let pattern = FilePattern::new(pattern)?;

        let mut entries = fs::read_dir(&self.root).await.map_err(|e| {
            SourceError::Unavailable(format!("{}: {}", self.root.display(), e))
        })?;

        let mut files = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| SourceError::Unavailable(format!("{}: {}", self.root.display(), e)))?
        {
            let name = entry.file_name().to_string_lossy().to_string();
            if !pattern.matches(&name) {
                continue;
            }
            let metadata = match entry.metadata().await {
                Ok(m) if m.is_file() => m,
                _ => continue,
            };
            files.push(FileDescriptor {
                name,
                location: entry.path(),
                size_bytes: metadata.len(),
                modified: metadata.modified().ok().map(DateTime::<Utc>::from),
            });
        }

        debug!(root = %self.root.display(), pattern = pattern.as_str(), found = files.len(), "Listed source");
        Ok(files)
    }

    async fn fetch(&self, file: &FileDescriptor) -> Result<Vec<u8>, SourceError> {
        if !fs::try_exists(&self.root).await.unwrap_or(false) {
            return Err(SourceError::Unavailable(self.root.display().to_string()));
        }
        fs::read(&file.location).await.map_err(|e| {
            if e.kind() == ErrorKind::NotFound {
                SourceError::NotFound(file.name.clone())
            } else {
                SourceError::Io(e)
            }
        })
    }

    async fn relocate(&self, file: &FileDescriptor, destination: &str) -> Result<(), SourceError> {
        let dest_dir = self.root.join(destination);
        let relocate_failed = |error: std::io::Error| SourceError::RelocateFailed {
            file: file.name.clone(),
            destination: dest_dir.display().to_string(),
            error,
        };

        if !fs::try_exists(&file.location).await.unwrap_or(false) {
            return Err(SourceError::NotFound(file.name.clone()));
        }

        fs::create_dir_all(&dest_dir).await.map_err(relocate_failed)?;
        let target = dest_dir.join(&file.name);

        if !Self::try_atomic_move(&file.location, &target)
            .await
            .map_err(relocate_failed)?
        {
            fs::copy(&file.location, &target).await.map_err(relocate_failed)?;
            fs::remove_file(&file.location).await.map_err(relocate_failed)?;
        }

        info!(file = %file.name, destination = %dest_dir.display(), "Relocated file");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn write(dir: &Path, name: &str, body: &str) {
        fs::write(dir.join(name), body).await.unwrap();
    }

    #[tokio::test]
    async fn test_list_filters_by_pattern_and_skips_dirs() {
        let temp = tempfile::tempdir().unwrap();
        write(temp.path(), "NGIN_DataFile_20240102.xml", "<a/>").await;
        write(temp.path(), "NGIN_DataFile_20240101.xml", "<a/>").await;
        write(temp.path(), "notes.txt", "x").await;
        fs::create_dir(temp.path().join("NGIN_DataFile_dir.xml")).await.unwrap();

        let source = LocalDirSource::new(temp.path());
        let mut names: Vec<_> = source
            .list("NGIN_DataFile_*.xml")
            .await
            .unwrap()
            .into_iter()
            .map(|f| f.name)
            .collect();
        names.sort();
        assert_eq!(
            names,
            vec!["NGIN_DataFile_20240101.xml", "NGIN_DataFile_20240102.xml"]
        );
    }

    #[tokio::test]
    async fn test_missing_root_is_unavailable() {
        let source = LocalDirSource::new("/nonexistent/deactivator/root");
        let err = source.list("*.xml").await.unwrap_err();
        assert!(err.is_unavailable());
    }

    #[tokio::test]
    async fn test_fetch_and_relocate() {
        let temp = tempfile::tempdir().unwrap();
        write(temp.path(), "NGIN_DataFile_1.xml", "<root/>").await;
        let source = LocalDirSource::new(temp.path());

        let file = source.list("*.xml").await.unwrap().remove(0);
        assert_eq!(source.fetch(&file).await.unwrap(), b"<root/>");

        source.relocate(&file, "done").await.unwrap();
        assert!(!temp.path().join("NGIN_DataFile_1.xml").exists());
        assert!(temp.path().join("done").join("NGIN_DataFile_1.xml").exists());

        // Archived files are no longer candidates.
        assert!(source.list("*.xml").await.unwrap().is_empty());

        let err = source.fetch(&file).await.unwrap_err();
        assert!(matches!(err, SourceError::NotFound(_)));
        let err = source.relocate(&file, "done").await.unwrap_err();
        assert!(matches!(err, SourceError::NotFound(_)));
    }
}
