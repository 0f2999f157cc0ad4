//! In-memory file source for testing.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::source::{FileDescriptor, FilePattern, FileSource, SourceError};

/// Mock implementation of [`FileSource`].
///
/// Files live in memory at the "root" until relocated; relocated files
/// are recorded with their destination and disappear from listings, the
/// same way an archived file leaves the pickup folder.
#[derive(Debug, Default)]
pub struct MockFileSource {
    files: Mutex<BTreeMap<String, Vec<u8>>>,
    relocated: Mutex<Vec<(String, String)>>,
    fetched: Mutex<Vec<String>>,
    /// If set, the next operation fails with this error.
    next_error: Mutex<Option<SourceError>>,
    fail_relocate: AtomicBool,
    unavailable: AtomicBool,
}

impl MockFileSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Put a file at the root, replacing any file with the same name.
    pub fn add_file(&self, name: &str, content: &[u8]) {
        self.files
            .lock()
            .unwrap()
            .insert(name.to_string(), content.to_vec());
    }

    /// Names still at the root, sorted.
    pub fn file_names(&self) -> Vec<String> {
        self.files.lock().unwrap().keys().cloned().collect()
    }

    /// `(file, destination)` for every successful relocation.
    pub fn relocated(&self) -> Vec<(String, String)> {
        self.relocated.lock().unwrap().clone()
    }

    /// Names passed to `fetch`, in order.
    pub fn fetched(&self) -> Vec<String> {
        self.fetched.lock().unwrap().clone()
    }

    /// Make every relocation fail until reset.
    pub fn fail_relocate(&self, fail: bool) {
        self.fail_relocate.store(fail, Ordering::SeqCst);
    }

    /// Make the whole source unreachable until reset.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Fail the next operation, whichever it is.
    pub fn set_next_error(&self, error: SourceError) {
        *self.next_error.lock().unwrap() = Some(error);
    }

    fn check(&self) -> Result<(), SourceError> {
        if let Some(error) = self.next_error.lock().unwrap().take() {
            return Err(error);
        }
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(SourceError::Unavailable("mock source offline".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl FileSource for MockFileSource {
    async fn list(&self, pattern: &str) -> Result<Vec<FileDescriptor>, SourceError> {
        self.check()?;
        let pattern = FilePattern::new(pattern)?;
        Ok(self
            .files
            .lock()
            .unwrap()
            .iter()
            .filter(|(name, _)| pattern.matches(name))
            .map(|(name, content)| FileDescriptor {
                name: name.clone(),
                location: PathBuf::from(name),
                size_bytes: content.len() as u64,
                modified: None,
            })
            .collect())
    }

    async fn fetch(&self, file: &FileDescriptor) -> Result<Vec<u8>, SourceError> {
        self.check()?;
        self.fetched.lock().unwrap().push(file.name.clone());
        self.files
            .lock()
            .unwrap()
            .get(&file.name)
            .cloned()
            .ok_or_else(|| SourceError::NotFound(file.name.clone()))
    }

    async fn relocate(&self, file: &FileDescriptor, destination: &str) -> Result<(), SourceError> {
        self.check()?;
        if self.fail_relocate.load(Ordering::SeqCst) {
            return Err(SourceError::RelocateFailed {
                file: file.name.clone(),
                destination: destination.to_string(),
                error: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "mock refused"),
            });
        }
        if self.files.lock().unwrap().remove(&file.name).is_none() {
            return Err(SourceError::NotFound(file.name.clone()));
        }
        self.relocated
            .lock()
            .unwrap()
            .push((file.name.clone(), destination.to_string()));
        Ok(())
    }
}
