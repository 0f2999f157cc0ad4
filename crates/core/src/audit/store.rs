use chrono::{DateTime, Utc};
use thiserror::Error;

use super::{hash_identifier, AuditRecord};

#[derive(Debug, Error)]
pub enum AuditError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Which audit records to read back.
///
/// Every criterion that is set must match. Results come back in insertion
/// order, so the attempts of one task read as they happened.
#[derive(Debug, Clone)]
pub struct AuditFilter {
    pub run_id: Option<String>,
    pub file: Option<String>,
    pub event_type: Option<String>,
    /// SHA-256 of the card identifier, see [`hash_identifier`]
    pub identifier_hash: Option<String>,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
    pub limit: i64,
    pub offset: i64,
}

impl Default for AuditFilter {
    fn default() -> Self {
        Self {
            run_id: None,
            file: None,
            event_type: None,
            identifier_hash: None,
            since: None,
            until: None,
            limit: 100,
            offset: 0,
        }
    }
}

impl AuditFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_run_id(mut self, run_id: impl Into<String>) -> Self {
        self.run_id = Some(run_id.into());
        self
    }

    pub fn with_file(mut self, file: impl Into<String>) -> Self {
        self.file = Some(file.into());
        self
    }

    pub fn with_event_type(mut self, event_type: impl Into<String>) -> Self {
        self.event_type = Some(event_type.into());
        self
    }

    /// Match events for one card, given its raw identifier.
    pub fn with_identifier(mut self, identifier: &str) -> Self {
        self.identifier_hash = Some(hash_identifier(identifier));
        self
    }

    /// Restrict to `[since, until]`; either end may be open.
    pub fn between(mut self, since: Option<DateTime<Utc>>, until: Option<DateTime<Utc>>) -> Self {
        self.since = since;
        self.until = until;
        self
    }

    pub fn page(mut self, limit: i64, offset: i64) -> Self {
        self.limit = limit;
        self.offset = offset;
        self
    }

    /// Whether `record` satisfies every criterion, ignoring paging.
    pub fn matches(&self, record: &AuditRecord) -> bool {
        fn eq(want: &Option<String>, have: Option<&str>) -> bool {
            want.as_deref().is_none_or(|w| have == Some(w))
        }
        eq(&self.run_id, Some(&record.run_id))
            && eq(&self.file, record.file.as_deref())
            && eq(&self.event_type, Some(&record.event_type))
            && eq(&self.identifier_hash, record.identifier_hash.as_deref())
            && self.since.is_none_or(|t| record.timestamp >= t)
            && self.until.is_none_or(|t| record.timestamp <= t)
    }
}

/// Append-only audit storage.
///
/// Writes are synchronous; [`super::AuditRecorder`] adds the retry policy.
pub trait AuditStore: Send + Sync {
    /// Append a record, returning the id the store assigned
    fn insert(&self, record: &AuditRecord) -> Result<i64, AuditError>;

    fn query(&self, filter: &AuditFilter) -> Result<Vec<AuditRecord>, AuditError>;

    /// Matching records, ignoring paging
    fn count(&self, filter: &AuditFilter) -> Result<i64, AuditError>;
}
