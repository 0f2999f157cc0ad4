//! Audit store with injectable write failures.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

use crate::audit::{AuditError, AuditFilter, AuditRecord, AuditStore};

/// In-memory [`AuditStore`] whose inserts fail on demand.
#[derive(Debug)]
pub struct FlakyAuditStore {
    records: Mutex<Vec<AuditRecord>>,
    /// Inserts still to fail; `None` fails forever.
    failures_left: Mutex<Option<u32>>,
    insert_calls: AtomicU32,
}

impl FlakyAuditStore {
    /// A store that never fails.
    pub fn reliable() -> Self {
        Self::failing_first(0)
    }

    /// Fail the first `n` inserts, then accept everything.
    pub fn failing_first(n: u32) -> Self {
        Self {
            records: Mutex::new(Vec::new()),
            failures_left: Mutex::new(Some(n)),
            insert_calls: AtomicU32::new(0),
        }
    }

    pub fn always_failing() -> Self {
        Self {
            records: Mutex::new(Vec::new()),
            failures_left: Mutex::new(None),
            insert_calls: AtomicU32::new(0),
        }
    }

    /// Insert attempts, failed or not.
    pub fn insert_calls(&self) -> u32 {
        self.insert_calls.load(Ordering::SeqCst)
    }

    pub fn records(&self) -> Vec<AuditRecord> {
        self.records.lock().unwrap().clone()
    }
}

impl AuditStore for FlakyAuditStore {
    fn insert(&self, record: &AuditRecord) -> Result<i64, AuditError> {
        self.insert_calls.fetch_add(1, Ordering::SeqCst);

        let mut failures_left = self.failures_left.lock().unwrap();
        match failures_left.as_mut() {
            None => return Err(AuditError::Database("disk I/O error".to_string())),
            Some(n) if *n > 0 => {
                *n -= 1;
                return Err(AuditError::Database("database is locked".to_string()));
            }
            Some(_) => {}
        }

        let mut records = self.records.lock().unwrap();
        let mut stored = record.clone();
        stored.id = records.len() as i64 + 1;
        records.push(stored);
        Ok(records.len() as i64)
    }

    fn query(&self, filter: &AuditFilter) -> Result<Vec<AuditRecord>, AuditError> {
        Ok(self
            .records
            .lock()
            .unwrap()
            .iter()
            .filter(|r| filter.matches(r))
            .skip(filter.offset.max(0) as usize)
            .take(filter.limit.max(0) as usize)
            .cloned()
            .collect())
    }

    fn count(&self, filter: &AuditFilter) -> Result<i64, AuditError> {
        Ok(self
            .records
            .lock()
            .unwrap()
            .iter()
            .filter(|r| filter.matches(r))
            .count() as i64)
    }
}

