use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tracing::{error, warn};

use super::{AuditError, AuditEvent, AuditRecord, AuditStore};

/// Writes audit events synchronously with a bounded retry.
///
/// Callers wait for the write to land (or give up) before moving on, so the
/// audit trail for a task is in the order its attempts happened. A write
/// that still fails after `max_attempts` is returned to the caller, which
/// reports it as a persistence warning.
#[derive(Clone)]
pub struct AuditRecorder {
    store: Arc<dyn AuditStore>,
    max_attempts: u32,
    retry_delay: Duration,
    failures: Arc<AtomicU64>,
}

impl AuditRecorder {
    pub fn new(store: Arc<dyn AuditStore>, max_attempts: u32, retry_delay: Duration) -> Self {
        Self {
            store,
            max_attempts: max_attempts.max(1),
            retry_delay,
            failures: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn store(&self) -> &Arc<dyn AuditStore> {
        &self.store
    }

    /// Writes that were given up on since creation.
    pub fn failures(&self) -> u64 {
        self.failures.load(Ordering::Relaxed)
    }

    pub async fn record(&self, event: AuditEvent) -> Result<i64, AuditError> {
        let record = AuditRecord::new(event);
        let mut attempt = 1;
        loop {
            match self.store.insert(&record) {
                Ok(id) => return Ok(id),
                Err(e) if attempt < self.max_attempts => {
                    warn!(
                        event_type = %record.event_type,
                        attempt,
                        error = %e,
                        "Audit write failed, retrying"
                    );
                    attempt += 1;
                    tokio::time::sleep(self.retry_delay).await;
                }
                Err(e) => {
                    error!(
                        event_type = %record.event_type,
                        attempts = attempt,
                        error = %e,
                        "Audit write failed, giving up"
                    );
                    self.failures.fetch_add(1, Ordering::Relaxed);
                    crate::metrics::AUDIT_WRITE_FAILURES.inc();
                    return Err(e);
                }
            }
        }
    }
}
