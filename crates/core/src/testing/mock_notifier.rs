//! Mock notifier for testing.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::coordinator::RunReport;
use crate::notify::{Notifier, NotifyError};

/// Records every report it is sent.
#[derive(Debug, Default)]
pub struct MockNotifier {
    reports: Mutex<Vec<RunReport>>,
    failing: AtomicBool,
}

impl MockNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reports(&self) -> Vec<RunReport> {
        self.reports.lock().unwrap().clone()
    }

    pub fn last_report(&self) -> Option<RunReport> {
        self.reports.lock().unwrap().last().cloned()
    }

    /// Fail every send after recording nothing.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

#[async_trait]
impl Notifier for MockNotifier {
    fn name(&self) -> &str {
        "mock"
    }

    async fn send(&self, report: &RunReport) -> Result<(), NotifyError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(NotifyError::Http("mock notifier failing".to_string()));
        }
        self.reports.lock().unwrap().push(report.clone());
        Ok(())
    }
}
