//! Delivery of run reports.
//!
//! Every run ends with exactly one [`RunReport`]. The coordinator hands it
//! to a [`Notifier`]; delivery failures are logged and never change the
//! run's outcome.

mod json_file;
mod log;
mod webhook;

pub use json_file::JsonFileNotifier;
pub use log::LogNotifier;
pub use webhook::WebhookNotifier;

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tracing::warn;

use crate::config::NotifyConfig;
use crate::coordinator::RunReport;

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("Failed to write report to {path}")]
    Io {
        path: PathBuf,
        #[source]
        error: std::io::Error,
    },

    #[error("Failed to serialize report: {0}")]
    Serialization(String),

    #[error("Webhook request failed: {0}")]
    Http(String),

    #[error("Webhook returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("{failed} of {total} notifiers failed")]
    Fanout { failed: usize, total: usize },
}

/// Sink for run reports.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &str;

    async fn send(&self, report: &RunReport) -> Result<(), NotifyError>;
}

/// Sends each report to every inner notifier, in order.
///
/// A failing notifier does not stop the others.
pub struct FanoutNotifier {
    notifiers: Vec<Arc<dyn Notifier>>,
}

impl FanoutNotifier {
    pub fn new(notifiers: Vec<Arc<dyn Notifier>>) -> Self {
        Self { notifiers }
    }

    pub fn len(&self) -> usize {
        self.notifiers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.notifiers.is_empty()
    }
}

#[async_trait]
impl Notifier for FanoutNotifier {
    fn name(&self) -> &str {
        "fanout"
    }

    async fn send(&self, report: &RunReport) -> Result<(), NotifyError> {
        let mut failed = 0;
        for notifier in &self.notifiers {
            if let Err(e) = notifier.send(report).await {
                warn!(notifier = notifier.name(), run_id = %report.run_id, error = %e, "Notification failed");
                failed += 1;
            }
        }
        if failed > 0 {
            return Err(NotifyError::Fanout {
                failed,
                total: self.notifiers.len(),
            });
        }
        Ok(())
    }
}

/// Build the notifier chain from config: log, JSON file, then the webhook
/// if one is configured.
pub fn create_notifier(config: &NotifyConfig) -> Result<FanoutNotifier, NotifyError> {
    let mut notifiers: Vec<Arc<dyn Notifier>> = vec![
        Arc::new(LogNotifier),
        Arc::new(JsonFileNotifier::new(
            config.reports_dir.clone(),
            config.retention_days,
        )),
    ];
    if let Some(url) = &config.webhook_url {
        notifiers.push(Arc::new(WebhookNotifier::new(url.clone())?));
    }
    Ok(FanoutNotifier::new(notifiers))
}
