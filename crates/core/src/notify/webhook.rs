use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tracing::debug;

use super::{Notifier, NotifyError};
use crate::coordinator::RunReport;

const WEBHOOK_TIMEOUT: Duration = Duration::from_secs(10);

/// POSTs the report as JSON to a fixed URL.
pub struct WebhookNotifier {
    client: Client,
    url: String,
}

impl WebhookNotifier {
    pub fn new(url: impl Into<String>) -> Result<Self, NotifyError> {
        let client = Client::builder()
            .timeout(WEBHOOK_TIMEOUT)
            .build()
            .map_err(|e| NotifyError::Http(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    fn name(&self) -> &str {
        "webhook"
    }

    async fn send(&self, report: &RunReport) -> Result<(), NotifyError> {
        let response = self
            .client
            .post(&self.url)
            .header("X-Run-Severity", report.severity())
            .json(report)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    NotifyError::Http("request timed out".to_string())
                } else {
                    NotifyError::Http(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(NotifyError::Status {
                status: status.as_u16(),
                body: body.chars().take(200).collect(),
            });
        }
        debug!(run_id = %report.run_id, status = status.as_u16(), "Webhook delivered");
        Ok(())
    }
}
