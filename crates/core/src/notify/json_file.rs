use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use async_trait::async_trait;
use tokio::fs;
use tracing::{debug, info, warn};

use super::{Notifier, NotifyError};
use crate::coordinator::RunReport;

const REPORT_PREFIX: &str = "run_report_";

/// Writes one pretty-printed JSON file per run and prunes old ones.
pub struct JsonFileNotifier {
    dir: PathBuf,
    retention_days: u32,
}

impl JsonFileNotifier {
    /// `retention_days == 0` keeps reports forever.
    pub fn new(dir: impl Into<PathBuf>, retention_days: u32) -> Self {
        Self {
            dir: dir.into(),
            retention_days,
        }
    }

    /// `run_report_<finished %Y%m%d_%H%M%S>_<run id prefix>.json`
    pub fn report_path(&self, report: &RunReport) -> PathBuf {
        let short_id: String = report.run_id.chars().take(8).collect();
        self.dir.join(format!(
            "{}{}_{}.json",
            REPORT_PREFIX,
            report.finished_at.format("%Y%m%d_%H%M%S"),
            short_id
        ))
    }

    /// Delete report files last modified before the retention window.
    /// Returns how many were removed.
    pub async fn cleanup_old_reports(&self) -> usize {
        if self.retention_days == 0 {
            return 0;
        }
        let max_age = Duration::from_secs(u64::from(self.retention_days) * 24 * 60 * 60);
        let Some(cutoff) = SystemTime::now().checked_sub(max_age) else {
            return 0;
        };

        let mut entries = match fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(_) => return 0,
        };
        let mut removed = 0;
        while let Ok(Some(entry)) = entries.next_entry().await {
            let path = entry.path();
            if !is_report_file(&path) {
                continue;
            }
            let modified = match entry.metadata().await.and_then(|m| m.modified()) {
                Ok(modified) => modified,
                Err(_) => continue,
            };
            if modified < cutoff {
                match fs::remove_file(&path).await {
                    Ok(()) => {
                        debug!(path = %path.display(), "Removed old report");
                        removed += 1;
                    }
                    Err(e) => warn!(path = %path.display(), error = %e, "Failed to remove old report"),
                }
            }
        }
        if removed > 0 {
            info!(removed, dir = %self.dir.display(), "Pruned old run reports");
        }
        removed
    }
}

fn is_report_file(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.starts_with(REPORT_PREFIX) && n.ends_with(".json"))
}

#[async_trait]
impl Notifier for JsonFileNotifier {
    fn name(&self) -> &str {
        "json_file"
    }

    async fn send(&self, report: &RunReport) -> Result<(), NotifyError> {
        fs::create_dir_all(&self.dir)
            .await
            .map_err(|error| NotifyError::Io {
                path: self.dir.clone(),
                error,
            })?;

        let json = serde_json::to_vec_pretty(report)
            .map_err(|e| NotifyError::Serialization(e.to_string()))?;
        let path = self.report_path(report);
        fs::write(&path, json).await.map_err(|error| NotifyError::Io {
            path: path.clone(),
            error,
        })?;
        info!(path = %path.display(), "Saved run report");

        self.cleanup_old_reports().await;
        Ok(())
    }
}
