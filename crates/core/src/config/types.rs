use serde::{Deserialize, Deserializer, Serialize};
use std::path::PathBuf;

/// Root configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub source: SourceConfig,
    #[serde(default)]
    pub ranges: Vec<RangeConfig>,
    #[serde(default)]
    pub dispatch: DispatchConfig,
    #[serde(default)]
    pub policy: PolicyConfig,
    pub endpoint: EndpointConfig,
    #[serde(default)]
    pub export: ExportConfig,
    #[serde(default)]
    pub audit: AuditConfig,
    #[serde(default)]
    pub notify: NotifyConfig,
    #[serde(default)]
    pub run: RunConfig,
}

/// Where export files are discovered and where completed ones go.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SourceConfig {
    /// Directory scanned for candidate files
    #[serde(default = "default_source_root")]
    pub root: PathBuf,
    /// Glob pattern (`*` and `?`) matched against file names
    #[serde(default = "default_pattern")]
    pub pattern: String,
    /// Folder, relative to `root`, that completed files are moved into
    #[serde(default = "default_done_folder")]
    pub done_folder: String,
    /// Local directory holding staged copies during a run
    #[serde(default = "default_staging_dir")]
    pub staging_dir: PathBuf,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            root: default_source_root(),
            pattern: default_pattern(),
            done_folder: default_done_folder(),
            staging_dir: default_staging_dir(),
        }
    }
}

fn default_source_root() -> PathBuf {
    PathBuf::from("/SIEBEL/NGIN")
}

fn default_pattern() -> String {
    "NGIN_DataFile_*.xml".to_string()
}

fn default_done_folder() -> String {
    "done".to_string()
}

fn default_staging_dir() -> PathBuf {
    PathBuf::from("staging")
}

/// One configured identifier range.
///
/// Bounds are ICCIDs, which do not fit in a TOML integer, so they are
/// normally written as strings: `start = "89238010000101000000"`.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RangeConfig {
    pub name: String,
    #[serde(deserialize_with = "deserialize_bound", serialize_with = "serialize_bound")]
    pub start: u128,
    #[serde(deserialize_with = "deserialize_bound", serialize_with = "serialize_bound")]
    pub end: u128,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

fn default_true() -> bool {
    true
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawBound {
    Text(String),
    Number(u64),
}

fn deserialize_bound<'de, D>(deserializer: D) -> Result<u128, D::Error>
where
    D: Deserializer<'de>,
{
    match RawBound::deserialize(deserializer)? {
        RawBound::Number(n) => Ok(n as u128),
        RawBound::Text(s) => s
            .trim()
            .parse::<u128>()
            .map_err(|_| serde::de::Error::custom(format!("invalid range bound: {s:?}"))),
    }
}

fn serialize_bound<S>(value: &u128, serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    serializer.serialize_str(&value.to_string())
}

/// Dispatch engine tuning
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DispatchConfig {
    /// Tasks per chunk (default: 10)
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    /// Pause between chunks in milliseconds (default: 1000)
    #[serde(default = "default_chunk_cooldown_ms")]
    pub chunk_cooldown_ms: u64,
    /// Worker pool width inside a chunk (default: 1)
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    /// Total attempts per task, first call included (default: 3)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Base retry delay in milliseconds, doubled per attempt (default: 2000)
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    /// Per-call timeout in seconds (default: 30)
    #[serde(default = "default_call_timeout_secs")]
    pub call_timeout_secs: u64,
    /// Optional request budget across the whole run
    #[serde(default)]
    pub requests_per_minute: Option<u32>,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            chunk_cooldown_ms: default_chunk_cooldown_ms(),
            concurrency: default_concurrency(),
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            call_timeout_secs: default_call_timeout_secs(),
            requests_per_minute: None,
        }
    }
}

fn default_chunk_size() -> usize {
    10
}

fn default_chunk_cooldown_ms() -> u64 {
    1000
}

fn default_concurrency() -> usize {
    1
}

fn default_max_attempts() -> u32 {
    3
}

fn default_base_delay_ms() -> u64 {
    2000
}

fn default_call_timeout_secs() -> u64 {
    30
}

/// Completion policy
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PolicyConfig {
    /// Minimum success rate for a file to count as done (default: 0.95)
    #[serde(default = "default_success_threshold")]
    pub success_threshold: f64,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            success_threshold: default_success_threshold(),
        }
    }
}

fn default_success_threshold() -> f64 {
    0.95
}

/// Remote activation platform
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EndpointConfig {
    /// Platform base URL (e.g., "https://rsp.example.com")
    pub base_url: String,
    pub access_key: String,
    pub secret_key: String,
    /// Value sent as `finalProfileStatusIndicator`
    #[serde(default = "default_final_status")]
    pub final_status: String,
    /// HTTP client timeout in seconds (default: 30)
    #[serde(default = "default_call_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_final_status() -> String {
    "Unavailable".to_string()
}

/// Export record filtering
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ExportConfig {
    /// Only records with this `Action` become tasks; `None` accepts all
    #[serde(default = "default_required_action")]
    pub required_action: Option<String>,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            required_action: default_required_action(),
        }
    }
}

fn default_required_action() -> Option<String> {
    Some("DEACTIVATE".to_string())
}

/// Audit store configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AuditConfig {
    #[serde(default = "default_audit_path")]
    pub path: PathBuf,
    /// Write attempts before a failure is escalated (default: 3)
    #[serde(default = "default_max_write_attempts")]
    pub max_write_attempts: u32,
    #[serde(default = "default_write_retry_delay_ms")]
    pub write_retry_delay_ms: u64,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            path: default_audit_path(),
            max_write_attempts: default_max_write_attempts(),
            write_retry_delay_ms: default_write_retry_delay_ms(),
        }
    }
}

fn default_audit_path() -> PathBuf {
    PathBuf::from("deactivator-audit.db")
}

fn default_max_write_attempts() -> u32 {
    3
}

fn default_write_retry_delay_ms() -> u64 {
    100
}

/// Run report delivery
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct NotifyConfig {
    /// Directory for JSON run reports
    #[serde(default = "default_reports_dir")]
    pub reports_dir: PathBuf,
    /// Reports older than this are removed (default: 7)
    #[serde(default = "default_retention_days")]
    pub retention_days: u32,
    /// Optional webhook receiving each report as JSON
    #[serde(default)]
    pub webhook_url: Option<String>,
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            reports_dir: default_reports_dir(),
            retention_days: default_retention_days(),
            webhook_url: None,
        }
    }
}

fn default_reports_dir() -> PathBuf {
    PathBuf::from("reports")
}

fn default_retention_days() -> u32 {
    7
}

/// Process-level settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RunConfig {
    /// Single-instance lock file
    #[serde(default = "default_lock_path")]
    pub lock_path: PathBuf,
    /// If set, Prometheus text metrics are written here after each run
    #[serde(default)]
    pub metrics_textfile: Option<PathBuf>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            lock_path: default_lock_path(),
            metrics_textfile: None,
        }
    }
}

fn default_lock_path() -> PathBuf {
    PathBuf::from("/tmp/esim_deactivation.lock")
}

/// Sanitized config for logs and audit (secrets redacted)
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedConfig {
    pub source: SourceConfig,
    pub ranges: Vec<RangeConfig>,
    pub dispatch: DispatchConfig,
    pub policy: PolicyConfig,
    pub endpoint: SanitizedEndpointConfig,
    pub export: ExportConfig,
    pub audit: AuditConfig,
    pub notify: SanitizedNotifyConfig,
    pub run: RunConfig,
}

/// Endpoint config with credentials hidden
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedEndpointConfig {
    pub base_url: String,
    pub access_key_configured: bool,
    pub secret_key_configured: bool,
    pub final_status: String,
    pub timeout_secs: u64,
}

/// Notify config with the webhook URL hidden (it may embed a token)
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedNotifyConfig {
    pub reports_dir: PathBuf,
    pub retention_days: u32,
    pub webhook_configured: bool,
}

impl From<&Config> for SanitizedConfig {
    fn from(config: &Config) -> Self {
        Self {
            source: config.source.clone(),
            ranges: config.ranges.clone(),
            dispatch: config.dispatch.clone(),
            policy: config.policy.clone(),
            endpoint: SanitizedEndpointConfig {
                base_url: config.endpoint.base_url.clone(),
                access_key_configured: !config.endpoint.access_key.is_empty(),
                secret_key_configured: !config.endpoint.secret_key.is_empty(),
                final_status: config.endpoint.final_status.clone(),
                timeout_secs: config.endpoint.timeout_secs,
            },
            export: config.export.clone(),
            audit: config.audit.clone(),
            notify: SanitizedNotifyConfig {
                reports_dir: config.notify.reports_dir.clone(),
                retention_days: config.notify.retention_days,
                webhook_configured: config.notify.webhook_url.is_some(),
            },
            run: config.run.clone(),
        }
    }
}
