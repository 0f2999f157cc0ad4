pub mod audit;
pub mod classifier;
pub mod config;
pub mod coordinator;
pub mod dispatch;
pub mod endpoint;
pub mod export;
pub mod lifecycle;
pub mod lock;
pub mod metrics;
pub mod notify;
pub mod outcome;
pub mod source;
pub mod testing;

pub use audit::{AuditEvent, AuditRecorder, AuditStore, SqliteAuditStore};
pub use classifier::{classify, select_in_scope, IdentifierRange, RangeSet};
pub use config::{
    config_hash, load_config, load_config_from_str, validate_config, Config, ConfigError,
    SanitizedConfig,
};
pub use coordinator::{
    abort_before_run, FatalError, RunCoordinator, RunOutcome, RunReport, RunStatus,
};
pub use dispatch::{DispatchEngine, DispatchSettings, ErrorKind};
pub use endpoint::{DeactivationEndpoint, RspClient};
pub use export::{parse_export, ExportRecord, ParseError};
pub use lifecycle::{FileLifecycle, FileState};
pub use lock::{LockError, RunLock};
pub use notify::{create_notifier, Notifier};
pub use outcome::{FileOutcome, OutcomeAggregator, Verdict};
pub use source::{FileSource, LocalDirSource};
