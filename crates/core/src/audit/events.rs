use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Audit event types
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AuditEvent {
    // Run lifecycle
    RunStarted {
        run_id: String,
        version: String,
        config_hash: String,
    },
    RunFinished {
        run_id: String,
        outcome: String,
        files_processed: usize,
        files_archived: usize,
        warnings: usize,
    },
    RunAborted {
        run_id: String,
        error_kind: String,
        reason: String,
    },

    // File lifecycle
    FileStateChanged {
        run_id: String,
        file: String,
        from_state: String,
        to_state: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },

    // Deactivation
    /// One call to the endpoint. Identifiers are stored hashed.
    DeactivationAttempt {
        run_id: String,
        file: String,
        identifier_hash: String,
        attempt: u32,
        status: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error_kind: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        http_status: Option<u16>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        detail: Option<String>,
        elapsed_ms: u64,
    },
}

impl AuditEvent {
    /// Get the event type as a string
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::RunStarted { .. } => "run_started",
            Self::RunFinished { .. } => "run_finished",
            Self::RunAborted { .. } => "run_aborted",
            Self::FileStateChanged { .. } => "file_state_changed",
            Self::DeactivationAttempt { .. } => "deactivation_attempt",
        }
    }

    pub fn run_id(&self) -> &str {
        match self {
            Self::RunStarted { run_id, .. }
            | Self::RunFinished { run_id, .. }
            | Self::RunAborted { run_id, .. }
            | Self::FileStateChanged { run_id, .. }
            | Self::DeactivationAttempt { run_id, .. } => run_id,
        }
    }

    /// Hashed card identifier, for per-card events
    pub fn identifier_hash(&self) -> Option<&str> {
        match self {
            Self::DeactivationAttempt {
                identifier_hash, ..
            } => Some(identifier_hash),
            _ => None,
        }
    }

    /// Source file the event relates to, if any
    pub fn file(&self) -> Option<&str> {
        match self {
            Self::FileStateChanged { file, .. } | Self::DeactivationAttempt { file, .. } => {
                Some(file)
            }
            _ => None,
        }
    }
}

/// Stored audit record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub id: i64,
    pub timestamp: DateTime<Utc>,
    pub event_type: String,
    pub run_id: String,
    pub file: Option<String>,
    pub identifier_hash: Option<String>,
    pub data: AuditEvent,
}

impl AuditRecord {
    /// Wrap an event for insertion; the id is assigned by the store.
    pub fn new(event: AuditEvent) -> Self {
        Self {
            id: 0,
            timestamp: Utc::now(),
            event_type: event.event_type().to_string(),
            run_id: event.run_id().to_string(),
            file: event.file().map(String::from),
            identifier_hash: event.identifier_hash().map(String::from),
            data: event,
        }
    }
}

/// SHA-256 of an identifier, hex encoded.
pub fn hash_identifier(identifier: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(identifier.trim().as_bytes());
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_type_and_keys() {
        let event = AuditEvent::FileStateChanged {
            run_id: "r-1".to_string(),
            file: "NGIN_DataFile_20240101.xml".to_string(),
            from_state: "staged".to_string(),
            to_state: "processing".to_string(),
            reason: None,
        };
        assert_eq!(event.event_type(), "file_state_changed");
        assert_eq!(event.run_id(), "r-1");
        assert_eq!(event.file(), Some("NGIN_DataFile_20240101.xml"));

        let started = AuditEvent::RunStarted {
            run_id: "r-1".to_string(),
            version: "0.1.0".to_string(),
            config_hash: "abc".to_string(),
        };
        assert_eq!(started.file(), None);
    }

    #[test]
    fn test_serialization_is_tagged() {
        let event = AuditEvent::RunAborted {
            run_id: "r-2".to_string(),
            error_kind: "source_unavailable".to_string(),
            reason: "listing failed".to_string(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "run_aborted");

        let back: AuditEvent = serde_json::from_value(json).unwrap();
        assert_eq!(back, event);
    }

    #[test]
    fn test_record_new_copies_keys() {
        let record = AuditRecord::new(AuditEvent::DeactivationAttempt {
            run_id: "r-3".to_string(),
            file: "f.xml".to_string(),
            identifier_hash: hash_identifier("89238010000101000001"),
            attempt: 1,
            status: "deactivated".to_string(),
            error_kind: None,
            http_status: Some(200),
            detail: None,
            elapsed_ms: 12,
        });
        assert_eq!(record.event_type, "deactivation_attempt");
        assert_eq!(record.run_id, "r-3");
        assert_eq!(record.file.as_deref(), Some("f.xml"));
        assert_eq!(
            record.identifier_hash,
            Some(hash_identifier("89238010000101000001"))
        );
    }

    #[test]
    fn test_hash_identifier_is_stable_and_opaque() {
        let a = hash_identifier("89238010000101000001");
        assert_eq!(a, hash_identifier(" 89238010000101000001 "));
        assert_eq!(a.len(), 64);
        assert!(!a.contains("8923801"));
    }
}
