use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// Element that wraps one provisioning record in an export file.
pub const RECORD_ELEMENT: &str = "CvtNginPrepaidData";

/// A validated record from an export file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportRecord {
    /// Card identifier, digits only
    pub iccid: String,
    pub imsi: Option<String>,
    pub msisdn: Option<String>,
    /// Requested action (e.g. "DEACTIVATE"), as written in the file
    pub action: Option<String>,
    pub status_date: Option<NaiveDateTime>,
}

impl ExportRecord {
    /// Record with only an identifier and a deactivate action.
    pub fn deactivate(iccid: impl Into<String>) -> Self {
        Self {
            iccid: iccid.into(),
            imsi: None,
            msisdn: None,
            action: Some("DEACTIVATE".to_string()),
            status_date: None,
        }
    }
}

/// Why a record was rejected before classification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum InvalidReason {
    MissingIdentifier,
    NonNumeric,
    BadLength { length: usize },
}

impl std::fmt::Display for InvalidReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InvalidReason::MissingIdentifier => write!(f, "missing ICCID"),
            InvalidReason::NonNumeric => write!(f, "ICCID not numeric"),
            InvalidReason::BadLength { length } => {
                write!(f, "ICCID length {length} out of expected range")
            }
        }
    }
}

/// A record that failed validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvalidRecord {
    /// Raw identifier text, if the record had one
    pub identifier: Option<String>,
    pub reason: InvalidReason,
}

/// Everything extracted from one export file.
#[derive(Debug, Clone, Default)]
pub struct ParsedExport {
    /// Valid records in document order
    pub records: Vec<ExportRecord>,
    pub invalid: Vec<InvalidRecord>,
}

impl ParsedExport {
    /// Record elements seen, valid or not.
    pub fn total(&self) -> usize {
        self.records.len() + self.invalid.len()
    }
}
