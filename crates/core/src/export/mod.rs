//! Provisioning export files: parsing into typed records.

mod reader;
mod types;

pub use reader::{parse_export, parse_status_date};
pub use types::*;

use thiserror::Error;

/// The export file could not be turned into records.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("Malformed XML at byte {position}: {message}")]
    Malformed { position: u64, message: String },

    #[error("Document ended with {open_elements} unclosed element(s)")]
    Truncated { open_elements: usize },

    #[error("No '{}' elements found", RECORD_ELEMENT)]
    NoRecords,
}
