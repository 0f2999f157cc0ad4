//! Testing utilities and mock implementations.
//!
//! Every external seam of a run has an in-memory stand-in here, so a full
//! run can be driven end to end without a file server, an RSP platform or
//! a webhook receiver.
//!
//! # Example
//!
//! ```rust,ignore
//! use deactivator_core::testing::{fixtures, MockEndpoint, MockFileSource, MockReply};
//!
//! let source = MockFileSource::new();
//! source.add_file(
//!     "NGIN_DataFile_20240101.xml",
//!     &fixtures::export_xml(&[fixtures::deactivate(fixtures::esim_id(1))]),
//! );
//!
//! let endpoint = MockEndpoint::new();
//! endpoint.script(&fixtures::esim_id(1), vec![MockReply::Status(503)]);
//! ```

mod flaky_audit_store;
mod mock_endpoint;
mod mock_file_source;
mod mock_notifier;

pub use flaky_audit_store::FlakyAuditStore;
pub use mock_endpoint::{MockEndpoint, MockReply, RecordedCall};
pub use mock_file_source::MockFileSource;
pub use mock_notifier::MockNotifier;

/// Test fixtures and helper functions.
pub mod fixtures {
    use crate::config::RangeConfig;
    use crate::export::{ExportRecord, RECORD_ELEMENT};

    /// First identifier of the primary eSIM range.
    pub const ESIM_RANGE_A_START: u128 = 89_238_010_000_101_000_000;
    pub const ESIM_RANGE_A_END: u128 = 89_238_010_000_101_000_999;
    /// First identifier of the secondary eSIM range.
    pub const ESIM_RANGE_B_START: u128 = 89_238_010_000_202_000_000;
    pub const ESIM_RANGE_B_END: u128 = 89_238_010_000_202_000_499;
    /// Physical SIMs, outside every eSIM range.
    const PHYSICAL_START: u128 = 89_238_010_000_900_000_000;

    /// The n-th identifier in range A.
    pub fn esim_id(n: u64) -> String {
        (ESIM_RANGE_A_START + n as u128).to_string()
    }

    /// The n-th identifier in range B.
    pub fn esim_id_b(n: u64) -> String {
        (ESIM_RANGE_B_START + n as u128).to_string()
    }

    /// An identifier that no configured range covers.
    pub fn physical_id(n: u64) -> String {
        (PHYSICAL_START + n as u128).to_string()
    }

    pub fn deactivate(iccid: impl Into<String>) -> ExportRecord {
        ExportRecord::deactivate(iccid)
    }

    /// The two test ranges, both enabled.
    pub fn ranges() -> Vec<RangeConfig> {
        vec![
            RangeConfig {
                name: "esim-a".to_string(),
                start: ESIM_RANGE_A_START,
                end: ESIM_RANGE_A_END,
                enabled: true,
            },
            RangeConfig {
                name: "esim-b".to_string(),
                start: ESIM_RANGE_B_START,
                end: ESIM_RANGE_B_END,
                enabled: true,
            },
        ]
    }

    /// An export document in the provisioning system's layout.
    pub fn export_xml(records: &[ExportRecord]) -> Vec<u8> {
        let mut xml = String::from(
            "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<SiebelMessage MessageType=\"Integration Object\">\n<ListOfCvtNginPrepaidDataIo>\n",
        );
        for record in records {
            xml.push_str(&format!("<{RECORD_ELEMENT}>"));
            xml.push_str(&format!("<ICCID>{}</ICCID>", record.iccid));
            if let Some(imsi) = &record.imsi {
                xml.push_str(&format!("<IMSI>{imsi}</IMSI>"));
            }
            if let Some(msisdn) = &record.msisdn {
                xml.push_str(&format!("<MSISDN>{msisdn}</MSISDN>"));
            }
            if let Some(action) = &record.action {
                xml.push_str(&format!("<Action>{action}</Action>"));
            }
            if let Some(date) = record.status_date {
                xml.push_str(&format!(
                    "<StatusDate>{}</StatusDate>",
                    date.format("%m/%d/%Y %H:%M:%S")
                ));
            }
            xml.push_str(&format!("</{RECORD_ELEMENT}>\n"));
        }
        xml.push_str("</ListOfCvtNginPrepaidDataIo>\n</SiebelMessage>\n");
        xml.into_bytes()
    }
}
