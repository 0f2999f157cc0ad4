//! Streaming reader for provisioning export files.

use std::collections::HashMap;

use chrono::NaiveDateTime;
use quick_xml::events::Event;
use quick_xml::Reader;
use tracing::debug;

use super::types::{ExportRecord, InvalidReason, InvalidRecord, ParsedExport, RECORD_ELEMENT};
use super::ParseError;

const MIN_ICCID_LEN: usize = 19;
const MAX_ICCID_LEN: usize = 22;

const STATUS_DATE_FORMATS: &[&str] = &["%m/%d/%y %H:%M:%S", "%m/%d/%Y %H:%M:%S", "%Y-%m-%dT%H:%M:%S"];

/// Parse an export document.
///
/// Record elements are collected at any depth. Their direct children become
/// fields, keyed by local name. A document with no record elements is
/// rejected, as is anything the XML reader cannot make sense of.
pub fn parse_export(content: &[u8]) -> Result<ParsedExport, ParseError> {
    let mut reader = Reader::from_reader(content);
    reader.config_mut().trim_text(true);

    let mut buf = Vec::new();
    let mut parsed = ParsedExport::default();

    // Element depth of the whole document, and of the open record if any.
    let mut depth: usize = 0;
    let mut record_depth: Option<usize> = None;
    let mut fields: HashMap<String, String> = HashMap::new();
    let mut current_field: Option<String> = None;
    let mut saw_root = false;

    loop {
        let event = reader
            .read_event_into(&mut buf)
            .map_err(|e| ParseError::Malformed {
                position: reader.buffer_position() as u64,
                message: e.to_string(),
            })?;

        match event {
            Event::Start(e) => {
                depth += 1;
                saw_root = true;
                let name = local_name(e.local_name().as_ref());
                match record_depth {
                    None if name == RECORD_ELEMENT => {
                        record_depth = Some(depth);
                        fields.clear();
                    }
                    Some(rd) if depth == rd + 1 => {
                        current_field = Some(name);
                    }
                    _ => {}
                }
            }
            Event::Empty(e) => {
                saw_root = true;
                let name = local_name(e.local_name().as_ref());
                match record_depth {
                    None if name == RECORD_ELEMENT => {
                        parsed_record(&HashMap::new(), &mut parsed);
                    }
                    Some(rd) if depth == rd => {
                        fields.entry(name).or_default();
                    }
                    _ => {}
                }
            }
            Event::Text(t) => {
                if let Some(field) = &current_field {
                    let text = t.unescape().map_err(|e| ParseError::Malformed {
                        position: reader.buffer_position() as u64,
                        message: e.to_string(),
                    })?;
                    fields.entry(field.clone()).or_default().push_str(&text);
                }
            }
            Event::CData(c) => {
                if let Some(field) = &current_field {
                    let text = String::from_utf8_lossy(&c);
                    fields.entry(field.clone()).or_default().push_str(&text);
                }
            }
            Event::End(_) => {
                if depth == 0 {
                    return Err(ParseError::Malformed {
                        position: reader.buffer_position() as u64,
                        message: "unexpected closing tag".to_string(),
                    });
                }
                match record_depth {
                    Some(rd) if depth == rd => {
                        parsed_record(&fields, &mut parsed);
                        record_depth = None;
                    }
                    Some(rd) if depth == rd + 1 => {
                        current_field = None;
                    }
                    _ => {}
                }
                depth -= 1;
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    if depth != 0 {
        return Err(ParseError::Truncated { open_elements: depth });
    }
    if !saw_root || parsed.total() == 0 {
        return Err(ParseError::NoRecords);
    }

    debug!(
        valid = parsed.records.len(),
        invalid = parsed.invalid.len(),
        "Parsed export document"
    );
    Ok(parsed)
}

fn local_name(raw: &[u8]) -> String {
    String::from_utf8_lossy(raw).trim().to_string()
}

fn field<'a>(fields: &'a HashMap<String, String>, names: &[&str]) -> Option<&'a str> {
    names
        .iter()
        .filter_map(|n| fields.get(*n))
        .map(|v| v.trim())
        .find(|v| !v.is_empty())
}

fn parsed_record(fields: &HashMap<String, String>, parsed: &mut ParsedExport) {
    match validate_record(fields) {
        Ok(record) => parsed.records.push(record),
        Err(invalid) => {
            debug!(identifier = ?invalid.identifier, reason = %invalid.reason, "Rejected export record");
            parsed.invalid.push(invalid);
        }
    }
}

fn validate_record(fields: &HashMap<String, String>) -> Result<ExportRecord, InvalidRecord> {
    let Some(raw_iccid) = field(fields, &["ICCID", "iccid", "Iccid"]) else {
        return Err(InvalidRecord {
            identifier: None,
            reason: InvalidReason::MissingIdentifier,
        });
    };

    let iccid: String = raw_iccid
        .chars()
        .filter(|c| !c.is_whitespace() && !c.is_control())
        .collect();

    if !iccid.chars().all(|c| c.is_ascii_digit()) {
        return Err(InvalidRecord {
            identifier: Some(raw_iccid.to_string()),
            reason: InvalidReason::NonNumeric,
        });
    }
    if !(MIN_ICCID_LEN..=MAX_ICCID_LEN).contains(&iccid.len()) {
        return Err(InvalidRecord {
            identifier: Some(raw_iccid.to_string()),
            reason: InvalidReason::BadLength { length: iccid.len() },
        });
    }

    Ok(ExportRecord {
        iccid,
        imsi: field(fields, &["IMSI", "imsi"]).map(str::to_string),
        msisdn: field(fields, &["MSISDN", "msisdn"]).map(str::to_string),
        action: field(fields, &["Action", "action"]).map(str::to_string),
        status_date: field(fields, &["StatusDate", "statusDate"]).and_then(parse_status_date),
    })
}

/// Parse a status date in any of the formats seen in exports.
pub fn parse_status_date(value: &str) -> Option<NaiveDateTime> {
    let value = value.trim();
    STATUS_DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(value, fmt).ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, Timelike};

    fn doc(items: &str) -> String {
        format!(
            "<?xml version=\"1.0\"?><SiebelMessage><ListOfCvtNginPrepaidDataIo>{items}</ListOfCvtNginPrepaidDataIo></SiebelMessage>"
        )
    }

    #[test]
    fn test_parses_nested_records() {
        let xml = doc(
            "<CvtNginPrepaidData>\
                <ICCID>89238010000101000001</ICCID>\
                <IMSI>624010000000001</IMSI>\
                <MSISDN>2389000001</MSISDN>\
                <Action>DEACTIVATE</Action>\
                <StatusDate>03/15/24 10:20:30</StatusDate>\
             </CvtNginPrepaidData>\
             <CvtNginPrepaidData>\
                <iccid> 8923801000010100000 2 </iccid>\
                <Action>ACTIVATE</Action>\
             </CvtNginPrepaidData>",
        );

        let parsed = parse_export(xml.as_bytes()).unwrap();
        assert_eq!(parsed.records.len(), 2);
        assert!(parsed.invalid.is_empty());

        let first = &parsed.records[0];
        assert_eq!(first.iccid, "89238010000101000001");
        assert_eq!(first.imsi.as_deref(), Some("624010000000001"));
        assert_eq!(first.action.as_deref(), Some("DEACTIVATE"));
        let date = first.status_date.unwrap();
        assert_eq!((date.year(), date.month(), date.hour()), (2024, 3, 10));

        assert_eq!(parsed.records[1].iccid, "89238010000101000002");
    }

    #[test]
    fn test_invalid_records_are_separated() {
        let xml = doc(
            "<CvtNginPrepaidData><IMSI>1</IMSI></CvtNginPrepaidData>\
             <CvtNginPrepaidData><ICCID>8923801000ABC1000001</ICCID></CvtNginPrepaidData>\
             <CvtNginPrepaidData><ICCID>123456</ICCID></CvtNginPrepaidData>\
             <CvtNginPrepaidData><ICCID>89238010000101000009</ICCID></CvtNginPrepaidData>",
        );

        let parsed = parse_export(xml.as_bytes()).unwrap();
        assert_eq!(parsed.total(), 4);
        assert_eq!(parsed.records.len(), 1);
        assert_eq!(parsed.invalid[0].reason, InvalidReason::MissingIdentifier);
        assert_eq!(parsed.invalid[1].reason, InvalidReason::NonNumeric);
        assert_eq!(parsed.invalid[2].reason, InvalidReason::BadLength { length: 6 });
    }

    #[test]
    fn test_empty_record_element_counts_as_invalid() {
        let xml = doc("<CvtNginPrepaidData/>");
        let parsed = parse_export(xml.as_bytes()).unwrap();
        assert_eq!(parsed.invalid.len(), 1);
    }

    #[test]
    fn test_document_without_records_is_rejected() {
        let xml = doc("<Other><ICCID>89238010000101000001</ICCID></Other>");
        assert!(matches!(
            parse_export(xml.as_bytes()),
            Err(ParseError::NoRecords)
        ));
        assert!(matches!(parse_export(b""), Err(ParseError::NoRecords)));
    }

    #[test]
    fn test_truncated_document_is_rejected() {
        let xml = "<Root><CvtNginPrepaidData><ICCID>89238010000101000001</ICCID>";
        assert!(parse_export(xml.as_bytes()).is_err());
    }

    #[test]
    fn test_mismatched_tags_are_rejected() {
        let xml = "<Root><CvtNginPrepaidData><ICCID>1</IMSI></CvtNginPrepaidData></Root>";
        assert!(matches!(
            parse_export(xml.as_bytes()),
            Err(ParseError::Malformed { .. })
        ));
    }

    #[test]
    fn test_cdata_and_entities() {
        let xml = doc(
            "<CvtNginPrepaidData>\
                <ICCID><![CDATA[89238010000101000003]]></ICCID>\
                <MSISDN>&#50;389</MSISDN>\
             </CvtNginPrepaidData>",
        );
        let parsed = parse_export(xml.as_bytes()).unwrap();
        assert_eq!(parsed.records[0].iccid, "89238010000101000003");
        assert_eq!(parsed.records[0].msisdn.as_deref(), Some("2389"));
    }

    #[test]
    fn test_status_date_formats() {
        assert!(parse_status_date("03/15/2024 10:20:30").is_some());
        assert!(parse_status_date("2024-03-15T10:20:30").is_some());
        assert!(parse_status_date("15.03.2024").is_none());
    }
}
