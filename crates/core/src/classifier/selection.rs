use std::collections::HashSet;

use serde::Serialize;

use super::range_set::{parse_identifier, RangeSet};
use crate::dispatch::DeactivationTask;
use crate::export::ExportRecord;

/// Tasks selected from a file, with the counts of what was left out.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Selection {
    /// Unique in-scope tasks in order of first occurrence
    pub tasks: Vec<DeactivationTask>,
    /// In-scope records dropped as repeats of an earlier one
    pub duplicates: usize,
    pub out_of_range: usize,
    /// Records whose action is not the one being processed
    pub other_action: usize,
}

impl Selection {
    pub fn in_scope(&self) -> usize {
        self.tasks.len()
    }
}

/// Pick the records to deactivate.
///
/// A record is selected when its action matches `required_action`
/// (case-insensitive, `None` accepts any) and its identifier falls in
/// `ranges`. Repeated identifiers collapse onto their first occurrence.
pub fn select_in_scope(
    records: &[ExportRecord],
    ranges: &RangeSet,
    required_action: Option<&str>,
) -> Selection {
    let mut selection = Selection::default();
    let mut seen: HashSet<u128> = HashSet::new();

    for record in records {
        if let Some(required) = required_action {
            let matches = record
                .action
                .as_deref()
                .is_some_and(|a| a.trim().eq_ignore_ascii_case(required));
            if !matches {
                selection.other_action += 1;
                continue;
            }
        }

        let Some(value) = parse_identifier(&record.iccid).filter(|v| ranges.contains(*v)) else {
            selection.out_of_range += 1;
            continue;
        };

        if seen.insert(value) {
            selection.tasks.push(DeactivationTask::from(record));
        } else {
            selection.duplicates += 1;
        }
    }

    selection
}
