use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::config::RangeConfig;

/// An inclusive identifier range.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentifierRange {
    pub name: String,
    pub start: u128,
    pub end: u128,
    pub enabled: bool,
}

impl IdentifierRange {
    pub fn new(name: impl Into<String>, start: u128, end: u128) -> Self {
        Self {
            name: name.into(),
            start,
            end,
            enabled: true,
        }
    }

    pub fn contains(&self, value: u128) -> bool {
        self.start <= value && value <= self.end
    }

    fn overlaps(&self, other: &IdentifierRange) -> bool {
        self.start <= other.end && other.start <= self.end
    }
}

impl From<&RangeConfig> for IdentifierRange {
    fn from(config: &RangeConfig) -> Self {
        Self {
            name: config.name.clone(),
            start: config.start,
            end: config.end,
            enabled: config.enabled,
        }
    }
}

/// How membership is answered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LookupMode {
    /// Disjoint ranges: binary search on start.
    Binary,
    /// At least two ranges overlap: scan every range.
    Linear,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[error("range '{name}' has start {start} greater than end {end}")]
pub struct InvalidRange {
    pub name: String,
    pub start: u128,
    pub end: u128,
}

/// Enabled ranges, sorted by start, loaded once per run.
#[derive(Debug, Clone)]
pub struct RangeSet {
    ranges: Vec<IdentifierRange>,
    mode: LookupMode,
}

impl RangeSet {
    /// Build the set from configured ranges.
    ///
    /// Disabled ranges are dropped. Overlapping ranges are accepted but
    /// switch lookups to a linear scan and log a configuration warning.
    pub fn new(ranges: impl IntoIterator<Item = IdentifierRange>) -> Result<Self, InvalidRange> {
        let mut ranges: Vec<IdentifierRange> = ranges.into_iter().filter(|r| r.enabled).collect();

        if let Some(bad) = ranges.iter().find(|r| r.start > r.end) {
            return Err(InvalidRange {
                name: bad.name.clone(),
                start: bad.start,
                end: bad.end,
            });
        }

        ranges.sort_by_key(|r| (r.start, r.end));

        // Sweep in start order, comparing each range with the one that
        // reaches furthest so far.
        let mut overlap = None;
        let mut reach: Option<&IdentifierRange> = None;
        for r in &ranges {
            if let Some(prev) = reach {
                if prev.overlaps(r) {
                    overlap = Some((prev.name.clone(), r.name.clone()));
                    break;
                }
            }
            if reach.is_none_or(|p| r.end > p.end) {
                reach = Some(r);
            }
        }

        let mode = match overlap {
            Some((a, b)) => {
                warn!(
                    first = %a,
                    second = %b,
                    "Configured ranges overlap, falling back to linear lookup"
                );
                LookupMode::Linear
            }
            None => LookupMode::Binary,
        };

        Ok(Self { ranges, mode })
    }

    /// Convenience constructor from the config section.
    pub fn from_config(configs: &[RangeConfig]) -> Result<Self, InvalidRange> {
        Self::new(configs.iter().map(IdentifierRange::from))
    }

    pub fn mode(&self) -> LookupMode {
        self.mode
    }

    pub fn ranges(&self) -> &[IdentifierRange] {
        &self.ranges
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    /// Whether any enabled range contains `value`.
    pub fn contains(&self, value: u128) -> bool {
        match self.mode {
            LookupMode::Binary => self.contains_binary(value),
            LookupMode::Linear => self.contains_linear(value),
        }
    }

    /// Rightmost range with `start <= value`, then check its end.
    /// Only correct when ranges are disjoint.
    pub fn contains_binary(&self, value: u128) -> bool {
        let idx = self.ranges.partition_point(|r| r.start <= value);
        idx > 0 && value <= self.ranges[idx - 1].end
    }

    pub fn contains_linear(&self, value: u128) -> bool {
        self.ranges.iter().any(|r| r.contains(value))
    }

    /// Name of the first range containing `value`, for reporting.
    pub fn range_for(&self, value: u128) -> Option<&str> {
        self.ranges
            .iter()
            .find(|r| r.contains(value))
            .map(|r| r.name.as_str())
    }
}

/// Whether `identifier` is in scope for `ranges`.
///
/// Identifiers that are not plain decimal numbers are never in scope.
pub fn classify(identifier: &str, ranges: &RangeSet) -> bool {
    parse_identifier(identifier).is_some_and(|v| ranges.contains(v))
}

pub(crate) fn parse_identifier(identifier: &str) -> Option<u128> {
    let trimmed = identifier.trim();
    if trimmed.is_empty() || !trimmed.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    trimmed.parse::<u128>().ok()
}
