//! Per-file accounting and the completion verdict.

mod aggregator;
mod types;

pub use aggregator::OutcomeAggregator;
pub use types::*;
