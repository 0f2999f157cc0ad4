//! Run coordination: discovery, per-file processing and the run report.
//!
//! One run:
//! - **Discover**: list candidate files, oldest first
//! - **Process**: one file at a time, stage, parse, select, dispatch, conclude
//! - **Report**: exactly one [`RunReport`], sent to the notifier

mod report;
mod runner;

pub use report::{FatalError, FileReport, RunOutcome, RunReport, RunStatus, SkippedFile};
pub use runner::{abort_before_run, CoordinatorSettings, RunCoordinator};
