//! Range classification and selection of records to deactivate.

mod range_set;
mod selection;

pub use range_set::{classify, IdentifierRange, InvalidRange, LookupMode, RangeSet};
pub use selection::{select_in_scope, Selection};
