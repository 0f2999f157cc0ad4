mod events;
mod recorder;
mod sqlite;
mod store;

pub use events::*;
pub use recorder::*;
pub use sqlite::*;
pub use store::*;
