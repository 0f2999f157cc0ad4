//! Dispatch of deactivation tasks: chunking, worker pool, retries.

mod engine;
mod rate_limiter;
mod types;

pub use engine::{DispatchContext, DispatchEngine};
pub use rate_limiter::{RequestLimiter, TokenBucket};
pub use types::*;
