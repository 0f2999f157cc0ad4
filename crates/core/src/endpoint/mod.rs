//! Remote deactivation endpoint.
//!
//! The dispatch engine only sees the [`DeactivationEndpoint`] trait. The
//! production implementation is [`RspClient`]; tests use
//! [`crate::testing::MockEndpoint`].

mod rsp;
mod types;

pub use rsp::RspClient;
pub use types::*;

use async_trait::async_trait;
use thiserror::Error;

/// The call did not produce an HTTP response.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Request timed out")]
    Timeout,

    #[error("Connection failed: {0}")]
    Connect(String),

    #[error("Request failed: {0}")]
    Other(String),
}

/// Something that can expire a card profile.
#[async_trait]
pub trait DeactivationEndpoint: Send + Sync {
    /// Ask the platform to make `identifier` unavailable.
    ///
    /// Any HTTP response, success or not, is returned as `Ok`; only failures
    /// to get a response at all are `Err`.
    async fn expire(
        &self,
        identifier: &str,
        metadata: &ExpireMetadata,
    ) -> Result<EndpointResponse, TransportError>;
}
