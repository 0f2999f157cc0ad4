//! Mock deactivation endpoint for testing.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use crate::endpoint::{DeactivationEndpoint, EndpointResponse, ExpireMetadata, TransportError};

/// One scripted reply.
#[derive(Debug, Clone)]
pub enum MockReply {
    /// HTTP status with no business code.
    Status(u16),
    Response(EndpointResponse),
    /// Fail immediately as if the request timed out.
    Timeout,
    /// Fail immediately as if the connection was refused.
    ConnectError,
    /// Sleep, then succeed.
    Delay(Duration),
}

/// A recorded call for test assertions.
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub identifier: String,
    pub metadata: ExpireMetadata,
}

/// Mock implementation of [`DeactivationEndpoint`].
///
/// Replies are scripted per identifier and consumed in order. Once a
/// script runs out (or for identifiers without one) the default reply is
/// used, which is a plain success unless changed.
///
/// # Example
///
/// ```rust,ignore
/// use deactivator_core::testing::{MockEndpoint, MockReply};
///
/// let endpoint = MockEndpoint::new();
/// endpoint.script("89238010000101000001", vec![MockReply::Status(503), MockReply::Status(200)]);
///
/// // ... dispatch ...
///
/// assert_eq!(endpoint.calls_for("89238010000101000001"), 2);
/// ```
#[derive(Debug)]
pub struct MockEndpoint {
    scripts: Mutex<HashMap<String, VecDeque<MockReply>>>,
    default_reply: Mutex<MockReply>,
    calls: Mutex<Vec<RecordedCall>>,
    in_flight: Arc<AtomicUsize>,
    max_in_flight: Arc<AtomicUsize>,
}

impl Default for MockEndpoint {
    fn default() -> Self {
        Self::new()
    }
}

impl MockEndpoint {
    pub fn new() -> Self {
        Self {
            scripts: Mutex::new(HashMap::new()),
            default_reply: Mutex::new(MockReply::Response(EndpointResponse::success())),
            calls: Mutex::new(Vec::new()),
            in_flight: Arc::new(AtomicUsize::new(0)),
            max_in_flight: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Queue replies for an identifier, after any already queued.
    pub fn script(&self, identifier: &str, replies: Vec<MockReply>) {
        self.scripts
            .lock()
            .unwrap()
            .entry(identifier.to_string())
            .or_default()
            .extend(replies);
    }

    /// Reply used when no script applies.
    pub fn set_default(&self, reply: MockReply) {
        *self.default_reply.lock().unwrap() = reply;
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn total_calls(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn calls_for(&self, identifier: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.identifier == identifier)
            .count()
    }

    /// Identifiers in the order the calls started.
    pub fn call_order(&self) -> Vec<String> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .map(|c| c.identifier.clone())
            .collect()
    }

    /// Highest number of calls that were running at the same time.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    pub fn clear_calls(&self) {
        self.calls.lock().unwrap().clear();
    }

    fn next_reply(&self, identifier: &str) -> MockReply {
        let scripted = self
            .scripts
            .lock()
            .unwrap()
            .get_mut(identifier)
            .and_then(|queue| queue.pop_front());
        scripted.unwrap_or_else(|| self.default_reply.lock().unwrap().clone())
    }
}

struct InFlightGuard(Arc<AtomicUsize>);

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl DeactivationEndpoint for MockEndpoint {
    async fn expire(
        &self,
        identifier: &str,
        metadata: &ExpireMetadata,
    ) -> Result<EndpointResponse, TransportError> {
        self.calls.lock().unwrap().push(RecordedCall {
            identifier: identifier.to_string(),
            metadata: metadata.clone(),
        });

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        let _guard = InFlightGuard(self.in_flight.clone());

        match self.next_reply(identifier) {
            MockReply::Status(status) => Ok(EndpointResponse::new(status, None, "")),
            MockReply::Response(response) => Ok(response),
            MockReply::Timeout => Err(TransportError::Timeout),
            MockReply::ConnectError => {
                Err(TransportError::Connect("connection refused".to_string()))
            }
            MockReply::Delay(delay) => {
                tokio::time::sleep(delay).await;
                Ok(EndpointResponse::success())
            }
        }
    }
}
