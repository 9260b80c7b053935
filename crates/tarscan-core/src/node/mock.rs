use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::error::CoreError;

use super::{Endpoint, NodeTransport};

/// A mock explorer node for testing. Returns canned bodies per endpoint,
/// populated via the builder pattern, and counts every call.
pub struct MockNode {
    responses: HashMap<Endpoint, Result<serde_json::Value, CoreError>>,
    delay: Duration,
    calls: Mutex<Vec<Endpoint>>,
}

impl MockNode {
    pub fn builder() -> MockNodeBuilder {
        MockNodeBuilder {
            responses: HashMap::new(),
            delay: Duration::ZERO,
        }
    }

    /// Total number of calls across all endpoints.
    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    pub fn calls_to(&self, endpoint: &Endpoint) -> usize {
        self.calls.lock().iter().filter(|e| *e == endpoint).count()
    }
}

pub struct MockNodeBuilder {
    responses: HashMap<Endpoint, Result<serde_json::Value, CoreError>>,
    delay: Duration,
}

impl MockNodeBuilder {
    pub fn with_body(mut self, endpoint: Endpoint, body: serde_json::Value) -> Self {
        self.responses.insert(endpoint, Ok(body));
        self
    }

    pub fn with_error(mut self, endpoint: Endpoint, error: CoreError) -> Self {
        self.responses.insert(endpoint, Err(error));
        self
    }

    /// Simulated network latency applied to every call.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn build(self) -> MockNode {
        MockNode {
            responses: self.responses,
            delay: self.delay,
            calls: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl NodeTransport for MockNode {
    async fn get_json(&self, endpoint: &Endpoint) -> Result<serde_json::Value, CoreError> {
        self.calls.lock().push(endpoint.clone());
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.responses.get(endpoint).cloned().unwrap_or_else(|| {
            Err(CoreError::Transport(crate::error::TransportError::Status {
                status: 404,
                body: format!("no canned response for {endpoint}"),
            }))
        })
    }
}

mod tests {
    use super::*;
    use crate::test_util::summary_json;

    #[tokio::test]
    async fn unknown_endpoint_is_a_transport_error() {
        let node = MockNode::builder()
            .with_body(Endpoint::Summary, summary_json(3))
            .build();

        assert!(node.get_json(&Endpoint::Summary).await.is_ok());
        let err = node
            .get_json(&Endpoint::HeadersRange { from: 0, limit: 1 })
            .await
            .expect_err("no canned response");
        assert!(err.to_string().contains("no canned response"));
        assert_eq!(node.call_count(), 2);
        assert_eq!(node.calls_to(&Endpoint::Summary), 1);
    }
}
