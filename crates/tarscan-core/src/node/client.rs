use std::num::NonZeroU32;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use reqwest::{header, StatusCode, Url};
use tracing::{debug, trace};

use crate::error::{CoreError, TransportError};

use super::connection::parse_base_url;
use super::{Endpoint, NodeTransport, BLOCK_NOT_FOUND};

/// Longest slice of an error body kept in a `TransportError::Status`.
const ERROR_BODY_LIMIT: usize = 512;

type DirectRateLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Explorer node client over HTTP(S).
///
/// Issues one GET per [`Endpoint`] and parses the JSON body. There is no
/// overall request timeout: a stalled request only holds up its own cache
/// key. Only connection establishment is bounded.
pub struct HttpNodeClient {
    client: reqwest::Client,
    base: Url,
    limiter: Option<DirectRateLimiter>,
    next_id: AtomicU64,
}

impl HttpNodeClient {
    /// Create a client for the node at `connection` (`http://` or `https://`).
    ///
    /// If `requests_per_second` is set, outbound requests are rate-limited.
    pub fn new(connection: &str, requests_per_second: Option<u32>) -> Result<Self, CoreError> {
        let base = parse_base_url(connection)?;

        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .pool_max_idle_per_host(32)
            .tcp_nodelay(true)
            .build()
            .map_err(|e| CoreError::Config(format!("build HTTP client: {e}")))?;

        let limiter = match requests_per_second {
            None => None,
            Some(limit) => {
                let limit = NonZeroU32::new(limit).ok_or_else(|| {
                    CoreError::Config("requests_per_second must be at least 1".to_owned())
                })?;
                Some(RateLimiter::direct(Quota::per_second(limit)))
            }
        };

        Ok(Self {
            client,
            base,
            limiter,
            next_id: AtomicU64::new(1),
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base
    }

    async fn wait_for_rate_limit(&self) {
        if let Some(limiter) = &self.limiter {
            limiter.until_ready().await;
        }
    }
}

#[async_trait]
impl NodeTransport for HttpNodeClient {
    async fn get_json(&self, endpoint: &Endpoint) -> Result<serde_json::Value, CoreError> {
        self.wait_for_rate_limit().await;
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let url = endpoint.url(&self.base);
        debug!(
            req.id = id,
            req.operation = endpoint.operation(),
            url = %url,
            "node request"
        );

        let response = self
            .client
            .get(url)
            .header(header::ACCEPT, "application/json")
            .send()
            .await
            .map_err(TransportError::from)?;
        let status = response.status();

        let body = response.text().await.map_err(TransportError::from)?;
        debug!(req.id = id, %status, body_len = body.len(), "node response");
        trace!(req.id = id, body = %body, "node response body");

        if !status.is_success() {
            return Err(normalize_status_error(endpoint, status, body));
        }

        serde_json::from_str(&body).map_err(|e| {
            TransportError::InvalidBody(format!(
                "decode JSON body: {e}; body={}",
                truncate_body(&body)
            ))
            .into()
        })
    }
}

// ==============================================================================
// Error Normalization
// ==============================================================================

/// Map a 404 on a block lookup to `NotFound`, so callers can tell "absent"
/// from "broken". Every other status stays a transport failure.
fn normalize_status_error(endpoint: &Endpoint, status: StatusCode, body: String) -> CoreError {
    let is_block_lookup = matches!(endpoint, Endpoint::Block(_) | Endpoint::BlockData { .. });
    if is_block_lookup && status == StatusCode::NOT_FOUND {
        return CoreError::NotFound(BLOCK_NOT_FOUND.to_owned());
    }

    TransportError::Status {
        status: status.as_u16(),
        body: truncate_body(&body).to_owned(),
    }
    .into()
}

fn truncate_body(body: &str) -> &str {
    if body.len() <= ERROR_BODY_LIMIT {
        return body;
    }
    let mut end = ERROR_BODY_LIMIT;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    &body[..end]
}
