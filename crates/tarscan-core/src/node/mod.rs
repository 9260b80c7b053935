//! Explorer node transport.
//!
//! Defines the closed set of [`Endpoint`]s the client reads, the
//! [`NodeTransport`] seam, and an HTTP implementation ([`HttpNodeClient`])
//! plus a test mock (`mock::MockNode`).

mod client;
mod connection;
#[cfg(test)]
pub mod mock;
pub(crate) mod parsing;

pub use client::HttpNodeClient;

use async_trait::async_trait;
use reqwest::Url;

use crate::cache::QueryKey;
use crate::error::CoreError;
use crate::types::{BlockId, RecordKind};

/// Message surfaced when a block lookup comes back absent.
pub const BLOCK_NOT_FOUND: &str = "Block not found";

/// One GET against the node's JSON data endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Endpoint {
    /// `/?json`: chain summary.
    Summary,
    /// `/?from={from}&limit={limit}&json`: headers starting at `from`.
    HeadersRange { from: u64, limit: u64 },
    /// `/blocks/{id}?json`.
    Block(BlockId),
    /// `/block_data/{id}?what={kind}&from={from}&to={to}&json`.
    BlockData {
        block: BlockId,
        kind: RecordKind,
        from: u64,
        to: u64,
    },
    /// `/search_kernels?nonces={csv}&signatures={csv}&json`.
    SearchKernels {
        nonces: Vec<String>,
        signatures: Vec<String>,
    },
}

impl Endpoint {
    /// Operation name used in logs and cache keys.
    pub fn operation(&self) -> &'static str {
        match self {
            Self::Summary => "all_blocks",
            Self::HeadersRange { .. } => "blocks_by_range",
            Self::Block(_) => "block_by_height_or_hash",
            Self::BlockData { .. } => "paginated_block_data",
            Self::SearchKernels { .. } => "search_by_kernel",
        }
    }

    /// Cache key; every parameter that changes the URL is part of it.
    pub fn query_key(&self) -> QueryKey {
        let key = QueryKey::new(self.operation());
        match self {
            Self::Summary => key,
            Self::HeadersRange { from, limit } => key.with(*from).with(*limit),
            Self::Block(block) => key.with(block.to_string()),
            Self::BlockData {
                block,
                kind,
                from,
                to,
            } => key
                .with(block.to_string())
                .with(kind.as_str())
                .with(*from)
                .with(*to),
            Self::SearchKernels { nonces, signatures } => {
                key.with(nonces.clone()).with(signatures.clone())
            }
        }
    }

    /// Absolute URL of this endpoint under `base`.
    pub fn url(&self, base: &Url) -> Url {
        let mut url = base.clone();
        let prefix = base.path().trim_end_matches('/');
        match self {
            Self::Summary | Self::HeadersRange { .. } => url.set_path(&format!("{prefix}/")),
            Self::Block(block) => url.set_path(&format!("{prefix}/blocks/{block}")),
            Self::BlockData { block, .. } => url.set_path(&format!("{prefix}/block_data/{block}")),
            Self::SearchKernels { .. } => url.set_path(&format!("{prefix}/search_kernels")),
        }

        url.set_query(None);
        {
            let mut query = url.query_pairs_mut();
            match self {
                Self::Summary | Self::Block(_) => {}
                Self::HeadersRange { from, limit } => {
                    query
                        .append_pair("from", &from.to_string())
                        .append_pair("limit", &limit.to_string());
                }
                Self::BlockData { kind, from, to, .. } => {
                    query
                        .append_pair("what", kind.as_str())
                        .append_pair("from", &from.to_string())
                        .append_pair("to", &to.to_string());
                }
                Self::SearchKernels { nonces, signatures } => {
                    query
                        .append_pair("nonces", &nonces.join(","))
                        .append_pair("signatures", &signatures.join(","));
                }
            }
            query.append_key_only("json");
        }
        url
    }
}

impl std::fmt::Display for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.query_key().fmt(f)
    }
}

/// Minimal read interface to an explorer node.
///
/// Implementations return the raw JSON body; decoding into typed records
/// happens in the accessor layer right after the call.
#[async_trait]
pub trait NodeTransport: Send + Sync {
    async fn get_json(&self, endpoint: &Endpoint) -> Result<serde_json::Value, CoreError>;
}
