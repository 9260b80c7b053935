//! Query accessors consumed by the presentation layer.
//!
//! [`Explorer`] ties the node transport to a [`QueryCache`]: every accessor
//! derives its cache key from the [`Endpoint`] it reads, decodes the body
//! into typed records before caching, and reports the outcome as a
//! [`QueryResult`] instead of returning `Err`.

use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;

use crate::cache::{
    fetcher, CacheConfig, Fetcher, QueryCache, QueryOptions, QueryState, QueryStatus,
    Subscription, DEFAULT_POLL_INTERVAL,
};
use crate::error::CoreError;
use crate::node::parsing::{decode_block, decode_headers, decode_search_results, decode_summary};
use crate::node::{Endpoint, NodeTransport};
use crate::types::{Block, BlockData, BlockHeader, BlockId, ChainSummary, RecordKind};

// ==============================================================================
// Configuration
// ==============================================================================

#[derive(Debug, Clone)]
pub struct ExplorerConfig {
    /// Refresh interval for the chain summary while it is watched.
    pub summary_poll_interval: Duration,
    pub cache: CacheConfig,
}

impl Default for ExplorerConfig {
    fn default() -> Self {
        Self {
            summary_poll_interval: DEFAULT_POLL_INTERVAL,
            cache: CacheConfig::default(),
        }
    }
}

// ==============================================================================
// Cached Payloads
// ==============================================================================

/// Everything the explorer caches, one case per accessor.
#[derive(Debug, Clone)]
pub enum QueryData {
    Summary(Arc<ChainSummary>),
    Headers(Arc<Vec<BlockHeader>>),
    Block(Arc<Block>),
    BlockData(Arc<BlockData>),
    SearchResults(Arc<Vec<Block>>),
}

/// Typed view of one [`QueryData`] case.
pub trait FromQueryData: Sized {
    fn from_query_data(data: QueryData) -> Option<Arc<Self>>;
}

impl FromQueryData for ChainSummary {
    fn from_query_data(data: QueryData) -> Option<Arc<Self>> {
        match data {
            QueryData::Summary(summary) => Some(summary),
            _ => None,
        }
    }
}

impl FromQueryData for Vec<BlockHeader> {
    fn from_query_data(data: QueryData) -> Option<Arc<Self>> {
        match data {
            QueryData::Headers(headers) => Some(headers),
            _ => None,
        }
    }
}

impl FromQueryData for Block {
    fn from_query_data(data: QueryData) -> Option<Arc<Self>> {
        match data {
            QueryData::Block(block) => Some(block),
            _ => None,
        }
    }
}

impl FromQueryData for BlockData {
    fn from_query_data(data: QueryData) -> Option<Arc<Self>> {
        match data {
            QueryData::BlockData(page) => Some(page),
            _ => None,
        }
    }
}

impl FromQueryData for Vec<Block> {
    fn from_query_data(data: QueryData) -> Option<Arc<Self>> {
        match data {
            QueryData::SearchResults(blocks) => Some(blocks),
            _ => None,
        }
    }
}

// ==============================================================================
// Query Results
// ==============================================================================

/// What an accessor hands to the presentation layer.
#[derive(Debug, Clone)]
pub struct QueryResult<T> {
    pub data: Option<Arc<T>>,
    pub status: QueryStatus,
    pub is_loading: bool,
    pub is_error: bool,
    pub is_fetching: bool,
    pub error: Option<CoreError>,
}

impl<T: FromQueryData> QueryResult<T> {
    fn from_state(state: QueryState<QueryData>) -> Self {
        Self {
            status: state.status,
            is_loading: state.is_loading(),
            is_error: state.is_error(),
            is_fetching: state.is_fetching,
            data: state.data.and_then(T::from_query_data),
            error: state.error,
        }
    }
}

/// A polled subscription to one accessor. Dropping it stops the polling.
pub struct LiveQuery<T> {
    subscription: Subscription<QueryData>,
    _payload: PhantomData<fn() -> T>,
}

impl<T: FromQueryData> LiveQuery<T> {
    pub fn state(&self) -> QueryResult<T> {
        QueryResult::from_state(self.subscription.state())
    }

    /// Wait for the next refresh to settle. `None` once the cache is disposed.
    pub async fn changed(&mut self) -> Option<QueryResult<T>> {
        self.subscription.changed().await.map(QueryResult::from_state)
    }
}

// ==============================================================================
// Explorer
// ==============================================================================

/// Read-only accessors over an explorer node, backed by a shared cache.
#[derive(Clone)]
pub struct Explorer {
    transport: Arc<dyn NodeTransport>,
    cache: QueryCache<QueryData>,
    config: ExplorerConfig,
}

impl Explorer {
    pub fn new(transport: Arc<dyn NodeTransport>, config: ExplorerConfig) -> Self {
        let cache = QueryCache::new(config.cache.clone());
        Self::with_cache(transport, cache, config)
    }

    /// Build on an existing cache, e.g. one shared with another explorer.
    pub fn with_cache(
        transport: Arc<dyn NodeTransport>,
        cache: QueryCache<QueryData>,
        config: ExplorerConfig,
    ) -> Self {
        Self {
            transport,
            cache,
            config,
        }
    }

    pub fn cache(&self) -> &QueryCache<QueryData> {
        &self.cache
    }

    /// Chain summary (`/?json`).
    pub async fn all_blocks(&self) -> QueryResult<ChainSummary> {
        let endpoint = Endpoint::Summary;
        let state = self
            .cache
            .fetch(
                endpoint.query_key(),
                self.summary_fetcher(&endpoint),
                self.summary_options(),
            )
            .await;
        QueryResult::from_state(state)
    }

    /// Chain summary, re-fetched every `summary_poll_interval` while the
    /// returned handle is alive.
    pub fn watch_all_blocks(&self) -> LiveQuery<ChainSummary> {
        let endpoint = Endpoint::Summary;
        let subscription = self.cache.subscribe(
            endpoint.query_key(),
            self.summary_fetcher(&endpoint),
            self.summary_options(),
        );
        LiveQuery {
            subscription,
            _payload: PhantomData,
        }
    }

    /// Up to `limit` headers starting at height `from`.
    pub async fn blocks_by_range(&self, from: u64, limit: u64) -> QueryResult<Vec<BlockHeader>> {
        let endpoint = Endpoint::HeadersRange { from, limit };
        let fetch = self.query_fetcher(&endpoint, |raw| {
            decode_headers(raw).map(|headers| QueryData::Headers(Arc::new(headers)))
        });
        self.run(&endpoint, fetch).await
    }

    pub async fn block_by_height_or_hash(&self, block: &BlockId) -> QueryResult<Block> {
        let endpoint = Endpoint::Block(block.clone());
        let fetch = self.query_fetcher(&endpoint, |raw| {
            decode_block(raw).map(|block| QueryData::Block(Arc::new(block)))
        });
        self.run(&endpoint, fetch).await
    }

    /// Records `from..to` of one sub-record kind of a block.
    ///
    /// `to < from` is rejected before any I/O; `to == from` is an empty page.
    /// The page is returned as the node sent it and may be shorter than
    /// `to - from` near the end of the block.
    pub async fn paginated_block_data(
        &self,
        block: &BlockId,
        kind: RecordKind,
        from: u64,
        to: u64,
    ) -> QueryResult<BlockData> {
        if to < from {
            return QueryResult::from_state(QueryState::failed(CoreError::Validation(format!(
                "range end {to} is before range start {from}"
            ))));
        }
        if to == from {
            let empty = QueryData::BlockData(Arc::new(BlockData::empty(kind)));
            return QueryResult::from_state(QueryState::ready(empty));
        }

        let endpoint = Endpoint::BlockData {
            block: block.clone(),
            kind,
            from,
            to,
        };
        let fetch = self.query_fetcher(&endpoint, move |raw| {
            kind.decode_page(raw)
                .map(|page| QueryData::BlockData(Arc::new(page)))
        });
        self.run(&endpoint, fetch).await
    }

    /// Server-side kernel search by nonce and signature lists.
    ///
    /// Blank entries are dropped; with nothing left to search for the
    /// request is rejected without I/O.
    pub async fn search_by_kernel(
        &self,
        nonces: &[String],
        signatures: &[String],
    ) -> QueryResult<Vec<Block>> {
        let clean = |items: &[String]| -> Vec<String> {
            items
                .iter()
                .map(|s| s.trim())
                .filter(|s| !s.is_empty())
                .map(str::to_owned)
                .collect()
        };
        let (nonces, signatures) = (clean(nonces), clean(signatures));
        if nonces.is_empty() && signatures.is_empty() {
            return QueryResult::from_state(QueryState::failed(CoreError::Validation(
                "kernel search needs at least one nonce or signature".to_owned(),
            )));
        }

        let endpoint = Endpoint::SearchKernels { nonces, signatures };
        let fetch = self.query_fetcher(&endpoint, |raw| {
            decode_search_results(raw).map(|blocks| QueryData::SearchResults(Arc::new(blocks)))
        });
        self.run(&endpoint, fetch).await
    }

    async fn run<T: FromQueryData>(
        &self,
        endpoint: &Endpoint,
        fetch: Fetcher<QueryData>,
    ) -> QueryResult<T> {
        let state = self
            .cache
            .fetch(endpoint.query_key(), fetch, QueryOptions::default())
            .await;
        QueryResult::from_state(state)
    }

    fn summary_options(&self) -> QueryOptions {
        QueryOptions::polled(self.config.summary_poll_interval)
    }

    fn summary_fetcher(&self, endpoint: &Endpoint) -> Fetcher<QueryData> {
        self.query_fetcher(endpoint, |raw| {
            decode_summary(raw).map(|summary| QueryData::Summary(Arc::new(summary)))
        })
    }

    /// One transport call followed by decoding, so only typed records ever
    /// reach the cache.
    fn query_fetcher<D>(&self, endpoint: &Endpoint, decode: D) -> Fetcher<QueryData>
    where
        D: Fn(serde_json::Value) -> Result<QueryData, CoreError> + Send + Sync + 'static,
    {
        let transport = Arc::clone(&self.transport);
        let endpoint = endpoint.clone();
        let decode = Arc::new(decode);
        fetcher(move || {
            let transport = Arc::clone(&transport);
            let endpoint = endpoint.clone();
            let decode = Arc::clone(&decode);
            async move {
                let raw = transport.get_json(&endpoint).await?;
                decode(raw)
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::error::TransportError;
    use crate::node::mock::MockNode;
    use crate::node::BLOCK_NOT_FOUND;
    use crate::search::{kernel_search, payref_search};
    use crate::test_util::{block_json, header_json, kernels_page_json, summary_json};

    fn explorer(node: Arc<MockNode>) -> Explorer {
        Explorer::new(node, ExplorerConfig::default())
    }

    fn kernels_page(block: u64, from: u64, to: u64) -> Endpoint {
        Endpoint::BlockData {
            block: BlockId::Height(block),
            kind: RecordKind::Kernels,
            from,
            to,
        }
    }

    #[tokio::test]
    async fn all_blocks_is_cached_after_first_fetch() {
        let node = Arc::new(
            MockNode::builder()
                .with_body(Endpoint::Summary, summary_json(900))
                .build(),
        );
        let explorer = explorer(node.clone());

        let first = explorer.all_blocks().await;
        let second = explorer.all_blocks().await;

        assert!(!first.is_error);
        assert_eq!(first.data.as_ref().and_then(|s| s.tip_height()), Some(900));
        assert_eq!(second.status, QueryStatus::Fresh);
        assert_eq!(node.calls_to(&Endpoint::Summary), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_accessor_calls_share_one_request() {
        let node = Arc::new(
            MockNode::builder()
                .with_body(Endpoint::Summary, summary_json(1))
                .with_delay(Duration::from_millis(100))
                .build(),
        );
        let explorer = explorer(node.clone());

        let (a, b) = tokio::join!(explorer.all_blocks(), explorer.all_blocks());
        assert!(a.data.is_some() && b.data.is_some());
        assert_eq!(node.call_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn watched_summary_is_polled() {
        let node = Arc::new(
            MockNode::builder()
                .with_body(Endpoint::Summary, summary_json(1))
                .build(),
        );
        let explorer = explorer(node.clone());

        let live = explorer.watch_all_blocks();
        tokio::time::sleep(DEFAULT_POLL_INTERVAL * 2 + Duration::from_secs(10)).await;
        assert_eq!(node.calls_to(&Endpoint::Summary), 3);
        assert!(live.state().data.is_some());

        drop(live);
        tokio::time::sleep(DEFAULT_POLL_INTERVAL * 3).await;
        assert_eq!(node.calls_to(&Endpoint::Summary), 3);
    }

    #[tokio::test]
    async fn range_keys_resolve_independently() {
        let failing = Endpoint::HeadersRange { from: 20, limit: 50 };
        let node = Arc::new(
            MockNode::builder()
                .with_body(
                    Endpoint::HeadersRange { from: 10, limit: 50 },
                    json!({"headers": [header_json(10), header_json(11)]}),
                )
                .with_error(
                    failing.clone(),
                    TransportError::Status {
                        status: 503,
                        body: "busy".to_owned(),
                    }
                    .into(),
                )
                .build(),
        );
        let explorer = explorer(node.clone());

        let ok = explorer.blocks_by_range(10, 50).await;
        let bad = explorer.blocks_by_range(20, 50).await;

        assert_eq!(ok.data.as_ref().map(|h| h.len()), Some(2));
        assert!(!ok.is_error);
        assert!(bad.is_error);
        assert!(bad.data.is_none());
        assert_eq!(explorer.cache().len(), 2);
        assert_eq!(node.calls_to(&failing), 1);
    }

    #[tokio::test]
    async fn block_lookup_surfaces_not_found() {
        let node = Arc::new(
            MockNode::builder()
                .with_body(Endpoint::Block(BlockId::Height(5)), block_json(5))
                .with_error(
                    Endpoint::Block(BlockId::Height(6)),
                    CoreError::NotFound(BLOCK_NOT_FOUND.to_owned()),
                )
                .build(),
        );
        let explorer = explorer(node);

        let found = explorer.block_by_height_or_hash(&BlockId::Height(5)).await;
        let missing = explorer.block_by_height_or_hash(&BlockId::Height(6)).await;

        assert_eq!(found.data.map(|b| b.header.height), Some(5));
        assert!(missing.is_error);
        let err = missing.error.expect("error must be stored");
        assert!(err.is_not_found());
        assert_eq!(err.to_string(), "Block not found");
    }

    #[tokio::test]
    async fn empty_range_returns_empty_page_without_io() {
        let node = Arc::new(MockNode::builder().build());
        let explorer = explorer(node.clone());

        let page = explorer
            .paginated_block_data(&BlockId::Height(1), RecordKind::Outputs, 5, 5)
            .await;

        assert!(!page.is_error);
        let data = page.data.expect("empty page must be returned");
        assert!(data.is_empty());
        assert_eq!(data.kind(), RecordKind::Outputs);
        assert_eq!(node.call_count(), 0);
    }

    #[tokio::test]
    async fn inverted_range_is_a_validation_error() {
        let node = Arc::new(MockNode::builder().build());
        let explorer = explorer(node.clone());

        let page = explorer
            .paginated_block_data(&BlockId::Height(1), RecordKind::Kernels, 10, 5)
            .await;

        assert!(page.is_error);
        assert!(matches!(page.error, Some(CoreError::Validation(_))));
        assert_eq!(node.call_count(), 0);
        assert!(explorer.cache().is_empty());
    }

    #[tokio::test]
    async fn pages_are_cached_per_range() {
        let node = Arc::new(
            MockNode::builder()
                .with_body(kernels_page(3, 0, 10), kernels_page_json(10))
                .with_body(kernels_page(3, 10, 20), kernels_page_json(4))
                .build(),
        );
        let explorer = explorer(node.clone());
        let block = BlockId::Height(3);

        let first = explorer
            .paginated_block_data(&block, RecordKind::Kernels, 0, 10)
            .await;
        let again = explorer
            .paginated_block_data(&block, RecordKind::Kernels, 0, 10)
            .await;
        let tail = explorer
            .paginated_block_data(&block, RecordKind::Kernels, 10, 20)
            .await;

        assert_eq!(first.data.as_ref().map(|p| p.len()), Some(10));
        assert_eq!(again.data.as_ref().map(|p| p.len()), Some(10));
        // Short page near the end is returned as-is.
        assert_eq!(tail.data.as_ref().map(|p| p.len()), Some(4));
        assert_eq!(node.calls_to(&kernels_page(3, 0, 10)), 1);
        assert_eq!(node.call_count(), 2);
    }

    #[tokio::test]
    async fn fetched_page_feeds_the_matchers() {
        let outputs = Endpoint::BlockData {
            block: BlockId::Height(8),
            kind: RecordKind::Outputs,
            from: 0,
            to: 2,
        };
        let node = Arc::new(
            MockNode::builder()
                .with_body(kernels_page(8, 0, 3), kernels_page_json(3))
                .with_body(
                    outputs,
                    json!({"outputs": [
                        {"payment_reference": {"data": [0xaa]}},
                        {"payment_reference": {"data": [0xbe, 0xef]}}
                    ]}),
                )
                .build(),
        );
        let explorer = explorer(node);
        let block = BlockId::Height(8);

        let kernels = explorer
            .paginated_block_data(&block, RecordKind::Kernels, 0, 3)
            .await
            .data
            .expect("kernel page");
        let BlockData::Kernels(kernels) = &*kernels else {
            panic!("expected kernels page");
        };
        // Nonce of kernel i is [i, 0x11].
        assert_eq!(kernel_search("0211", "", Some(kernels.as_slice())), Some(2));

        let outputs = explorer
            .paginated_block_data(&block, RecordKind::Outputs, 0, 2)
            .await
            .data
            .expect("output page");
        let BlockData::Outputs(outputs) = &*outputs else {
            panic!("expected outputs page");
        };
        assert_eq!(payref_search("BEEF", Some(outputs.as_slice())), Some(1));
    }

    #[tokio::test]
    async fn malformed_body_is_a_transport_error() {
        let node = Arc::new(
            MockNode::builder()
                .with_body(Endpoint::Summary, json!({"headers": "nope"}))
                .build(),
        );
        let explorer = explorer(node);

        let result = explorer.all_blocks().await;
        assert!(result.is_error);
        assert!(matches!(
            result.error,
            Some(CoreError::Transport(TransportError::InvalidBody(_)))
        ));
    }

    #[tokio::test]
    async fn kernel_search_rejects_blank_queries() {
        let search = Endpoint::SearchKernels {
            nonces: vec!["aa".to_owned()],
            signatures: Vec::new(),
        };
        let node = Arc::new(
            MockNode::builder()
                .with_body(search.clone(), json!({"items": [block_json(4)]}))
                .build(),
        );
        let explorer = explorer(node.clone());

        let blank = explorer
            .search_by_kernel(&["  ".to_owned()], &[])
            .await;
        assert!(matches!(blank.error, Some(CoreError::Validation(_))));
        assert_eq!(node.call_count(), 0);

        let hits = explorer
            .search_by_kernel(&["aa".to_owned(), String::new()], &[])
            .await;
        assert_eq!(hits.data.map(|b| b.len()), Some(1));
        assert_eq!(node.calls_to(&search), 1);
    }
}
