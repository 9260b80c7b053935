pub mod cache;
pub mod error;
pub mod explorer;
pub mod format;
pub mod node;
pub mod search;
pub mod types;

#[cfg(test)]
mod test_util;

pub use cache::{CacheConfig, QueryCache, QueryKey, QueryOptions, QueryState, QueryStatus};
pub use error::{CoreError, TransportError};
pub use explorer::{Explorer, ExplorerConfig, LiveQuery, QueryData, QueryResult};
pub use node::{Endpoint, HttpNodeClient, NodeTransport};
pub use search::{kernel_search, payref_search, RecordQuery};
pub use types::{BlockData, BlockId, RecordKind};
