//! Raw key-value store client abstraction.
//!
//! Handlers only ever see [`RawKvStore`]. Implementations must be safe to
//! share across concurrent requests without external locking, and every
//! operation is a single batch call that succeeds or fails as a whole from
//! the proxy's point of view.

use std::sync::Arc;

use async_trait::async_trait;

use crate::config::{Config, StoreBackend};
use crate::memory::MemoryStore;
use crate::spanner::SpannerStore;

/// A raw key and its value bytes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KvPair {
    pub key: String,
    pub value: Vec<u8>,
}

impl KvPair {
    pub fn new(key: impl Into<String>, value: impl Into<Vec<u8>>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// Batch-capable client of the backing store
#[async_trait]
pub trait RawKvStore: Send + Sync {
    /// Fetch values for `keys`. Keys without a value are absent from the result.
    async fn batch_get(&self, keys: Vec<String>) -> anyhow::Result<Vec<KvPair>>;

    /// Write every pair in one batch.
    async fn batch_put(&self, pairs: Vec<KvPair>) -> anyhow::Result<()>;

    /// Remove every key in one batch. Missing keys are not an error.
    async fn batch_delete(&self, keys: Vec<String>) -> anyhow::Result<()>;

    /// Return up to `limit` pairs with key >= `start_key`, in key order.
    async fn scan(&self, start_key: &str, limit: usize) -> anyhow::Result<Vec<KvPair>>;

    /// Release the client. Later calls fail with an error.
    async fn close(&self) -> anyhow::Result<()>;
}

/// Shared handle used by every request
pub type SharedStore = Arc<dyn RawKvStore>;

/// Build the store selected by configuration.
///
/// This is the unbounded construction step; startup wraps it with a deadline.
pub async fn connect(config: &Config) -> anyhow::Result<SharedStore> {
    match &config.store_backend {
        StoreBackend::Memory => {
            tracing::info!("Using in-memory raw store");
            Ok(Arc::new(MemoryStore::new()))
        }
        StoreBackend::Spanner(spanner) => {
            let store = SpannerStore::connect(spanner).await?;
            Ok(Arc::new(store))
        }
    }
}
