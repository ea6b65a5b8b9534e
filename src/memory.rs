use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{Result, bail};
use async_trait::async_trait;
use parking_lot::RwLock;

use crate::store::{KvPair, RawKvStore};

/// In-process ordered store for local runs and tests
#[derive(Default)]
pub struct MemoryStore {
    data: RwLock<BTreeMap<String, Vec<u8>>>,
    closed: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.data.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.read().is_empty()
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            bail!("memory store is closed");
        }
        Ok(())
    }
}

#[async_trait]
impl RawKvStore for MemoryStore {
    async fn batch_get(&self, keys: Vec<String>) -> Result<Vec<KvPair>> {
        self.ensure_open()?;
        let data = self.data.read();
        Ok(keys
            .into_iter()
            .filter_map(|key| {
                let value = data.get(&key)?.clone();
                Some(KvPair { key, value })
            })
            .collect())
    }

    async fn batch_put(&self, pairs: Vec<KvPair>) -> Result<()> {
        self.ensure_open()?;
        let mut data = self.data.write();
        for pair in pairs {
            data.insert(pair.key, pair.value);
        }
        Ok(())
    }

    async fn batch_delete(&self, keys: Vec<String>) -> Result<()> {
        self.ensure_open()?;
        let mut data = self.data.write();
        for key in &keys {
            data.remove(key);
        }
        Ok(())
    }

    async fn scan(&self, start_key: &str, limit: usize) -> Result<Vec<KvPair>> {
        self.ensure_open()?;
        let data = self.data.read();
        Ok(data
            .range::<str, _>((Bound::Included(start_key), Bound::Unbounded))
            .take(limit)
            .map(|(k, v)| KvPair::new(k.clone(), v.clone()))
            .collect())
    }

    async fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            bail!("memory store already closed");
        }
        if self.is_empty() {
            tracing::info!("Memory store closed");
        } else {
            tracing::info!("Memory store closed with {} keys", self.len());
        }
        Ok(())
    }
}
