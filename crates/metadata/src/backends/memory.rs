//! In-memory KV store for tests and local development.

use crate::error::MetadataResult;
use crate::kv::KvStore;
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashMap;
use tokio::sync::RwLock;

/// KV store holding everything in process memory.
#[derive(Default)]
pub struct MemoryKv {
    entries: RwLock<HashMap<String, Bytes>>,
}

impl MemoryKv {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored keys (test observability).
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    /// Whether the store is empty.
    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[async_trait]
impl KvStore for MemoryKv {
    async fn lookup(&self, key: &str) -> MetadataResult<Option<Bytes>> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn insert(&self, key: &str, value: Bytes) -> MetadataResult<()> {
        self.entries.write().await.insert(key.to_string(), value);
        Ok(())
    }

    async fn delete(&self, key: &str) -> MetadataResult<()> {
        self.entries.write().await.remove(key);
        Ok(())
    }
}
