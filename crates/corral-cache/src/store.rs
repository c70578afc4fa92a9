//! Key-value collaborator seam for the cache layer.
//!
//! The store holds opaque payloads with absolute expiry timestamps plus a
//! reverse tag index. The in-memory implementation guards its maps with
//! `tokio::sync::RwLock`; multiple in-flight requests share one store.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeSet, HashMap};
use tokio::sync::RwLock;

/// Time source. Injectable so expiry is testable with simulated time.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// One cached payload with its absolute expiry.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    pub payload: serde_json::Value,
    pub expires_at: DateTime<Utc>,
}

/// Key-value collaborator: get/set/delete plus tag-set primitives.
#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn get(&self, key: &str) -> anyhow::Result<Option<CacheEntry>>;

    async fn set(&self, key: &str, entry: CacheEntry) -> anyhow::Result<()>;

    async fn delete(&self, key: &str) -> anyhow::Result<()>;

    /// Record `key` under `tag` in the reverse index.
    async fn tag_key(&self, tag: &str, key: &str) -> anyhow::Result<()>;

    /// Remove a tag's index entry and return the keys it held.
    async fn take_tag(&self, tag: &str) -> anyhow::Result<BTreeSet<String>>;
}

/// Process-local store for tests and embedded use.
#[derive(Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<String, CacheEntry>>,
    tags: RwLock<HashMap<String, BTreeSet<String>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CacheStore for MemoryStore {
    async fn get(&self, key: &str) -> anyhow::Result<Option<CacheEntry>> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn set(&self, key: &str, entry: CacheEntry) -> anyhow::Result<()> {
        self.entries.write().await.insert(key.to_string(), entry);
        Ok(())
    }

    async fn delete(&self, key: &str) -> anyhow::Result<()> {
        self.entries.write().await.remove(key);
        Ok(())
    }

    async fn tag_key(&self, tag: &str, key: &str) -> anyhow::Result<()> {
        self.tags
            .write()
            .await
            .entry(tag.to_string())
            .or_default()
            .insert(key.to_string());
        Ok(())
    }

    async fn take_tag(&self, tag: &str) -> anyhow::Result<BTreeSet<String>> {
        Ok(self.tags.write().await.remove(tag).unwrap_or_default())
    }
}
