//! # corral-cache
//!
//! Query result caching: key derivation from the query IR, TTL entries,
//! and tag-based invalidation. Storage lives behind the [`CacheStore`]
//! collaborator seam; the in-memory default is safe for concurrent
//! requests. Cache failures are never fatal — a broken store degrades to
//! misses and dropped writes, logged at `warn`.
//!
//! There is no single-flight de-duplication: concurrent identical requests
//! may each miss and each populate the cache, and the last write wins.

pub mod store;

use chrono::Duration;
use corral_core::config::CacheSettings;
use corral_core::spec::QuerySpec;
use sha2::{Digest, Sha256};
use std::sync::Arc;

pub use store::{CacheEntry, CacheStore, Clock, MemoryStore, SystemClock};

/// Predicate deciding whether a given query's results should be cached.
pub type CachePolicy = Box<dyn Fn(&QuerySpec) -> bool + Send + Sync>;

/// The cache layer: key derivation, get/set with TTL, tag invalidation.
pub struct QueryCache {
    store: Arc<dyn CacheStore>,
    clock: Arc<dyn Clock>,
    settings: CacheSettings,
    policy: Option<CachePolicy>,
}

impl QueryCache {
    pub fn new(store: Arc<dyn CacheStore>, settings: CacheSettings) -> Self {
        Self {
            store,
            clock: Arc::new(SystemClock),
            settings,
            policy: None,
        }
    }

    /// A cache over the in-memory store.
    pub fn in_memory(settings: CacheSettings) -> Self {
        Self::new(Arc::new(MemoryStore::new()), settings)
    }

    /// Replace the time source. Tests use this to simulate expiry.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Install a should-cache predicate over the query spec.
    pub fn with_policy(mut self, policy: impl Fn(&QuerySpec) -> bool + Send + Sync + 'static) -> Self {
        self.policy = Some(Box::new(policy));
        self
    }

    /// Derive the cache key for a spec: the explicitly configured key when
    /// present, otherwise a digest of the spec's deterministic
    /// serialization.
    pub fn cache_key(spec: &QuerySpec) -> String {
        if let Some(key) = spec.cache.as_ref().and_then(|c| c.key.clone()) {
            return key;
        }
        let serialized = serde_json::to_string(spec).unwrap_or_default();
        let mut hasher = Sha256::new();
        hasher.update(serialized.as_bytes());
        format!("query:{:x}", hasher.finalize())
    }

    fn should_cache(&self, spec: &QuerySpec) -> bool {
        self.settings.enabled
            && spec.cache.is_some()
            && self.policy.as_ref().is_none_or(|policy| policy(spec))
    }

    /// Look up a cached result. Expired entries are evicted and reported
    /// as misses.
    pub async fn get(&self, spec: &QuerySpec) -> Option<serde_json::Value> {
        if !self.should_cache(spec) {
            return None;
        }
        let key = Self::cache_key(spec);

        let entry = match self.store.get(&key).await {
            Ok(entry) => entry?,
            Err(e) => {
                tracing::warn!(target: "cache", key = %key, error = %e, "cache read failed");
                return None;
            }
        };

        if entry.expires_at <= self.clock.now() {
            tracing::debug!(target: "cache", key = %key, "entry expired, evicting");
            if let Err(e) = self.store.delete(&key).await {
                tracing::warn!(target: "cache", key = %key, error = %e, "failed to evict expired entry");
            }
            return None;
        }

        tracing::debug!(target: "cache", key = %key, "cache hit");
        Some(entry.payload)
    }

    /// Store a result under the spec's key, honoring its TTL and tags.
    /// Write failures are logged and dropped.
    pub async fn set(&self, spec: &QuerySpec, payload: serde_json::Value) {
        if !self.should_cache(spec) {
            return;
        }
        let Some(cache) = &spec.cache else {
            return;
        };

        let key = Self::cache_key(spec);
        let ttl = if cache.ttl > 0 {
            cache.ttl
        } else {
            self.settings.default_ttl_secs
        };
        let entry = CacheEntry {
            payload,
            expires_at: self.clock.now() + Duration::seconds(ttl as i64),
        };

        if let Err(e) = self.store.set(&key, entry).await {
            tracing::warn!(target: "cache", key = %key, error = %e, "cache write failed");
            return;
        }
        for tag in &cache.tags {
            if let Err(e) = self.store.tag_key(tag, &key).await {
                tracing::warn!(target: "cache", key = %key, tag = %tag, error = %e, "tag index write failed");
            }
        }
        tracing::debug!(target: "cache", key = %key, ttl, tags = cache.tags.len(), "cached result");
    }

    /// Drop every entry recorded under any of the named tags, clearing the
    /// tag index entries as well. Returns the number of keys removed.
    pub async fn invalidate_tags(&self, tags: &[String]) -> usize {
        let mut removed = 0;
        for tag in tags {
            let keys = match self.store.take_tag(tag).await {
                Ok(keys) => keys,
                Err(e) => {
                    tracing::warn!(target: "cache", tag = %tag, error = %e, "tag lookup failed");
                    continue;
                }
            };
            for key in keys {
                match self.store.delete(&key).await {
                    Ok(()) => removed += 1,
                    Err(e) => {
                        tracing::warn!(target: "cache", key = %key, error = %e, "tag invalidation delete failed")
                    }
                }
            }
        }
        tracing::debug!(target: "cache", tags = tags.len(), removed, "invalidated by tags");
        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Utc};
    use serde_json::json;
    use std::sync::Mutex;

    /// Manually advanced clock for expiry tests.
    struct ManualClock(Mutex<DateTime<Utc>>);

    impl ManualClock {
        fn starting_now() -> Arc<Self> {
            Arc::new(Self(Mutex::new(Utc::now())))
        }

        fn advance_secs(&self, secs: i64) {
            let mut now = self.0.lock().unwrap();
            *now += Duration::seconds(secs);
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> DateTime<Utc> {
            *self.0.lock().unwrap()
        }
    }

    fn spec_with_cache(key: &str, ttl: u64, tags: &[&str]) -> QuerySpec {
        serde_json::from_value(json!({
            "filter": {"k": key},
            "cache": {"ttl": ttl, "key": key, "tags": tags}
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn round_trip_and_expiry() {
        let clock = ManualClock::starting_now();
        let cache =
            QueryCache::in_memory(CacheSettings::default()).with_clock(clock.clone());

        let spec = spec_with_cache("k", 60, &["t1"]);
        let payload = json!([{"id": 1}]);

        cache.set(&spec, payload.clone()).await;
        assert_eq!(cache.get(&spec).await, Some(payload));

        clock.advance_secs(60);
        assert_eq!(cache.get(&spec).await, None);
        // The expired entry was evicted, not just hidden.
        assert_eq!(cache.get(&spec).await, None);
    }

    #[tokio::test]
    async fn tag_invalidation_removes_all_tagged_keys() {
        let cache = QueryCache::in_memory(CacheSettings::default());

        let a = spec_with_cache("a", 600, &["t1"]);
        let b = spec_with_cache("b", 600, &["t1", "t2"]);
        cache.set(&a, json!(1)).await;
        cache.set(&b, json!(2)).await;

        let removed = cache.invalidate_tags(&["t1".to_string()]).await;
        assert_eq!(removed, 2);
        assert_eq!(cache.get(&a).await, None);
        assert_eq!(cache.get(&b).await, None);

        // The tag index entry itself is gone.
        assert_eq!(cache.invalidate_tags(&["t1".to_string()]).await, 0);
    }

    #[tokio::test]
    async fn key_derivation_prefers_explicit_key() {
        let explicit = spec_with_cache("fixed", 60, &[]);
        assert_eq!(QueryCache::cache_key(&explicit), "fixed");

        let derived: QuerySpec =
            serde_json::from_value(json!({"filter": {"a": 1}, "cache": {"ttl": 60}})).unwrap();
        let key1 = QueryCache::cache_key(&derived);
        let key2 = QueryCache::cache_key(&derived.clone());
        assert_eq!(key1, key2);
        assert!(key1.starts_with("query:"));

        let other: QuerySpec =
            serde_json::from_value(json!({"filter": {"a": 2}, "cache": {"ttl": 60}})).unwrap();
        assert_ne!(key1, QueryCache::cache_key(&other));
    }

    #[tokio::test]
    async fn requests_without_a_cache_directive_bypass_the_cache() {
        let cache = QueryCache::in_memory(CacheSettings::default());
        let spec = QuerySpec::default();
        cache.set(&spec, json!(1)).await;
        assert_eq!(cache.get(&spec).await, None);
    }

    #[tokio::test]
    async fn policy_predicate_can_veto_caching() {
        let cache = QueryCache::in_memory(CacheSettings::default())
            .with_policy(|spec| spec.effective_limit() <= 100);

        let small = spec_with_cache("small", 60, &[]);
        cache.set(&small, json!(1)).await;
        assert_eq!(cache.get(&small).await, Some(json!(1)));

        let mut big = spec_with_cache("big", 60, &[]);
        big.limit = Some(1000);
        cache.set(&big, json!(2)).await;
        assert_eq!(cache.get(&big).await, None);
    }

    #[tokio::test]
    async fn disabled_cache_never_hits() {
        let settings = CacheSettings {
            enabled: false,
            ..Default::default()
        };
        let cache = QueryCache::in_memory(settings);
        let spec = spec_with_cache("k", 60, &[]);
        cache.set(&spec, json!(1)).await;
        assert_eq!(cache.get(&spec).await, None);
    }
}
