//! The cache aspect described in spec §5 and grounded in
//! `original_source/flowpilot-services/shared-libraries/cache.py`: a
//! write-through, TTL-bounded cache wrapping outbound GETs to the Persona
//! Registry, the Delegation Graph, and the rule engine. Entries are keyed by
//! resource family (`persona`, `delegation`, `authz`) plus caller-supplied
//! parameters; a mutating verb invalidates its whole family by bumping a
//! generation counter, which is cheaper than walking every key and leaves
//! superseded entries to fall out on their own TTL.
//!
//! Cache failures never influence a decision: callers treat a cache miss
//! (or a lookup that can't be satisfied) exactly like a cold read.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use moka::future::Cache;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;

/// Identifies one cacheable read: a resource family plus a stable,
/// order-independent parameter key (the caller is responsible for sorting
/// its own params before joining them, e.g. `"user_sub=U1&title=traveler"`).
#[derive(Debug, Clone)]
pub struct CacheKey {
    pub family: &'static str,
    pub key: String,
}

impl CacheKey {
    #[must_use]
    pub fn new(family: &'static str, key: impl Into<String>) -> Self {
        Self {
            family,
            key: key.into(),
        }
    }
}

/// Write-through cache fronting outbound reads. One instance is shared
/// (via `Arc`) across all handlers in a service.
pub struct FamilyCache {
    inner: Cache<String, Arc<Value>>,
    generations: Mutex<HashMap<&'static str, u64>>,
}

impl FamilyCache {
    #[must_use]
    pub fn new(ttl: Duration, max_capacity: u64) -> Self {
        Self {
            inner: Cache::builder()
                .time_to_live(ttl)
                .max_capacity(max_capacity)
                .build(),
            generations: Mutex::new(HashMap::new()),
        }
    }

    fn generation(&self, family: &'static str) -> u64 {
        *self.generations.lock().entry(family).or_insert(0)
    }

    fn render(&self, key: &CacheKey) -> String {
        format!("{}:{}:{}", key.family, self.generation(key.family), key.key)
    }

    /// Fetch from cache, or call `fetch` on a miss and populate the cache
    /// with its result. `fetch`'s error is propagated and never cached.
    pub async fn get_or_fetch<F, Fut, E>(&self, key: &CacheKey, fetch: F) -> Result<Arc<Value>, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Value, E>>,
    {
        let cache_key = self.render(key);
        if let Some(hit) = self.inner.get(&cache_key).await {
            tracing::debug!(family = key.family, "cache hit");
            return Ok(hit);
        }
        let value = Arc::new(fetch().await?);
        self.inner.insert(cache_key, Arc::clone(&value)).await;
        Ok(value)
    }

    /// Invalidate every entry in `family`, called after a mutating verb
    /// (POST/PUT/DELETE) touches that resource family.
    pub fn invalidate_family(&self, family: &'static str) {
        let mut generations = self.generations.lock();
        let next = generations.entry(family).or_insert(0);
        *next = next.wrapping_add(1);
        tracing::debug!(family, "cache family invalidated");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn repeated_reads_hit_cache_until_invalidated() {
        let cache = FamilyCache::new(Duration::from_secs(60), 100);
        let calls = Arc::new(AtomicUsize::new(0));
        let key = CacheKey::new("persona", "user_sub=U1");

        for _ in 0..3 {
            let calls = Arc::clone(&calls);
            let _: Arc<Value> = cache
                .get_or_fetch(&key, || async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok::<_, ()>(Value::String("persona".into()))
                })
                .await
                .unwrap();
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        cache.invalidate_family("persona");
        let calls2 = Arc::clone(&calls);
        let _: Arc<Value> = cache
            .get_or_fetch(&key, || async move {
                calls2.fetch_add(1, Ordering::SeqCst);
                Ok::<_, ()>(Value::String("persona".into()))
            })
            .await
            .unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn fetch_error_is_not_cached() {
        let cache = FamilyCache::new(Duration::from_secs(60), 100);
        let key = CacheKey::new("delegation", "principal=A&delegate=B");
        let first: Result<Arc<Value>, &'static str> =
            cache.get_or_fetch(&key, || async { Err("boom") }).await;
        assert!(first.is_err());
        let second = cache
            .get_or_fetch(&key, || async { Ok::<_, &'static str>(Value::Bool(true)) })
            .await
            .unwrap();
        assert_eq!(*second, Value::Bool(true));
    }
}
