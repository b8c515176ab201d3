use chrono::{DateTime, Utc};
use futures::TryFutureExt;
use log::{debug, warn};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;

use crate::cache_backend::CacheBackend;
use crate::metrics;
use crate::types::PriceState;

/// A cached value and the wall-clock time it was computed.
///
/// `placeholder` marks a value stored because nothing could produce a real one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry<V> {
    pub value: V,
    pub inserted_at: DateTime<Utc>,
    pub placeholder: bool,
}

impl<V> CacheEntry<V> {
    fn served_state(&self, state: PriceState) -> PriceState {
        if self.placeholder {
            PriceState::Unpriced
        } else {
            state
        }
    }
}

/// Outcome of a computation passed to [`PriceCache::get_or_compute_with`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Computed<V> {
    /// Depends only on the key; stored.
    Complete(V),
    /// Depends on how the key was reached; returned but never stored.
    Partial(V),
}

/// Result of [`PriceCache::get_or_compute`].
#[derive(Debug, Clone, PartialEq)]
pub struct Resolved<V> {
    pub value: V,
    pub computed_at: DateTime<Utc>,
    pub state: PriceState,
}

/// TTL-aware memoization over a [`CacheBackend`] namespace.
///
/// ## Policy
///
/// - An entry younger than `ttl` is served without recomputation.
/// - Otherwise the value is recomputed; success overwrites the entry.
/// - If recomputation fails, the last stored value is served regardless of age
///   ("stale-but-available"). Only a cold key plus a failed computation is an error.
/// - A [`Computed::Partial`] result is returned to its caller and not stored.
///
/// Concurrent misses on the same key may compute twice; the last write wins.
pub struct PriceCache<V> {
    name: &'static str,
    namespace: String,
    backend: Arc<dyn CacheBackend>,
    ttl: Duration,
    retention: Option<Duration>,
    _value: PhantomData<fn() -> V>,
}

impl<V> Clone for PriceCache<V> {
    fn clone(&self) -> Self {
        Self {
            name: self.name,
            namespace: self.namespace.clone(),
            backend: Arc::clone(&self.backend),
            ttl: self.ttl,
            retention: self.retention,
            _value: PhantomData,
        }
    }
}

impl<V> std::fmt::Debug for PriceCache<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PriceCache")
            .field("name", &self.name)
            .field("namespace", &self.namespace)
            .field("ttl", &self.ttl)
            .field("retention", &self.retention)
            .finish()
    }
}

impl<V> PriceCache<V>
where
    V: Serialize + DeserializeOwned + Clone + Send + Sync,
{
    /// `name` labels logs and metrics; `namespace` prefixes every backend key.
    pub fn new(
        name: &'static str,
        namespace: impl Into<String>,
        backend: Arc<dyn CacheBackend>,
        ttl: Duration,
    ) -> Self {
        Self {
            name,
            namespace: namespace.into(),
            backend,
            ttl,
            retention: None,
            _value: PhantomData,
        }
    }

    /// How long the backend keeps values for stale fallback. `None` keeps them until
    /// overwritten, cleared or evicted.
    pub fn with_retention(mut self, retention: Option<Duration>) -> Self {
        self.retention = retention;
        self
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    fn full_key(&self, key: &str) -> String {
        format!("{}:{}", self.namespace, key)
    }

    fn is_fresh(&self, entry: &CacheEntry<V>) -> bool {
        // A negative age (clock moved backwards) counts as fresh.
        Utc::now()
            .signed_duration_since(entry.inserted_at)
            .to_std()
            .map(|age| age < self.ttl)
            .unwrap_or(true)
    }

    /// Stored entry regardless of age. Backend and decoding errors read as a miss.
    pub async fn peek(&self, key: &str) -> Option<CacheEntry<V>> {
        let full_key = self.full_key(key);
        match self.backend.get(&full_key).await {
            Ok(Some(bytes)) => match bincode::deserialize::<CacheEntry<V>>(&bytes) {
                Ok(entry) => Some(entry),
                Err(e) => {
                    warn!("{} cache: dropping undecodable entry {}: {}", self.name, full_key, e);
                    if let Err(e) = self.backend.delete(&full_key).await {
                        warn!("{} cache: failed to delete {}: {}", self.name, full_key, e);
                    }
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                warn!("{} cache: read of {} failed, treating as miss: {}", self.name, full_key, e);
                None
            }
        }
    }

    /// Unexpired entry only.
    pub async fn get(&self, key: &str) -> Option<CacheEntry<V>> {
        self.peek(key).await.filter(|entry| self.is_fresh(entry))
    }

    /// Store `value` as computed now. Write failures are logged, not propagated.
    pub async fn insert(&self, key: &str, value: V) -> CacheEntry<V> {
        self.store(key, value, false).await
    }

    /// Store a stand-in for a value nothing could compute. It is served with
    /// [`PriceState::Unpriced`] until it expires or is replaced.
    pub async fn insert_placeholder(&self, key: &str, value: V) -> CacheEntry<V> {
        self.store(key, value, true).await
    }

    async fn store(&self, key: &str, value: V, placeholder: bool) -> CacheEntry<V> {
        let entry = CacheEntry {
            value,
            inserted_at: Utc::now(),
            placeholder,
        };
        let full_key = self.full_key(key);
        match bincode::serialize(&entry) {
            Ok(bytes) => {
                if let Err(e) = self.backend.set(&full_key, bytes, self.retention).await {
                    warn!("{} cache: write of {} failed: {}", self.name, full_key, e);
                }
            }
            Err(e) => warn!("{} cache: failed to encode {}: {}", self.name, full_key, e),
        }
        entry
    }

    /// Serve `key` from cache, or compute it, or fall back to the last known value.
    pub async fn get_or_compute<F, Fut, E>(&self, key: &str, compute: F) -> Result<Resolved<V>, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
        E: std::fmt::Display,
    {
        self.get_or_compute_with(key, || compute().map_ok(Computed::Complete))
            .await
    }

    /// [`Self::get_or_compute`] for computations that may report a partial result.
    pub async fn get_or_compute_with<F, Fut, E>(&self, key: &str, compute: F) -> Result<Resolved<V>, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Computed<V>, E>>,
        E: std::fmt::Display,
    {
        let previous = self.peek(key).await;
        if let Some(entry) = &previous {
            if self.is_fresh(entry) {
                debug!("{} cache: hit for {}", self.name, key);
                metrics::increment_cache_hit(self.name);
                return Ok(Resolved {
                    value: entry.value.clone(),
                    computed_at: entry.inserted_at,
                    state: entry.served_state(PriceState::Cached),
                });
            }
        }
        metrics::increment_cache_miss(self.name);

        match compute().await {
            Ok(Computed::Complete(value)) => {
                let entry = self.insert(key, value).await;
                Ok(Resolved {
                    value: entry.value,
                    computed_at: entry.inserted_at,
                    state: PriceState::Fresh,
                })
            }
            Ok(Computed::Partial(value)) => {
                debug!("{} cache: not storing partial value for {}", self.name, key);
                Ok(Resolved {
                    value,
                    computed_at: Utc::now(),
                    state: PriceState::Partial,
                })
            }
            Err(err) => {
                // Another caller may have stored a newer value while we were computing.
                match self.peek(key).await.or(previous) {
                    Some(entry) => {
                        warn!(
                            "{} cache: serving last known value for {} computed at {}: {}",
                            self.name, key, entry.inserted_at, err
                        );
                        metrics::increment_stale_served(self.name);
                        let state = entry.served_state(PriceState::Stale);
                        Ok(Resolved {
                            value: entry.value,
                            computed_at: entry.inserted_at,
                            state,
                        })
                    }
                    None => Err(err),
                }
            }
        }
    }

    /// Invalidate one key, or the whole namespace when `key` is `None`.
    pub async fn clear(&self, key: Option<&str>) {
        let result = match key {
            Some(key) => self.backend.delete(&self.full_key(key)).await.map(|_| 1),
            None => self.backend.delete_prefix(&format!("{}:", self.namespace)).await,
        };
        match result {
            Ok(removed) => debug!("{} cache: cleared {} entries", self.name, removed),
            Err(e) => warn!("{} cache: clear failed: {}", self.name, e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache_backend::InMemoryBackend;

    fn cache(ttl: Duration) -> PriceCache<f64> {
        PriceCache::new("test", "price-service:test", Arc::new(InMemoryBackend::new(64)), ttl)
    }

    #[tokio::test]
    async fn fresh_then_cached() {
        let cache = cache(Duration::from_secs(60));
        let first = cache
            .get_or_compute("k", || async { Ok::<_, String>(1_600.0) })
            .await
            .unwrap();
        assert_eq!(first.state, PriceState::Fresh);

        let second = cache
            .get_or_compute("k", || async { Ok::<_, String>(9.0) })
            .await
            .unwrap();
        assert_eq!(second.value, 1_600.0);
        assert_eq!(second.state, PriceState::Cached);
        assert_eq!(second.computed_at, first.computed_at);
    }

    #[tokio::test]
    async fn expired_entry_is_recomputed() {
        let cache = cache(Duration::from_millis(30));
        cache.insert("k", 1.0).await;
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert!(cache.get("k").await.is_none());

        let resolved = cache
            .get_or_compute("k", || async { Ok::<_, String>(2.0) })
            .await
            .unwrap();
        assert_eq!(resolved.value, 2.0);
        assert_eq!(resolved.state, PriceState::Fresh);
    }

    #[tokio::test]
    async fn failure_serves_expired_value() {
        let cache = cache(Duration::from_millis(30));
        cache.insert("k", 1_600.0).await;
        tokio::time::sleep(Duration::from_millis(60)).await;

        let resolved = cache
            .get_or_compute("k", || async { Err::<f64, _>("exchange down".to_string()) })
            .await
            .unwrap();
        assert_eq!(resolved.value, 1_600.0);
        assert_eq!(resolved.state, PriceState::Stale);
    }

    #[tokio::test]
    async fn cold_failure_propagates() {
        let cache = cache(Duration::from_secs(60));
        let result = cache
            .get_or_compute("k", || async { Err::<f64, _>("exchange down".to_string()) })
            .await;
        assert_eq!(result.unwrap_err(), "exchange down");
    }

    #[tokio::test]
    async fn partial_values_are_not_stored() {
        let cache = cache(Duration::from_secs(60));
        let partial = cache
            .get_or_compute_with("k", || async { Ok::<_, String>(Computed::Partial(0.0)) })
            .await
            .unwrap();
        assert_eq!(partial.state, PriceState::Partial);
        assert!(cache.peek("k").await.is_none());

        let complete = cache
            .get_or_compute_with("k", || async { Ok::<_, String>(Computed::Complete(0.25)) })
            .await
            .unwrap();
        assert_eq!(complete.value, 0.25);
        assert_eq!(complete.state, PriceState::Fresh);
    }

    #[tokio::test]
    async fn partial_value_keeps_previous_entry() {
        let cache = cache(Duration::from_millis(30));
        cache.insert("k", 0.25).await;
        tokio::time::sleep(Duration::from_millis(60)).await;

        cache
            .get_or_compute_with("k", || async { Ok::<_, String>(Computed::Partial(0.0)) })
            .await
            .unwrap();
        assert_eq!(cache.peek("k").await.map(|e| e.value), Some(0.25));
    }

    #[tokio::test]
    async fn placeholder_is_served_as_unpriced() {
        let cache = cache(Duration::from_secs(60));
        let stored = cache.insert_placeholder("k", 0.0).await;
        assert!(stored.placeholder);

        let served = cache
            .get_or_compute("k", || async { Ok::<_, String>(9.0) })
            .await
            .unwrap();
        assert_eq!(served.value, 0.0);
        assert_eq!(served.state, PriceState::Unpriced);
    }

    #[tokio::test]
    async fn clear_one_key_or_namespace() {
        let backend: Arc<dyn CacheBackend> = Arc::new(InMemoryBackend::new(64));
        let a = PriceCache::<f64>::new("a", "ns-a", Arc::clone(&backend), Duration::from_secs(60));
        let b = PriceCache::<f64>::new("b", "ns-b", Arc::clone(&backend), Duration::from_secs(60));
        a.insert("x", 1.0).await;
        a.insert("y", 2.0).await;
        b.insert("x", 3.0).await;

        a.clear(Some("x")).await;
        assert!(a.peek("x").await.is_none());
        assert_eq!(a.peek("y").await.map(|e| e.value), Some(2.0));

        a.clear(None).await;
        assert!(a.peek("y").await.is_none());
        assert_eq!(b.peek("x").await.map(|e| e.value), Some(3.0));
    }

    #[tokio::test]
    async fn stores_non_scalar_values() {
        let cache: PriceCache<Vec<(String, f64)>> = PriceCache::new(
            "baskets",
            "ns",
            Arc::new(InMemoryBackend::new(8)),
            Duration::from_secs(60),
        );
        cache.insert("lp", vec![("a".into(), 0.5), ("b".into(), 0.25)]).await;
        assert_eq!(cache.get("lp").await.unwrap().value.len(), 2);
    }
}
