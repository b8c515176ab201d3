use async_trait::async_trait;
use dashmap::DashMap;
use log::{debug, info};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::errors::{CacheError, SetupError};
use crate::settings::{Cache, CacheBackendKind};

/// Key-value storage behind [`crate::cache::PriceCache`].
///
/// Values are opaque bytes. `retention` is how long the backend keeps a value at all;
/// freshness (TTL) is decided by the cache layer from the entry's own timestamp, so an
/// expired-but-retained value can still be served as last-known-good.
#[async_trait]
pub trait CacheBackend: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError>;

    async fn set(&self, key: &str, value: Vec<u8>, retention: Option<Duration>) -> Result<(), CacheError>;

    async fn delete(&self, key: &str) -> Result<(), CacheError>;

    /// Removes every key starting with `prefix`. Returns how many were removed.
    async fn delete_prefix(&self, prefix: &str) -> Result<usize, CacheError>;
}

#[derive(Debug, Clone)]
struct StoredValue {
    bytes: Vec<u8>,
    inserted_at: Instant,
    expires_at: Option<Instant>,
}

impl StoredValue {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.map(|at| now >= at).unwrap_or(false)
    }
}

/// Process-local backend.
///
/// Lock-free reads and writes through `DashMap`; bounded by `max_entries` with manual
/// eviction. Expired values go first, then the least recently written.
#[derive(Debug, Clone)]
pub struct InMemoryBackend {
    entries: Arc<DashMap<String, StoredValue>>,
    max_entries: usize,
}

impl InMemoryBackend {
    pub fn new(max_entries: usize) -> Self {
        Self {
            entries: Arc::new(DashMap::new()),
            max_entries: max_entries.max(1),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn maybe_evict(&self, keep: &str) {
        if self.entries.len() <= self.max_entries {
            return;
        }
        let now = Instant::now();
        self.entries.retain(|_, value| !value.is_expired(now));

        if self.entries.len() > self.max_entries {
            let to_remove = self.entries.len() - self.max_entries;
            let mut candidates: Vec<(Instant, String)> = self
                .entries
                .iter()
                .filter(|entry| entry.key() != keep)
                .map(|entry| (entry.value().inserted_at, entry.key().clone()))
                .collect();
            candidates.sort_unstable();
            let victims: Vec<String> = candidates
                .into_iter()
                .take(to_remove)
                .map(|(_, key)| key)
                .collect();
            for key in &victims {
                self.entries.remove(key);
            }
            debug!(
                "Evicted {} entries from in-memory price cache (size: {})",
                victims.len(),
                self.entries.len()
            );
        }
    }
}

impl Default for InMemoryBackend {
    fn default() -> Self {
        Self::new(4096)
    }
}

#[async_trait]
impl CacheBackend for InMemoryBackend {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        let now = Instant::now();
        let hit = match self.entries.get(key) {
            Some(value) if !value.is_expired(now) => Some(value.bytes.clone()),
            Some(_) => None,
            None => return Ok(None),
        };
        if hit.is_none() {
            self.entries.remove_if(key, |_, value| value.is_expired(now));
        }
        Ok(hit)
    }

    async fn set(&self, key: &str, value: Vec<u8>, retention: Option<Duration>) -> Result<(), CacheError> {
        let now = Instant::now();
        self.entries.insert(
            key.to_string(),
            StoredValue {
                bytes: value,
                inserted_at: now,
                expires_at: retention.map(|r| now + r),
            },
        );
        self.maybe_evict(key);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        self.entries.remove(key);
        Ok(())
    }

    async fn delete_prefix(&self, prefix: &str) -> Result<usize, CacheError> {
        let before = self.entries.len();
        self.entries.retain(|key, _| !key.starts_with(prefix));
        Ok(before.saturating_sub(self.entries.len()))
    }
}

/// Backend selected by the `[cache]` settings.
pub async fn build_backend(settings: &Cache) -> Result<Arc<dyn CacheBackend>, SetupError> {
    match settings.backend {
        CacheBackendKind::Memory => {
            info!("Using in-memory price cache (max {} entries)", settings.max_entries);
            Ok(Arc::new(InMemoryBackend::new(settings.max_entries)))
        }
        CacheBackendKind::Redis => connect_redis(&settings.redis_url).await,
    }
}

#[cfg(feature = "redis")]
async fn connect_redis(url: &str) -> Result<Arc<dyn CacheBackend>, SetupError> {
    use crate::redis_manager::{RedisBackend, RedisConfig};

    let config = RedisConfig {
        url: url.to_string(),
        ..RedisConfig::default()
    };
    Ok(Arc::new(RedisBackend::connect(config).await?))
}

#[cfg(not(feature = "redis"))]
async fn connect_redis(_url: &str) -> Result<Arc<dyn CacheBackend>, SetupError> {
    Err(SetupError::Backend(
        "cache.backend = \"redis\" requires the 'redis' feature".to_string(),
    ))
}
