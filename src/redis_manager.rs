// Redis Manager - shared cache backend for price services
// Lets several processes (API workers, schedulers) share one price cache

#[cfg(feature = "redis")]
use async_trait::async_trait;
#[cfg(feature = "redis")]
use log::{debug, info};
#[cfg(feature = "redis")]
use redis::aio::ConnectionManager;
#[cfg(feature = "redis")]
use redis::{AsyncCommands, Client};
#[cfg(feature = "redis")]
use std::time::Duration;

#[cfg(feature = "redis")]
use crate::cache_backend::CacheBackend;
#[cfg(feature = "redis")]
use crate::errors::CacheError;
use crate::errors::SetupError;

/// Configuration for the Redis connection.
#[derive(Debug, Clone)]
pub struct RedisConfig {
    pub url: String,
    /// Keys fetched per `SCAN` round trip when clearing a namespace.
    pub scan_count: usize,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: "redis://localhost:6379".to_string(),
            scan_count: 500,
        }
    }
}

/// Redis-backed [`crate::cache_backend::CacheBackend`].
#[cfg(feature = "redis")]
#[derive(Clone)]
pub struct RedisBackend {
    conn: ConnectionManager,
    config: RedisConfig,
}

#[cfg(not(feature = "redis"))]
pub struct RedisBackend {
    // NOTE: conn field removed when redis feature is disabled
    _config: RedisConfig,
}

impl RedisBackend {
    #[cfg(feature = "redis")]
    pub async fn connect(config: RedisConfig) -> Result<Self, SetupError> {
        let client = Client::open(config.url.as_str())
            .map_err(|e| SetupError::Backend(format!("invalid Redis URL {}: {}", config.url, e)))?;

        let conn = ConnectionManager::new(client)
            .await
            .map_err(|e| SetupError::Backend(format!("failed to connect to Redis: {}", e)))?;

        info!("Redis cache backend connected to {}", config.url);

        Ok(Self { conn, config })
    }

    #[cfg(not(feature = "redis"))]
    pub async fn connect(_config: RedisConfig) -> Result<Self, SetupError> {
        Err(SetupError::Backend(
            "Redis feature not enabled. Enable with 'redis' feature flag.".to_string(),
        ))
    }
}

#[cfg(feature = "redis")]
fn backend_error(err: redis::RedisError) -> CacheError {
    CacheError::Backend(err.to_string())
}

#[cfg(feature = "redis")]
#[async_trait]
impl CacheBackend for RedisBackend {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        let mut conn = self.conn.clone();
        conn.get(key).await.map_err(backend_error)
    }

    async fn set(
        &self,
        key: &str,
        value: Vec<u8>,
        retention: Option<Duration>,
    ) -> Result<(), CacheError> {
        let mut conn = self.conn.clone();
        match retention {
            Some(retention) => conn
                .set_ex::<_, _, ()>(key, value, retention.as_secs().max(1))
                .await
                .map_err(backend_error),
            None => conn.set::<_, _, ()>(key, value).await.map_err(backend_error),
        }
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        let mut conn = self.conn.clone();
        conn.del::<_, ()>(key).await.map_err(backend_error)
    }

    async fn delete_prefix(&self, prefix: &str) -> Result<usize, CacheError> {
        let mut conn = self.conn.clone();
        let pattern = format!("{}*", prefix);
        let mut cursor: u64 = 0;
        let mut removed = 0usize;

        loop {
            let (next, keys): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(&pattern)
                .arg("COUNT")
                .arg(self.config.scan_count)
                .query_async(&mut conn)
                .await
                .map_err(backend_error)?;

            if !keys.is_empty() {
                let deleted: usize = conn.del(&keys).await.map_err(backend_error)?;
                removed += deleted;
            }
            if next == 0 {
                break;
            }
            cursor = next;
        }

        debug!("Deleted {} Redis keys matching {}", removed, pattern);
        Ok(removed)
    }
}
