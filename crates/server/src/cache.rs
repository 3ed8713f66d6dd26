//! Ephemeral recommendation cache.
//!
//! Values are opaque serialized payloads stored under `recs:<user>`. The
//! cache is never the source of truth: every failure is reported as a
//! [`Lookup::Transient`] or an error, and the caller moves on.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use data_loader::UserId;
use redis::AsyncCommands;
use redis::aio::ConnectionManager;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::debug;

use crate::error::{CacheError, Lookup};

/// Cache key for a user's recommendations
pub fn cache_key(user_id: UserId) -> String {
    format!("recs:{}", user_id)
}

#[async_trait]
pub trait RecommendationCache: Send + Sync {
    async fn get(&self, key: &str) -> Lookup<String, CacheError>;

    /// Store `value` under `key` for `ttl`, overwriting any previous value
    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<(), CacheError>;
}

/// In-process cache with per-entry expiry
#[derive(Default)]
pub struct MemoryCache {
    entries: Mutex<HashMap<String, (String, Instant)>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entries that have not expired yet
    pub async fn len(&self) -> usize {
        let now = Instant::now();
        self.entries
            .lock()
            .await
            .values()
            .filter(|(_, expires)| *expires > now)
            .count()
    }
}

#[async_trait]
impl RecommendationCache for MemoryCache {
    async fn get(&self, key: &str) -> Lookup<String, CacheError> {
        let mut entries = self.entries.lock().await;
        match entries.get(key) {
            Some((value, expires)) if *expires > Instant::now() => Lookup::Hit(value.clone()),
            Some(_) => {
                entries.remove(key);
                Lookup::NotFound
            }
            None => Lookup::NotFound,
        }
    }

    /// Also drops every expired entry, so keys nobody reads again do not pile up
    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<(), CacheError> {
        let now = Instant::now();
        let mut entries = self.entries.lock().await;
        entries.retain(|_, (_, expires)| *expires > now);
        entries.insert(key.to_string(), (value, now + ttl));
        Ok(())
    }
}

/// Redis-backed cache, `GET` / `SET EX`.
///
/// `ConnectionManager` is multiplexed; each call works on its own clone.
#[derive(Clone)]
pub struct RedisCache {
    redis: ConnectionManager,
}

impl RedisCache {
    pub fn new(redis: ConnectionManager) -> Self {
        Self { redis }
    }

    pub async fn connect(url: &str) -> Result<Self, CacheError> {
        let client = redis::Client::open(url)?;
        let manager = ConnectionManager::new(client).await?;
        Ok(Self::new(manager))
    }
}

#[async_trait]
impl RecommendationCache for RedisCache {
    async fn get(&self, key: &str) -> Lookup<String, CacheError> {
        let mut conn = self.redis.clone();
        Lookup::from_result(
            conn.get::<_, Option<String>>(key)
                .await
                .map_err(CacheError::Redis),
        )
    }

    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<(), CacheError> {
        // SET EX rejects a zero expiry
        let ttl_secs = ttl.as_secs().max(1);
        let mut conn = self.redis.clone();
        conn.set_ex::<_, _, ()>(key, value, ttl_secs).await?;
        debug!(key = %key, ttl = ttl_secs, "Cache set");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_key_format() {
        assert_eq!(cache_key(42), "recs:42");
    }

    #[tokio::test]
    async fn test_memory_cache_hit_and_miss() {
        let cache = MemoryCache::new();
        assert!(matches!(cache.get("recs:1").await, Lookup::NotFound));

        cache
            .set("recs:1", "[]".to_string(), Duration::from_secs(60))
            .await
            .unwrap();
        match cache.get("recs:1").await {
            Lookup::Hit(value) => assert_eq!(value, "[]"),
            other => panic!("expected a hit, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_memory_cache_overwrite() {
        let cache = MemoryCache::new();
        let ttl = Duration::from_secs(60);
        cache.set("recs:1", "a".to_string(), ttl).await.unwrap();
        cache.set("recs:1", "b".to_string(), ttl).await.unwrap();

        assert!(matches!(cache.get("recs:1").await, Lookup::Hit(v) if v == "b"));
        assert_eq!(cache.len().await, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_memory_cache_entries_expire() {
        let cache = MemoryCache::new();
        cache
            .set("recs:1", "[]".to_string(), Duration::from_secs(600))
            .await
            .unwrap();

        tokio::time::advance(Duration::from_secs(599)).await;
        assert!(cache.get("recs:1").await.is_hit());

        tokio::time::advance(Duration::from_secs(2)).await;
        assert!(matches!(cache.get("recs:1").await, Lookup::NotFound));
        assert_eq!(cache.len().await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_memory_cache_set_sweeps_expired_keys() {
        let cache = MemoryCache::new();
        for user in 1..=3 {
            cache
                .set(&cache_key(user), "[]".to_string(), Duration::from_secs(10))
                .await
                .unwrap();
        }
        assert_eq!(cache.entries.lock().await.len(), 3);

        // None of the three keys is read again
        tokio::time::advance(Duration::from_secs(11)).await;
        cache
            .set(&cache_key(4), "[]".to_string(), Duration::from_secs(10))
            .await
            .unwrap();

        let entries = cache.entries.lock().await;
        assert_eq!(entries.len(), 1);
        assert!(entries.contains_key("recs:4"));
    }

    #[tokio::test]
    #[ignore] // Requires Redis server
    async fn test_redis_cache_concurrent_calls() {
        let url = std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".into());
        let cache = RedisCache::connect(&url).await.unwrap();

        let mut tasks = tokio::task::JoinSet::new();
        for user in 0..32u32 {
            let cache = cache.clone();
            tasks.spawn(async move {
                let key = format!("recs:test:{}", user);
                cache
                    .set(&key, user.to_string(), Duration::from_secs(5))
                    .await
                    .unwrap();
                matches!(cache.get(&key).await, Lookup::Hit(v) if v == user.to_string())
            });
        }
        while let Some(hit) = tasks.join_next().await {
            assert!(hit.unwrap());
        }
    }
}
