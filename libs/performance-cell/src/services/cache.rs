use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use deadpool_redis::{Config, Connection, Pool, Runtime};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use tokio::sync::RwLock;
use tracing::{debug, info, instrument, warn};

use shared_config::AppConfig;

use crate::models::{CacheError, CacheStats};

const KEY_PREFIX: &str = "clinic_cache:";

#[derive(Debug, Clone)]
struct CacheEntry {
    data: Value,
    created_at: Instant,
    ttl: Duration,
    access_count: u64,
}

impl CacheEntry {
    fn is_expired(&self) -> bool {
        self.created_at.elapsed() > self.ttl
    }
}

#[derive(Debug, Default)]
struct CacheMetrics {
    hit_count: AtomicU64,
    miss_count: AtomicU64,
    eviction_count: AtomicU64,
}

impl CacheMetrics {
    fn record_hit(&self) {
        self.hit_count.fetch_add(1, Ordering::Relaxed);
    }

    fn record_miss(&self) {
        self.miss_count.fetch_add(1, Ordering::Relaxed);
    }

    fn record_evictions(&self, count: u64) {
        self.eviction_count.fetch_add(count, Ordering::Relaxed);
    }

    fn hit_rate(&self) -> f64 {
        let hits = self.hit_count.load(Ordering::Relaxed);
        let misses = self.miss_count.load(Ordering::Relaxed);
        let total = hits + misses;

        if total == 0 {
            0.0
        } else {
            hits as f64 / total as f64
        }
    }
}

/// In-process TTL cache. When full, the least-accessed and oldest tenth of
/// the entries is evicted.
pub struct MemoryCache {
    entries: RwLock<HashMap<String, CacheEntry>>,
    max_entries: usize,
    default_ttl: Duration,
    metrics: CacheMetrics,
}

impl MemoryCache {
    pub fn new(max_entries: usize, default_ttl: Duration) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            max_entries: max_entries.max(1),
            default_ttl,
            metrics: CacheMetrics::default(),
        }
    }

    pub async fn get(&self, key: &str) -> Option<Value> {
        let mut entries = self.entries.write().await;

        let expired = match entries.get(key) {
            Some(entry) => entry.is_expired(),
            None => {
                self.metrics.record_miss();
                return None;
            }
        };

        if expired {
            entries.remove(key);
            self.metrics.record_miss();
            return None;
        }

        let entry = entries.get_mut(key)?;
        entry.access_count += 1;
        self.metrics.record_hit();
        Some(entry.data.clone())
    }

    pub async fn set(&self, key: &str, value: Value, ttl: Option<Duration>) {
        let mut entries = self.entries.write().await;

        if !entries.contains_key(key) && entries.len() >= self.max_entries {
            let evicted = Self::evict(&mut entries);
            self.metrics.record_evictions(evicted as u64);
            info!("Memory cache evicted {} entries", evicted);
        }

        entries.insert(
            key.to_string(),
            CacheEntry {
                data: value,
                created_at: Instant::now(),
                ttl: ttl.unwrap_or(self.default_ttl),
                access_count: 0,
            },
        );
    }

    pub async fn remove(&self, key: &str) -> bool {
        self.entries.write().await.remove(key).is_some()
    }

    pub async fn remove_prefix(&self, prefix: &str) -> usize {
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|key, _| !key.starts_with(prefix));
        before - entries.len()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    fn evict(entries: &mut HashMap<String, CacheEntry>) -> usize {
        let expired: Vec<String> = entries
            .iter()
            .filter(|(_, entry)| entry.is_expired())
            .map(|(key, _)| key.clone())
            .collect();

        if !expired.is_empty() {
            for key in &expired {
                entries.remove(key);
            }
            return expired.len();
        }

        let mut ranked: Vec<(String, u64, Instant)> = entries
            .iter()
            .map(|(key, entry)| (key.clone(), entry.access_count, entry.created_at))
            .collect();
        ranked.sort_by(|a, b| a.1.cmp(&b.1).then(a.2.cmp(&b.2)));

        let to_remove = (entries.len() / 10).max(1);
        for (key, _, _) in ranked.into_iter().take(to_remove) {
            entries.remove(&key);
        }

        to_remove
    }
}

/// Two-tier JSON cache: in-process memory in front of optional Redis.
/// Redis failures degrade to misses.
pub struct CacheService {
    l1: MemoryCache,
    l2: Option<Pool>,
    default_ttl: Duration,
}

impl CacheService {
    pub fn in_memory(config: &AppConfig) -> Self {
        let default_ttl = Duration::from_secs(config.cache_ttl_seconds);
        Self {
            l1: MemoryCache::new(config.cache_max_entries, default_ttl),
            l2: None,
            default_ttl,
        }
    }

    pub async fn from_config(config: &AppConfig) -> Self {
        let mut service = Self::in_memory(config);

        let Some(redis_url) = config.redis_url.as_deref().filter(|url| !url.is_empty()) else {
            return service;
        };

        match Self::connect(redis_url).await {
            Ok(pool) => {
                info!("Cache service using Redis as second tier");
                service.l2 = Some(pool);
            }
            Err(e) => warn!("Redis unavailable for cache, using memory only: {}", e),
        }

        service
    }

    async fn connect(redis_url: &str) -> Result<Pool, CacheError> {
        let pool = Config::from_url(redis_url)
            .create_pool(Some(Runtime::Tokio1))
            .map_err(|e| CacheError::Pool(e.to_string()))?;

        let mut conn = pool.get().await.map_err(|e| CacheError::Pool(e.to_string()))?;
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;

        Ok(pool)
    }

    pub fn is_redis_enabled(&self) -> bool {
        self.l2.is_some()
    }

    #[instrument(skip(self))]
    pub async fn get_json<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        if let Some(value) = self.l1.get(key).await {
            debug!("Cache hit (memory): {}", key);
            return serde_json::from_value(value).ok();
        }

        let pool = self.l2.as_ref()?;
        let value = match Self::redis_get(pool, key).await {
            Ok(Some(value)) => value,
            Ok(None) => return None,
            Err(e) => {
                warn!("Redis cache read failed for {}: {}", key, e);
                return None;
            }
        };

        debug!("Cache hit (redis): {}", key);
        self.l1.set(key, value.clone(), Some(self.default_ttl)).await;
        serde_json::from_value(value).ok()
    }

    #[instrument(skip(self, value))]
    pub async fn set_json<T: Serialize>(&self, key: &str, value: &T) {
        self.set_json_with_ttl(key, value, self.default_ttl).await
    }

    pub async fn set_json_with_ttl<T: Serialize>(&self, key: &str, value: &T, ttl: Duration) {
        let value = match serde_json::to_value(value) {
            Ok(value) => value,
            Err(e) => {
                warn!("Refusing to cache unserializable value for {}: {}", key, e);
                return;
            }
        };

        if let Some(pool) = &self.l2 {
            if let Err(e) = Self::redis_set(pool, key, &value, ttl).await {
                warn!("Redis cache write failed for {}: {}", key, e);
            }
        }

        self.l1.set(key, value, Some(ttl)).await;
    }

    pub async fn invalidate(&self, key: &str) {
        self.l1.remove(key).await;

        if let Some(pool) = &self.l2 {
            let result = async {
                let mut conn = Self::connection(pool).await?;
                let _: i64 = redis::cmd("DEL")
                    .arg(format!("{}{}", KEY_PREFIX, key))
                    .query_async(&mut conn)
                    .await?;
                Ok::<(), CacheError>(())
            }
            .await;

            if let Err(e) = result {
                warn!("Redis cache invalidation failed for {}: {}", key, e);
            }
        }
    }

    pub async fn invalidate_prefix(&self, prefix: &str) {
        let removed = self.l1.remove_prefix(prefix).await;
        debug!("Invalidated {} memory entries with prefix {}", removed, prefix);

        if let Some(pool) = &self.l2 {
            if let Err(e) = Self::redis_delete_matching(pool, prefix).await {
                warn!("Redis prefix invalidation failed for {}: {}", prefix, e);
            }
        }
    }

    pub async fn stats(&self) -> CacheStats {
        CacheStats {
            hit_count: self.l1.metrics.hit_count.load(Ordering::Relaxed),
            miss_count: self.l1.metrics.miss_count.load(Ordering::Relaxed),
            hit_rate: self.l1.metrics.hit_rate(),
            eviction_count: self.l1.metrics.eviction_count.load(Ordering::Relaxed),
            total_entries: self.l1.len().await,
            redis_enabled: self.is_redis_enabled(),
        }
    }

    async fn connection(pool: &Pool) -> Result<Connection, CacheError> {
        pool.get().await.map_err(|e| CacheError::Pool(e.to_string()))
    }

    async fn redis_get(pool: &Pool, key: &str) -> Result<Option<Value>, CacheError> {
        let mut conn = Self::connection(pool).await?;
        let raw: Option<String> = redis::cmd("GET")
            .arg(format!("{}{}", KEY_PREFIX, key))
            .query_async(&mut conn)
            .await?;

        match raw {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    async fn redis_set(pool: &Pool, key: &str, value: &Value, ttl: Duration) -> Result<(), CacheError> {
        let mut conn = Self::connection(pool).await?;
        let _: () = redis::cmd("SET")
            .arg(format!("{}{}", KEY_PREFIX, key))
            .arg(serde_json::to_string(value)?)
            .arg("EX")
            .arg(ttl.as_secs().max(1))
            .query_async(&mut conn)
            .await?;
        Ok(())
    }

    async fn redis_delete_matching(pool: &Pool, prefix: &str) -> Result<(), CacheError> {
        let mut conn = Self::connection(pool).await?;
        let pattern = format!("{}{}*", KEY_PREFIX, prefix);
        let mut cursor: u64 = 0;

        loop {
            let (next, keys): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(&pattern)
                .arg("COUNT")
                .arg(100)
                .query_async(&mut conn)
                .await?;

            if !keys.is_empty() {
                let _: i64 = redis::cmd("DEL").arg(&keys).query_async(&mut conn).await?;
            }

            if next == 0 {
                break;
            }
            cursor = next;
        }

        Ok(())
    }
}

/// Builds a stable cache key from a namespace and unordered parameters.
pub fn cache_key(namespace: &str, params: &[(&str, String)]) -> String {
    let mut sorted: Vec<&(&str, String)> = params.iter().collect();
    sorted.sort_by(|a, b| a.0.cmp(b.0));

    let mut hasher = Sha256::new();
    for (key, value) in sorted {
        hasher.update(key.as_bytes());
        hasher.update(b"=");
        hasher.update(value.as_bytes());
        hasher.update(b"&");
    }

    format!("{}:{:x}", namespace, hasher.finalize())
}
