use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use nt_core::{Article, Result};
use tracing::{debug, warn};

mod memory;
#[cfg(feature = "redis")]
mod redis;

pub use memory::MemoryCacheStore;
#[cfg(feature = "redis")]
pub use self::redis::RedisCacheStore;

pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(5 * 60);

/// String key/value store with per-write expiry.
#[async_trait]
pub trait CacheStore: Send + Sync {
    fn name(&self) -> &'static str;

    async fn get(&self, key: &str) -> Result<Option<String>>;

    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<()>;

    async fn delete(&self, key: &str) -> Result<()>;
}

/// Trending results keyed by rounded location and limit.
///
/// The cache never fails a request: read errors and corrupt payloads are
/// misses, write errors are logged.
#[derive(Clone)]
pub struct TrendingCache {
    store: Arc<dyn CacheStore>,
    ttl: Duration,
}

impl TrendingCache {
    pub fn new(store: Arc<dyn CacheStore>, ttl: Duration) -> Self {
        Self { store, ttl }
    }

    pub fn in_memory(ttl: Duration) -> Self {
        Self::new(Arc::new(MemoryCacheStore::new(ttl)), ttl)
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// `trending:{lat}:{lon}:{limit}` with coordinates rounded to two decimals.
    pub fn key(lat: f64, lon: f64, limit: usize) -> String {
        format!("trending:{:.2}:{:.2}:{}", quantize(lat), quantize(lon), limit)
    }

    pub async fn get(&self, lat: f64, lon: f64, limit: usize) -> Option<Vec<Article>> {
        let key = Self::key(lat, lon, limit);

        let payload = match self.store.get(&key).await {
            Ok(Some(payload)) => payload,
            Ok(None) => {
                debug!(cache_key = %key, "Trending cache miss");
                return None;
            }
            Err(e) => {
                warn!(cache_key = %key, store = self.store.name(), error = %e, "Trending cache read failed");
                return None;
            }
        };

        match serde_json::from_str::<Vec<Article>>(&payload) {
            Ok(articles) => {
                debug!(cache_key = %key, count = articles.len(), "Trending cache hit");
                Some(articles)
            }
            Err(e) => {
                warn!(cache_key = %key, error = %e, "Dropping corrupt trending cache entry");
                if let Err(e) = self.store.delete(&key).await {
                    warn!(cache_key = %key, error = %e, "Failed to delete corrupt cache entry");
                }
                None
            }
        }
    }

    pub async fn put(&self, lat: f64, lon: f64, limit: usize, articles: &[Article]) {
        let key = Self::key(lat, lon, limit);

        let payload = match serde_json::to_string(articles) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(cache_key = %key, error = %e, "Failed to serialize trending results");
                return;
            }
        };

        match self.store.set(&key, payload, self.ttl).await {
            Ok(()) => debug!(cache_key = %key, count = articles.len(), ttl = ?self.ttl, "Cached trending results"),
            Err(e) => warn!(cache_key = %key, store = self.store.name(), error = %e, "Failed to cache trending results"),
        }
    }
}

/// Round to two decimals, folding -0.00 into 0.00.
fn quantize(value: f64) -> f64 {
    let rounded = (value * 100.0).round() / 100.0;
    if rounded == 0.0 {
        0.0
    } else {
        rounded
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use nt_core::Error;

    fn article(id: &str) -> Article {
        Article {
            id: id.to_string(),
            title: format!("Trending {}", id),
            description: Some("desc".to_string()),
            url: format!("https://example.com/{}", id),
            published_at: Utc::now(),
            source: "Wire".to_string(),
            categories: vec!["world".to_string()],
            relevance_score: 0.9,
            latitude: 19.07,
            longitude: 72.87,
            summary: Some("summary".to_string()),
            embedding: Some(vec![0.25, 0.5]),
        }
    }

    #[test]
    fn test_key_rounding() {
        assert_eq!(TrendingCache::key(19.076, 72.8777, 10), "trending:19.08:72.88:10");
        assert_eq!(
            TrendingCache::key(19.076, 72.8777, 10),
            TrendingCache::key(19.0761, 72.8778, 10)
        );
        assert_ne!(TrendingCache::key(19.076, 72.8777, 10), TrendingCache::key(19.076, 72.8777, 5));
        assert_eq!(TrendingCache::key(-0.001, 0.0, 3), "trending:0.00:0.00:3");
    }

    #[tokio::test]
    async fn test_nearby_coordinates_hit() {
        let cache = TrendingCache::in_memory(DEFAULT_CACHE_TTL);
        let articles = vec![article("a"), article("b")];
        cache.put(19.076, 72.8777, 10, &articles).await;

        let cached = cache.get(19.0761, 72.8778, 10).await;
        assert_eq!(cached, Some(articles));
        assert!(cache.get(19.0761, 72.8778, 20).await.is_none());
    }

    #[tokio::test]
    async fn test_entries_expire() {
        let cache = TrendingCache::in_memory(Duration::from_millis(50));
        cache.put(1.0, 2.0, 5, &[article("a")]).await;
        assert!(cache.get(1.0, 2.0, 5).await.is_some());

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert!(cache.get(1.0, 2.0, 5).await.is_none());
    }

    #[tokio::test]
    async fn test_corrupt_payload_is_deleted() {
        let store = Arc::new(MemoryCacheStore::new(DEFAULT_CACHE_TTL));
        let cache = TrendingCache::new(store.clone(), DEFAULT_CACHE_TTL);
        let key = TrendingCache::key(1.0, 2.0, 5);
        store.set(&key, "{not json".to_string(), DEFAULT_CACHE_TTL).await.unwrap();

        assert!(cache.get(1.0, 2.0, 5).await.is_none());
        assert_eq!(store.get(&key).await.unwrap(), None);
    }

    struct DownStore;

    #[async_trait]
    impl CacheStore for DownStore {
        fn name(&self) -> &'static str {
            "down"
        }
        async fn get(&self, _key: &str) -> Result<Option<String>> {
            Err(Error::Storage("connection refused".to_string()))
        }
        async fn set(&self, _key: &str, _value: String, _ttl: Duration) -> Result<()> {
            Err(Error::Storage("connection refused".to_string()))
        }
        async fn delete(&self, _key: &str) -> Result<()> {
            Err(Error::Storage("connection refused".to_string()))
        }
    }

    #[tokio::test]
    async fn test_store_failures_are_misses() {
        let cache = TrendingCache::new(Arc::new(DownStore), DEFAULT_CACHE_TTL);
        cache.put(1.0, 2.0, 5, &[article("a")]).await;
        assert!(cache.get(1.0, 2.0, 5).await.is_none());
    }
}
