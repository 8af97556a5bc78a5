use std::time::Duration;

use async_trait::async_trait;
use moka::future::Cache;
use nt_core::Result;

use super::CacheStore;

const MAX_ENTRIES: u64 = 10_000;

/// In-process store backed by `moka`.
///
/// Expiry is configured once for the whole cache; the per-write TTL passed
/// to [`CacheStore::set`] is not consulted.
pub struct MemoryCacheStore {
    cache: Cache<String, String>,
}

impl MemoryCacheStore {
    pub fn new(ttl: Duration) -> Self {
        let cache = Cache::builder()
            .max_capacity(MAX_ENTRIES)
            .time_to_live(ttl)
            .build();
        Self { cache }
    }

    pub fn entry_count(&self) -> u64 {
        self.cache.entry_count()
    }
}

#[async_trait]
impl CacheStore for MemoryCacheStore {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.cache.get(key).await)
    }

    async fn set(&self, key: &str, value: String, _ttl: Duration) -> Result<()> {
        self.cache.insert(key.to_string(), value).await;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.cache.invalidate(key).await;
        Ok(())
    }
}
