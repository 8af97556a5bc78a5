//! Engagement-based trending ranking and its result cache.

pub mod cache;
pub mod scorer;

pub use cache::{CacheStore, MemoryCacheStore, TrendingCache, DEFAULT_CACHE_TTL};
#[cfg(feature = "redis")]
pub use cache::RedisCacheStore;
pub use scorer::{compute_score, TrendingScore, TrendingScorer};
