//! Cache layer: TTL-bounded JSON copies of recommendation reads.
//!
//! There is deliberately no invalidation hook. Writes to the store do not
//! evict entries, so reads may be up to one TTL stale after an event.

mod keys;
mod redis_cache;

pub use keys::{CacheKey, CACHE_VERSION};
pub use redis_cache::RedisRecommendationCache;

use crate::error::CacheError;
use crate::models::Recommendation;
use async_trait::async_trait;
use std::time::Duration;
use uuid::Uuid;

/// Outcome of a cache read.
#[derive(Debug)]
pub enum CacheLookup<T> {
    Hit(T),
    Miss,
    Failed(CacheError),
}

#[async_trait]
pub trait RecommendationCache: Send + Sync {
    async fn get_recommendation(&self, id: Uuid) -> CacheLookup<Recommendation>;

    async fn set_recommendation(
        &self,
        id: Uuid,
        recommendation: &Recommendation,
        ttl: Duration,
    ) -> Result<(), CacheError>;

    async fn get_user_recommendations(&self, user_id: Uuid) -> CacheLookup<Vec<Recommendation>>;

    async fn set_user_recommendations(
        &self,
        user_id: Uuid,
        recommendations: &[Recommendation],
        ttl: Duration,
    ) -> Result<(), CacheError>;

    async fn ping(&self) -> Result<(), CacheError>;
}
