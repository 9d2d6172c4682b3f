use super::{CacheKey, CacheLookup, RecommendationCache};
use crate::error::CacheError;
use crate::metrics::{CACHE_ERRORS, CACHE_HITS, CACHE_MISSES, CACHE_WRITES};
use crate::models::Recommendation;
use async_trait::async_trait;
use redis::AsyncCommands;
use redis_utils::SharedConnectionManager;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, warn};
use uuid::Uuid;

const ENTITY_RECOMMENDATION: &str = "recommendation";
const ENTITY_USER_RECOMMENDATIONS: &str = "user_recommendations";

/// Redis-backed cache storing JSON values with `SETEX`.
#[derive(Clone)]
pub struct RedisRecommendationCache {
    redis: SharedConnectionManager,
}

impl RedisRecommendationCache {
    pub fn new(redis: SharedConnectionManager) -> Self {
        Self { redis }
    }

    async fn get_json<T: DeserializeOwned>(&self, entity: &str, key: &str) -> CacheLookup<T> {
        let raw: Result<Option<String>, redis::RedisError> = {
            let mut conn = self.redis.lock().await;
            conn.get(key).await
        };

        match raw {
            Ok(Some(data)) => match serde_json::from_str::<T>(&data) {
                Ok(value) => {
                    debug!(key = %key, "Cache hit");
                    CACHE_HITS.with_label_values(&[entity]).inc();
                    CacheLookup::Hit(value)
                }
                Err(e) => {
                    warn!(key = %key, error = %e, "Cached value failed to deserialize");
                    CACHE_ERRORS.with_label_values(&[entity, "decode"]).inc();
                    CacheLookup::Failed(CacheError::Serialization(e))
                }
            },
            Ok(None) => {
                debug!(key = %key, "Cache miss");
                CACHE_MISSES.with_label_values(&[entity]).inc();
                CacheLookup::Miss
            }
            Err(e) => {
                warn!(key = %key, error = %e, "Redis GET failed");
                CACHE_ERRORS.with_label_values(&[entity, "get"]).inc();
                CacheLookup::Failed(CacheError::Redis(e))
            }
        }
    }

    async fn set_json<T: Serialize + ?Sized + Sync>(
        &self,
        entity: &str,
        key: &str,
        value: &T,
        ttl: Duration,
    ) -> Result<(), CacheError> {
        let data = serde_json::to_string(value)?;
        // SETEX rejects a zero expiry
        let ttl_secs = ttl.as_secs().max(1);

        let result = {
            let mut conn = self.redis.lock().await;
            conn.set_ex::<_, _, ()>(key, data, ttl_secs).await
        };

        match result {
            Ok(()) => {
                debug!(key = %key, ttl = ttl_secs, "Cache set");
                CACHE_WRITES.with_label_values(&[entity]).inc();
                Ok(())
            }
            Err(e) => {
                warn!(key = %key, error = %e, "Redis SETEX failed");
                CACHE_ERRORS.with_label_values(&[entity, "set"]).inc();
                Err(CacheError::Redis(e))
            }
        }
    }
}

#[async_trait]
impl RecommendationCache for RedisRecommendationCache {
    async fn get_recommendation(&self, id: Uuid) -> CacheLookup<Recommendation> {
        self.get_json(ENTITY_RECOMMENDATION, &CacheKey::recommendation(id))
            .await
    }

    async fn set_recommendation(
        &self,
        id: Uuid,
        recommendation: &Recommendation,
        ttl: Duration,
    ) -> Result<(), CacheError> {
        self.set_json(
            ENTITY_RECOMMENDATION,
            &CacheKey::recommendation(id),
            recommendation,
            ttl,
        )
        .await
    }

    async fn get_user_recommendations(&self, user_id: Uuid) -> CacheLookup<Vec<Recommendation>> {
        self.get_json(
            ENTITY_USER_RECOMMENDATIONS,
            &CacheKey::user_recommendations(user_id),
        )
        .await
    }

    async fn set_user_recommendations(
        &self,
        user_id: Uuid,
        recommendations: &[Recommendation],
        ttl: Duration,
    ) -> Result<(), CacheError> {
        self.set_json(
            ENTITY_USER_RECOMMENDATIONS,
            &CacheKey::user_recommendations(user_id),
            recommendations,
            ttl,
        )
        .await
    }

    async fn ping(&self) -> Result<(), CacheError> {
        let mut conn = self.redis.lock().await;
        redis::cmd("PING")
            .query_async::<_, String>(&mut *conn)
            .await?;
        Ok(())
    }
}
