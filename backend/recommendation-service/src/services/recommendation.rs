use crate::cache::{CacheLookup, RecommendationCache};
use crate::config::DEFAULT_CACHE_TTL_SECS;
use crate::error::ServiceError;
use crate::models::Recommendation;
use crate::repository::RecommendationReader;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HealthStatus {
    pub store: bool,
    pub cache: bool,
}

impl HealthStatus {
    pub fn is_healthy(&self) -> bool {
        self.store && self.cache
    }
}

/// Query side of the pipeline with cache-aside reads.
///
/// Concurrent misses for the same key are not collapsed; each one reads the
/// store and rewrites the cache entry.
pub struct RecommendationService {
    reader: Arc<dyn RecommendationReader>,
    cache: Arc<dyn RecommendationCache>,
    cache_ttl: Duration,
}

impl RecommendationService {
    pub fn new(reader: Arc<dyn RecommendationReader>, cache: Arc<dyn RecommendationCache>) -> Self {
        Self {
            reader,
            cache,
            cache_ttl: Duration::from_secs(DEFAULT_CACHE_TTL_SECS),
        }
    }

    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = ttl;
        self
    }

    /// All recommendations, always read from the store.
    pub async fn get_recommendations(&self) -> Result<Vec<Recommendation>, ServiceError> {
        Ok(self.reader.list_all().await?)
    }

    pub async fn get_recommendation_by_id(&self, id: Uuid) -> Result<Recommendation, ServiceError> {
        match self.cache.get_recommendation(id).await {
            CacheLookup::Hit(recommendation) => {
                debug!(id = %id, "Cache HIT for recommendation");
                return Ok(recommendation);
            }
            CacheLookup::Miss => debug!(id = %id, "Cache MISS for recommendation"),
            CacheLookup::Failed(e) => {
                warn!(id = %id, error = %e, "Cache error for recommendation, reading store")
            }
        }

        let recommendation = self.reader.get_by_id(id).await?;

        self.cache
            .set_recommendation(id, &recommendation, self.cache_ttl)
            .await
            .map_err(ServiceError::CacheWrite)?;

        Ok(recommendation)
    }

    pub async fn get_recommendations_by_user_id(
        &self,
        user_id: Uuid,
    ) -> Result<Vec<Recommendation>, ServiceError> {
        match self.cache.get_user_recommendations(user_id).await {
            CacheLookup::Hit(recommendations) => {
                debug!(user = %user_id, "Cache HIT for user recommendations");
                return Ok(recommendations);
            }
            CacheLookup::Miss => debug!(user = %user_id, "Cache MISS for user recommendations"),
            CacheLookup::Failed(e) => {
                warn!(user = %user_id, error = %e, "Cache error for user recommendations, reading store")
            }
        }

        let recommendations = self.reader.list_by_user(user_id).await?;

        self.cache
            .set_user_recommendations(user_id, &recommendations, self.cache_ttl)
            .await
            .map_err(ServiceError::CacheWrite)?;

        Ok(recommendations)
    }

    pub async fn health_check(&self) -> HealthStatus {
        let store = match self.reader.ping().await {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, "Store health check failed");
                false
            }
        };
        let cache = match self.cache.ping().await {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, "Cache health check failed");
                false
            }
        };
        HealthStatus { store, cache }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CacheKey;
    use crate::error::{CacheError, RepoError};
    use crate::repository::MockRecommendationReader;
    use async_trait::async_trait;
    use chrono::Utc;
    use mockall::predicate::eq;
    use serde::de::DeserializeOwned;
    use serde::Serialize;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use tokio::time::Instant;

    /// JSON-in-memory cache that honours TTLs, keyed the same way as Redis.
    #[derive(Default)]
    struct InMemoryCache {
        entries: Mutex<HashMap<String, (String, Instant, Duration)>>,
    }

    impl InMemoryCache {
        fn ttl_of(&self, key: &str) -> Option<Duration> {
            self.entries.lock().unwrap().get(key).map(|(_, _, ttl)| *ttl)
        }

        fn len(&self) -> usize {
            self.entries.lock().unwrap().len()
        }

        fn get_json<T: DeserializeOwned>(&self, key: &str) -> CacheLookup<T> {
            let entries = self.entries.lock().unwrap();
            match entries.get(key) {
                Some((data, expires, _)) if *expires > Instant::now() => {
                    match serde_json::from_str(data) {
                        Ok(v) => CacheLookup::Hit(v),
                        Err(e) => CacheLookup::Failed(CacheError::Serialization(e)),
                    }
                }
                _ => CacheLookup::Miss,
            }
        }

        fn set_json<T: Serialize + ?Sized>(
            &self,
            key: String,
            value: &T,
            ttl: Duration,
        ) -> Result<(), CacheError> {
            let data = serde_json::to_string(value)?;
            self.entries
                .lock()
                .unwrap()
                .insert(key, (data, Instant::now() + ttl, ttl));
            Ok(())
        }
    }

    #[async_trait]
    impl RecommendationCache for InMemoryCache {
        async fn get_recommendation(&self, id: Uuid) -> CacheLookup<Recommendation> {
            self.get_json(&CacheKey::recommendation(id))
        }

        async fn set_recommendation(
            &self,
            id: Uuid,
            recommendation: &Recommendation,
            ttl: Duration,
        ) -> Result<(), CacheError> {
            self.set_json(CacheKey::recommendation(id), recommendation, ttl)
        }

        async fn get_user_recommendations(
            &self,
            user_id: Uuid,
        ) -> CacheLookup<Vec<Recommendation>> {
            self.get_json(&CacheKey::user_recommendations(user_id))
        }

        async fn set_user_recommendations(
            &self,
            user_id: Uuid,
            recommendations: &[Recommendation],
            ttl: Duration,
        ) -> Result<(), CacheError> {
            self.set_json(CacheKey::user_recommendations(user_id), recommendations, ttl)
        }

        async fn ping(&self) -> Result<(), CacheError> {
            Ok(())
        }
    }

    /// Cache whose backend is unreachable.
    struct DownCache;

    fn redis_down() -> CacheError {
        CacheError::Redis(redis::RedisError::from((
            redis::ErrorKind::IoError,
            "connection refused",
        )))
    }

    #[async_trait]
    impl RecommendationCache for DownCache {
        async fn get_recommendation(&self, _id: Uuid) -> CacheLookup<Recommendation> {
            CacheLookup::Failed(redis_down())
        }

        async fn set_recommendation(
            &self,
            _id: Uuid,
            _recommendation: &Recommendation,
            _ttl: Duration,
        ) -> Result<(), CacheError> {
            Err(redis_down())
        }

        async fn get_user_recommendations(
            &self,
            _user_id: Uuid,
        ) -> CacheLookup<Vec<Recommendation>> {
            CacheLookup::Failed(redis_down())
        }

        async fn set_user_recommendations(
            &self,
            _user_id: Uuid,
            _recommendations: &[Recommendation],
            _ttl: Duration,
        ) -> Result<(), CacheError> {
            Err(redis_down())
        }

        async fn ping(&self) -> Result<(), CacheError> {
            Err(redis_down())
        }
    }

    fn recommendation(user_id: Uuid, score: f64) -> Recommendation {
        Recommendation {
            id: Uuid::new_v4(),
            user_id,
            product_id: Uuid::new_v4(),
            score,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn service(
        reader: MockRecommendationReader,
        cache: Arc<dyn RecommendationCache>,
    ) -> RecommendationService {
        RecommendationService::new(Arc::new(reader), cache)
    }

    #[tokio::test]
    async fn test_cache_round_trip_skips_store() {
        let rec = recommendation(Uuid::new_v4(), 4.8);
        let cache = Arc::new(InMemoryCache::default());
        cache
            .set_recommendation(rec.id, &rec, Duration::from_secs(300))
            .await
            .unwrap();

        let mut reader = MockRecommendationReader::new();
        reader.expect_get_by_id().times(0);

        let svc = service(reader, cache);
        let got = svc.get_recommendation_by_id(rec.id).await.unwrap();
        assert_eq!(got, rec);
    }

    #[tokio::test]
    async fn test_miss_reads_store_once_and_populates_cache() {
        let rec = recommendation(Uuid::new_v4(), 4.9);
        let stored = rec.clone();

        let mut reader = MockRecommendationReader::new();
        reader
            .expect_get_by_id()
            .with(eq(rec.id))
            .times(1)
            .returning(move |_| Ok(stored.clone()));

        let cache = Arc::new(InMemoryCache::default());
        let svc = service(reader, cache.clone());

        let first = svc.get_recommendation_by_id(rec.id).await.unwrap();
        let second = svc.get_recommendation_by_id(rec.id).await.unwrap();

        assert_eq!(first, rec);
        assert_eq!(second, rec);
        assert_eq!(
            cache.ttl_of(&CacheKey::recommendation(rec.id)),
            Some(Duration::from_secs(300))
        );
    }

    #[tokio::test]
    async fn test_not_found_caches_nothing() {
        let id = Uuid::new_v4();
        let mut reader = MockRecommendationReader::new();
        reader
            .expect_get_by_id()
            .returning(|id| Err(RepoError::NotFound(id.to_string())));

        let cache = Arc::new(InMemoryCache::default());
        let svc = service(reader, cache.clone());

        let err = svc.get_recommendation_by_id(id).await.unwrap_err();
        assert!(matches!(err, ServiceError::NotFound(_)));
        assert_eq!(cache.len(), 0);
    }

    #[tokio::test]
    async fn test_store_failure_propagates() {
        let mut reader = MockRecommendationReader::new();
        reader
            .expect_list_by_user()
            .returning(|_| Err(RepoError::Database(sqlx::Error::PoolTimedOut)));

        let cache = Arc::new(InMemoryCache::default());
        let svc = service(reader, cache.clone());

        let err = svc
            .get_recommendations_by_user_id(Uuid::new_v4())
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Store(_)));
        assert_eq!(cache.len(), 0);
    }

    #[tokio::test]
    async fn test_by_user_is_cached() {
        let user_id = Uuid::new_v4();
        let recs = vec![recommendation(user_id, 4.9), recommendation(user_id, 4.7)];
        let stored = recs.clone();

        let mut reader = MockRecommendationReader::new();
        reader
            .expect_list_by_user()
            .with(eq(user_id))
            .times(1)
            .returning(move |_| Ok(stored.clone()));

        let svc = service(reader, Arc::new(InMemoryCache::default()));

        assert_eq!(svc.get_recommendations_by_user_id(user_id).await.unwrap(), recs);
        assert_eq!(svc.get_recommendations_by_user_id(user_id).await.unwrap(), recs);
    }

    #[tokio::test]
    async fn test_empty_user_list_is_cached() {
        let user_id = Uuid::new_v4();
        let mut reader = MockRecommendationReader::new();
        reader
            .expect_list_by_user()
            .times(1)
            .returning(|_| Ok(Vec::new()));

        let svc = service(reader, Arc::new(InMemoryCache::default()));

        assert!(svc.get_recommendations_by_user_id(user_id).await.unwrap().is_empty());
        assert!(svc.get_recommendations_by_user_id(user_id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_list_all_bypasses_cache() {
        let recs = vec![recommendation(Uuid::new_v4(), 4.6)];
        let stored = recs.clone();

        let mut reader = MockRecommendationReader::new();
        reader
            .expect_list_all()
            .times(2)
            .returning(move || Ok(stored.clone()));

        let cache = Arc::new(InMemoryCache::default());
        let svc = service(reader, cache.clone());

        assert_eq!(svc.get_recommendations().await.unwrap(), recs);
        assert_eq!(svc.get_recommendations().await.unwrap(), recs);
        assert_eq!(cache.len(), 0);
    }

    #[tokio::test]
    async fn test_cache_read_failure_falls_through_and_write_failure_surfaces() {
        let rec = recommendation(Uuid::new_v4(), 4.8);
        let stored = rec.clone();

        let mut reader = MockRecommendationReader::new();
        reader
            .expect_get_by_id()
            .times(1)
            .returning(move |_| Ok(stored.clone()));

        let svc = service(reader, Arc::new(DownCache));

        let err = svc.get_recommendation_by_id(rec.id).await.unwrap_err();
        assert!(matches!(err, ServiceError::CacheWrite(_)));
    }

    #[tokio::test]
    async fn test_custom_ttl_is_used() {
        let rec = recommendation(Uuid::new_v4(), 4.8);
        let stored = rec.clone();

        let mut reader = MockRecommendationReader::new();
        reader
            .expect_get_by_id()
            .returning(move |_| Ok(stored.clone()));

        let cache = Arc::new(InMemoryCache::default());
        let svc = service(reader, cache.clone()).with_cache_ttl(Duration::from_secs(30));
        svc.get_recommendation_by_id(rec.id).await.unwrap();

        assert_eq!(
            cache.ttl_of(&CacheKey::recommendation(rec.id)),
            Some(Duration::from_secs(30))
        );
    }

    #[tokio::test]
    async fn test_health_check() {
        let mut reader = MockRecommendationReader::new();
        reader.expect_ping().returning(|| Ok(()));

        let healthy = service(reader, Arc::new(InMemoryCache::default()))
            .health_check()
            .await;
        assert!(healthy.is_healthy());

        let mut reader = MockRecommendationReader::new();
        reader.expect_ping().returning(|| Ok(()));

        let degraded = service(reader, Arc::new(DownCache)).health_check().await;
        assert_eq!(
            degraded,
            HealthStatus {
                store: true,
                cache: false
            }
        );
    }
}
