//! Recommendation service worker
//!
//! Environment variables:
//! - KAFKA_BROKER: Kafka bootstrap servers (required)
//! - KAFKA_TOPIC_NEW_USER / KAFKA_TOPIC_NEW_PRODUCT / KAFKA_TOPIC_UPDATE_PRODUCT (required)
//! - KAFKA_GROUP_ID: consumer group (default: "recommendation-service")
//! - DATABASE_URL: PostgreSQL URL (required), DB_* pool overrides
//! - REDIS_URL or REDIS_ADDR (required)
//! - DISPATCH_WORKERS / DISPATCH_BACKLOG / SHUTDOWN_DRAIN_TIMEOUT_SECS
//! - KAFKA_POLL_TIMEOUT_MS: upper bound on a single poll (default 100, must be > 0)
//! - LOG_FORMAT=json for JSON logs

use anyhow::Result;
use recommendation_service::cache::{RecommendationCache, RedisRecommendationCache};
use recommendation_service::config::{Config, SERVICE_NAME};
use recommendation_service::consumer::{ConsumerOptions, EventConsumer, KafkaMessageSource};
use recommendation_service::dispatch::{EventDispatcher, TopicRouter, WorkerPool};
use recommendation_service::lifecycle::{Lifecycle, ShutdownReason, ShutdownSignal};
use recommendation_service::repository::{
    PgRecommendationRepository, RecommendationReader, RecommendationWriter,
};
use recommendation_service::services::RecommendationService;
use recommendation_service::AppError;
use redis_utils::RedisPool;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    info!("Starting {} v{}", SERVICE_NAME, env!("CARGO_PKG_VERSION"));

    let lifecycle = Arc::new(Lifecycle::new());

    let (consumer, service, config) = match bootstrap(&lifecycle).await {
        Ok(parts) => parts,
        Err(e) => {
            error!(error = %e, "Startup failed");
            lifecycle
                .shutdown(ShutdownReason::Requested("startup failed".into()))
                .await;
            return Err(e.into());
        }
    };

    tokio::spawn(health_loop(
        service,
        config.health_check_interval,
        lifecycle.signal(),
    ));

    {
        let lifecycle = lifecycle.clone();
        tokio::spawn(async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => {
                    info!("Received Ctrl-C");
                    lifecycle.trigger(ShutdownReason::Interrupted);
                }
                Err(e) => error!(error = %e, "Failed to listen for Ctrl-C"),
            }
        });
    }

    let outcome = consumer.run().await;

    let reason = match &outcome {
        Ok(reason) => reason.clone(),
        Err(e) => ShutdownReason::Requested(format!("consumer failed: {}", e)),
    };
    lifecycle.shutdown(reason).await;

    outcome.map_err(AppError::from)?;
    Ok(())
}

/// Connect every backend and subscribe the consumer. Resources that need
/// closing are registered with `lifecycle` as they are created.
async fn bootstrap(
    lifecycle: &Lifecycle,
) -> Result<
    (
        EventConsumer<KafkaMessageSource>,
        Arc<RecommendationService>,
        Config,
    ),
    AppError,
> {
    let config = Config::from_env()?;
    config.database.log_config();

    let pool = db_pool::create_pool(&config.database).await?;
    let _metrics_task = db_pool::spawn_metrics_updater(pool.clone(), SERVICE_NAME.to_string());
    info!("Connected to PostgreSQL");

    let repo = Arc::new(PgRecommendationRepository::new(pool));
    lifecycle.register(repo.clone());

    let redis = RedisPool::connect(&config.cache.redis_url)
        .await
        .map_err(AppError::Cache)?;

    let cache: Arc<dyn RecommendationCache> =
        Arc::new(RedisRecommendationCache::new(redis.manager()));
    let reader: Arc<dyn RecommendationReader> = repo.clone();
    let writer: Arc<dyn RecommendationWriter> = repo;

    let service = Arc::new(
        RecommendationService::new(reader, cache).with_cache_ttl(config.cache.ttl),
    );

    let router = TopicRouter::new(&config.kafka.topics);
    info!(
        topics = ?router.topics(),
        brokers = %config.kafka.brokers,
        group_id = %config.kafka.group_id,
        "Topic routing configured"
    );

    let dispatcher = Arc::new(EventDispatcher::new(router, writer));
    let workers = WorkerPool::start(
        config.dispatch.workers,
        config.dispatch.backlog,
        dispatcher,
    );

    let source = KafkaMessageSource::new(&config.kafka)?;
    let mut consumer = EventConsumer::new(
        source,
        workers,
        ConsumerOptions::from_config(&config.kafka, &config.dispatch),
        lifecycle.signal(),
    );
    consumer.subscribe().await?;

    Ok((consumer, service, config))
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "recommendation_service=info,db_pool=info,redis_utils=info".into());

    let json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
}

async fn health_loop(
    service: Arc<RecommendationService>,
    interval: Duration,
    mut shutdown: ShutdownSignal,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = ticker.tick() => {
                let status = service.health_check().await;
                if !status.is_healthy() {
                    warn!(store = status.store, cache = status.cache, "Service degraded");
                }
            }
        }
    }
}
