use db_pool::DbConfigError;
use event_schema::DecodeError;
use rdkafka::error::KafkaError;
use thiserror::Error;

/// Startup configuration problems. Always fatal.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} environment variable not set")]
    Missing(&'static str),

    #[error("invalid value for {key}: {value}")]
    Invalid { key: &'static str, value: String },

    #[error("topic {0} is configured for more than one event kind")]
    DuplicateTopic(String),

    #[error(transparent)]
    Database(#[from] DbConfigError),
}

/// Recommendation store failures.
#[derive(Debug, Error)]
pub enum RepoError {
    #[error("recommendation not found: {0}")]
    NotFound(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Broker client failures raised while setting up the consumer.
#[derive(Debug, Error)]
pub enum ConsumerError {
    #[error("failed to create kafka consumer: {0}")]
    Client(#[source] KafkaError),

    #[error("failed to subscribe to topics {topics:?}: {source}")]
    Subscription {
        topics: Vec<String>,
        #[source]
        source: KafkaError,
    },
}

/// Per-message processing failures. Logged and dropped, never retried.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("unrecognized topic: {0}")]
    UnknownTopic(String),

    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error("store error: {0}")]
    Store(#[from] RepoError),
}

impl DispatchError {
    /// Label used for the processed-messages counter.
    pub fn outcome(&self) -> &'static str {
        match self {
            DispatchError::UnknownTopic(_) => "unknown_topic",
            DispatchError::Decode(e) if e.is_malformed() => "malformed",
            DispatchError::Decode(_) => "schema",
            DispatchError::Store(_) => "store_error",
        }
    }
}

/// Errors returned by the query API.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("store error: {0}")]
    Store(#[source] RepoError),

    /// The store read succeeded but the cache could not be populated.
    #[error("cache write failed: {0}")]
    CacheWrite(#[source] CacheError),
}

impl From<RepoError> for ServiceError {
    fn from(err: RepoError) -> Self {
        match err {
            RepoError::NotFound(what) => ServiceError::NotFound(what),
            other => ServiceError::Store(other),
        }
    }
}

/// Startup failures. Any of these aborts the process.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Subscription(ConsumerError),

    #[error("failed to connect to postgres: {0}")]
    Database(#[from] sqlx::Error),

    #[error("failed to connect to redis: {0:#}")]
    Cache(anyhow::Error),

    #[error("failed to create kafka consumer: {0}")]
    Kafka(#[source] KafkaError),
}

impl From<ConsumerError> for AppError {
    fn from(err: ConsumerError) -> Self {
        match err {
            ConsumerError::Client(e) => AppError::Kafka(e),
            other => AppError::Subscription(other),
        }
    }
}
