use crate::error::ConfigError;
use db_pool::DbConfig;
use event_schema::EventKind;
use std::str::FromStr;
use std::time::Duration;

pub const SERVICE_NAME: &str = "recommendation-service";

/// Fixed cache TTL for recommendation reads.
pub const DEFAULT_CACHE_TTL_SECS: u64 = 300;

#[derive(Debug, Clone)]
pub struct Config {
    pub kafka: KafkaConfig,
    pub database: DbConfig,
    pub cache: CacheConfig,
    pub dispatch: DispatchConfig,
    pub health_check_interval: Duration,
}

#[derive(Debug, Clone)]
pub struct KafkaConfig {
    pub brokers: String,
    pub group_id: String,
    pub auto_offset_reset: String,
    pub topics: TopicConfig,
    /// Upper bound on a single poll so cancellation is observed promptly.
    pub poll_timeout: Duration,
}

/// Concrete topic names for each event kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicConfig {
    pub new_user: String,
    pub new_product: String,
    pub update_product: String,
}

impl TopicConfig {
    pub fn topic_for(&self, kind: EventKind) -> &str {
        match kind {
            EventKind::NewUser => &self.new_user,
            EventKind::NewProduct => &self.new_product,
            EventKind::ProductUpdate => &self.update_product,
        }
    }

    pub fn names(&self) -> Vec<String> {
        EventKind::ALL
            .iter()
            .map(|kind| self.topic_for(*kind).to_string())
            .collect()
    }
}

#[derive(Debug, Clone)]
pub struct CacheConfig {
    pub redis_url: String,
    pub ttl: Duration,
}

#[derive(Debug, Clone)]
pub struct DispatchConfig {
    pub workers: usize,
    pub backlog: usize,
    pub drain_timeout: Duration,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            workers: 8,
            backlog: 1024,
            drain_timeout: Duration::from_secs(10),
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let topics = TopicConfig {
            new_user: required(&lookup, "KAFKA_TOPIC_NEW_USER")?,
            new_product: required(&lookup, "KAFKA_TOPIC_NEW_PRODUCT")?,
            update_product: required(&lookup, "KAFKA_TOPIC_UPDATE_PRODUCT")?,
        };

        let names = topics.names();
        for (i, name) in names.iter().enumerate() {
            if names[..i].contains(name) {
                return Err(ConfigError::DuplicateTopic(name.clone()));
            }
        }

        let kafka = KafkaConfig {
            brokers: required(&lookup, "KAFKA_BROKER")?,
            group_id: lookup("KAFKA_GROUP_ID").unwrap_or_else(|| SERVICE_NAME.to_string()),
            auto_offset_reset: lookup("KAFKA_AUTO_OFFSET_RESET")
                .unwrap_or_else(|| "earliest".to_string()),
            topics,
            poll_timeout: Duration::from_millis(positive(&lookup, "KAFKA_POLL_TIMEOUT_MS", 100)?),
        };

        let redis_url = lookup("REDIS_URL")
            .filter(|v| !v.trim().is_empty())
            .or_else(|| lookup("REDIS_ADDR").and_then(|addr| redis_utils::normalize_redis_url(&addr)))
            .ok_or(ConfigError::Missing("REDIS_URL"))?;

        let cache = CacheConfig {
            redis_url,
            ttl: Duration::from_secs(parse_or(&lookup, "CACHE_TTL_SECS", DEFAULT_CACHE_TTL_SECS)?),
        };

        let defaults = DispatchConfig::default();
        let dispatch = DispatchConfig {
            workers: positive(&lookup, "DISPATCH_WORKERS", defaults.workers)?,
            backlog: positive(&lookup, "DISPATCH_BACKLOG", defaults.backlog)?,
            drain_timeout: Duration::from_secs(parse_or(
                &lookup,
                "SHUTDOWN_DRAIN_TIMEOUT_SECS",
                defaults.drain_timeout.as_secs(),
            )?),
        };

        Ok(Self {
            kafka,
            database: DbConfig::from_lookup(SERVICE_NAME, &lookup)?,
            cache,
            dispatch,
            health_check_interval: Duration::from_secs(positive(
                &lookup,
                "HEALTH_CHECK_INTERVAL_SECS",
                30,
            )?),
        })
    }
}

fn required<F>(lookup: &F, key: &'static str) -> Result<String, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or(ConfigError::Missing(key))
}

fn parse_or<F, T>(lookup: &F, key: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(key) {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { key, value: raw }),
    }
}

/// Like `parse_or`, but zero is rejected.
fn positive<F, T>(lookup: &F, key: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr + PartialEq + Default,
{
    let value = parse_or(lookup, key, default)?;
    if value == T::default() {
        return Err(ConfigError::Invalid {
            key,
            value: "0".to_string(),
        });
    }
    Ok(value)
}
