//! Database connection pool management
//!
//! Builds the PostgreSQL pool shared by the recommendation store and keeps
//! pool gauges current in the background.

mod metrics;

pub use metrics::update_pool_metrics;

use sqlx::postgres::{PgPool, PgPoolOptions};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

const METRICS_REFRESH_INTERVAL: Duration = Duration::from_secs(30);

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DbConfigError {
    #[error("{0} environment variable not set")]
    Missing(&'static str),

    #[error("invalid value for {key}: {value}")]
    Invalid { key: &'static str, value: String },
}

/// Database connection pool configuration
#[derive(Clone)]
pub struct DbConfig {
    /// Service name for metrics labeling
    pub service_name: String,
    /// PostgreSQL connection URL
    pub database_url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    /// Timeout for the verification query issued after connecting
    pub connect_timeout_secs: u64,
    /// Timeout for getting a connection out of the pool
    pub acquire_timeout_secs: u64,
    pub idle_timeout_secs: u64,
    pub max_lifetime_secs: u64,
}

impl fmt::Debug for DbConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DbConfig")
            .field("service_name", &self.service_name)
            .field("database_url", &"[REDACTED]")
            .field("max_connections", &self.max_connections)
            .field("min_connections", &self.min_connections)
            .field("connect_timeout_secs", &self.connect_timeout_secs)
            .field("acquire_timeout_secs", &self.acquire_timeout_secs)
            .field("idle_timeout_secs", &self.idle_timeout_secs)
            .field("max_lifetime_secs", &self.max_lifetime_secs)
            .finish()
    }
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            service_name: String::from("unknown"),
            database_url: String::new(),
            max_connections: 10,
            min_connections: 2,
            connect_timeout_secs: 5,
            acquire_timeout_secs: 10,
            idle_timeout_secs: 600,
            max_lifetime_secs: 1800,
        }
    }
}

impl DbConfig {
    /// Read the pool configuration from process environment variables.
    pub fn from_env(service_name: &str) -> Result<Self, DbConfigError> {
        Self::from_lookup(service_name, |key| std::env::var(key).ok())
    }

    /// Read the pool configuration through an arbitrary key lookup.
    ///
    /// `DATABASE_URL` is required; every `DB_*` tuning knob falls back to the
    /// default when absent but is rejected when present and unparsable.
    pub fn from_lookup<F>(service_name: &str, lookup: F) -> Result<Self, DbConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let database_url = lookup("DATABASE_URL")
            .filter(|v| !v.trim().is_empty())
            .ok_or(DbConfigError::Missing("DATABASE_URL"))?;

        let defaults = Self::default();
        let config = Self {
            service_name: service_name.to_string(),
            database_url,
            max_connections: parse_or(&lookup, "DB_MAX_CONNECTIONS", defaults.max_connections)?,
            min_connections: parse_or(&lookup, "DB_MIN_CONNECTIONS", defaults.min_connections)?,
            connect_timeout_secs: parse_or(
                &lookup,
                "DB_CONNECT_TIMEOUT_SECS",
                defaults.connect_timeout_secs,
            )?,
            acquire_timeout_secs: parse_or(
                &lookup,
                "DB_ACQUIRE_TIMEOUT_SECS",
                defaults.acquire_timeout_secs,
            )?,
            idle_timeout_secs: parse_or(&lookup, "DB_IDLE_TIMEOUT_SECS", defaults.idle_timeout_secs)?,
            max_lifetime_secs: parse_or(
                &lookup,
                "DB_MAX_LIFETIME_SECS",
                defaults.max_lifetime_secs,
            )?,
        };

        if config.max_connections == 0 {
            return Err(DbConfigError::Invalid {
                key: "DB_MAX_CONNECTIONS",
                value: "0".to_string(),
            });
        }
        if config.min_connections > config.max_connections {
            return Err(DbConfigError::Invalid {
                key: "DB_MIN_CONNECTIONS",
                value: config.min_connections.to_string(),
            });
        }

        Ok(config)
    }

    /// Log pool configuration details
    pub fn log_config(&self) {
        info!(
            "Database Pool Configuration: \
             max_connections={}, min_connections={}, \
             connect_timeout={}s, acquire_timeout={}s, idle_timeout={}s, max_lifetime={}s",
            self.max_connections,
            self.min_connections,
            self.connect_timeout_secs,
            self.acquire_timeout_secs,
            self.idle_timeout_secs,
            self.max_lifetime_secs
        );
    }
}

fn parse_or<F, T>(lookup: &F, key: &'static str, default: T) -> Result<T, DbConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(key) {
        None => Ok(default),
        Some(raw) => raw.trim().parse().map_err(|_| DbConfigError::Invalid { key, value: raw }),
    }
}

/// Create a PostgreSQL connection pool and verify it with `SELECT 1`.
pub async fn create_pool(config: &DbConfig) -> Result<PgPool, sqlx::Error> {
    debug!(
        "Creating database pool: service={}, max={}, min={}, \
         acquire_timeout={}s, verify_timeout={}s, idle_timeout={}s",
        config.service_name,
        config.max_connections,
        config.min_connections,
        config.acquire_timeout_secs,
        config.connect_timeout_secs,
        config.idle_timeout_secs
    );

    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .acquire_timeout(Duration::from_secs(config.acquire_timeout_secs))
        .idle_timeout(Duration::from_secs(config.idle_timeout_secs))
        .max_lifetime(Duration::from_secs(config.max_lifetime_secs))
        .test_before_acquire(true)
        .connect(&config.database_url)
        .await?;

    match tokio::time::timeout(
        Duration::from_secs(config.connect_timeout_secs),
        sqlx::query("SELECT 1").execute(&pool),
    )
    .await
    {
        Ok(Ok(_)) => {
            info!(
                service = %config.service_name,
                "Database pool created and verified successfully"
            );
            update_pool_metrics(&pool, &config.service_name);
            Ok(pool)
        }
        Ok(Err(e)) => {
            error!(
                service = %config.service_name,
                error = %e,
                "Database connection verification failed"
            );
            Err(e)
        }
        Err(_) => {
            error!(
                service = %config.service_name,
                timeout_secs = config.connect_timeout_secs,
                "Database connection verification timeout"
            );
            Err(sqlx::Error::Io(std::io::Error::new(
                std::io::ErrorKind::TimedOut,
                "Database verification timeout",
            )))
        }
    }
}

/// Refresh pool gauges periodically until the pool is closed.
pub fn spawn_metrics_updater(pool: PgPool, service: String) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(METRICS_REFRESH_INTERVAL);
        loop {
            interval.tick().await;
            if pool.is_closed() {
                debug!(service = %service, "Pool closed, stopping metrics updater");
                break;
            }
            update_pool_metrics(&pool, &service);
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn test_default_config() {
        let config = DbConfig::default();
        assert_eq!(config.max_connections, 10);
        assert_eq!(config.min_connections, 2);
        assert_eq!(config.connect_timeout_secs, 5);
        assert_eq!(config.acquire_timeout_secs, 10);
    }

    #[test]
    fn test_missing_database_url() {
        let err = DbConfig::from_lookup("svc", lookup_from(&[])).unwrap_err();
        assert_eq!(err, DbConfigError::Missing("DATABASE_URL"));
    }

    #[test]
    fn test_overrides_are_applied() {
        let config = DbConfig::from_lookup(
            "recommendation-service",
            lookup_from(&[
                ("DATABASE_URL", "postgres://localhost/test"),
                ("DB_MAX_CONNECTIONS", "16"),
                ("DB_MIN_CONNECTIONS", "4"),
                ("DB_IDLE_TIMEOUT_SECS", "120"),
            ]),
        )
        .unwrap();

        assert_eq!(config.service_name, "recommendation-service");
        assert_eq!(config.max_connections, 16);
        assert_eq!(config.min_connections, 4);
        assert_eq!(config.idle_timeout_secs, 120);
        assert_eq!(config.max_lifetime_secs, 1800);
    }

    #[test]
    fn test_unparsable_override_is_rejected() {
        let err = DbConfig::from_lookup(
            "svc",
            lookup_from(&[
                ("DATABASE_URL", "postgres://localhost/test"),
                ("DB_MAX_CONNECTIONS", "lots"),
            ]),
        )
        .unwrap_err();

        assert!(matches!(
            err,
            DbConfigError::Invalid {
                key: "DB_MAX_CONNECTIONS",
                ..
            }
        ));
    }

    #[test]
    fn test_min_above_max_is_rejected() {
        let err = DbConfig::from_lookup(
            "svc",
            lookup_from(&[
                ("DATABASE_URL", "postgres://localhost/test"),
                ("DB_MAX_CONNECTIONS", "2"),
                ("DB_MIN_CONNECTIONS", "5"),
            ]),
        )
        .unwrap_err();

        assert!(matches!(
            err,
            DbConfigError::Invalid {
                key: "DB_MIN_CONNECTIONS",
                ..
            }
        ));
    }

    #[test]
    fn test_debug_redacts_url() {
        let config = DbConfig {
            database_url: "postgres://user:secret@db/app".to_string(),
            ..DbConfig::default()
        };
        let rendered = format!("{:?}", config);
        assert!(!rendered.contains("secret"));
        assert!(rendered.contains("[REDACTED]"));
    }

    #[test]
    #[serial_test::serial]
    fn test_from_env_reads_process_environment() {
        std::env::remove_var("DB_MAX_CONNECTIONS");
        std::env::remove_var("DB_MIN_CONNECTIONS");
        std::env::set_var("DATABASE_URL", "postgres://localhost/env_test");

        let config = DbConfig::from_env("env-service").unwrap();
        assert_eq!(config.database_url, "postgres://localhost/env_test");
        assert_eq!(config.max_connections, 10);

        std::env::remove_var("DATABASE_URL");
    }
}
