use anyhow::{anyhow, Context, Result};
use redis::aio::ConnectionManager;
use redis::{Client, ConnectionInfo, IntoConnectionInfo};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::time::{timeout, Duration};
use tracing::{debug, info};

/// Shared Redis connection manager guarded by a Tokio mutex.
pub type SharedConnectionManager = Arc<Mutex<ConnectionManager>>;

const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Redis connection handle shared by every cache user in the process.
#[derive(Clone)]
pub struct RedisPool {
    manager: SharedConnectionManager,
}

impl RedisPool {
    pub async fn connect(redis_url: &str) -> Result<Self> {
        Self::connect_with_timeout(redis_url, DEFAULT_CONNECT_TIMEOUT).await
    }

    pub async fn connect_with_timeout(redis_url: &str, connect_timeout: Duration) -> Result<Self> {
        let info: ConnectionInfo = redis_url
            .into_connection_info()
            .context("failed to parse REDIS_URL connection string")?;

        debug!(addr = ?info.addr, "Connecting to Redis");

        let client = Client::open(info).context("failed to construct Redis client")?;
        let connection_manager = timeout(connect_timeout, ConnectionManager::new(client))
            .await
            .map_err(|_| anyhow!("timed out connecting to Redis after {:?}", connect_timeout))?
            .context("failed to initialize Redis connection manager")?;

        let pool = Self {
            manager: Arc::new(Mutex::new(connection_manager)),
        };
        pool.ping().await.context("Redis did not answer PING")?;

        info!("Redis connection established");
        Ok(pool)
    }

    pub fn manager(&self) -> SharedConnectionManager {
        self.manager.clone()
    }

    pub async fn ping(&self) -> Result<()> {
        ping(&self.manager).await
    }
}

/// Issue a `PING` on a shared connection.
pub async fn ping(manager: &SharedConnectionManager) -> Result<()> {
    let mut conn = manager.lock().await;
    let reply: String = redis::cmd("PING")
        .query_async(&mut *conn)
        .await
        .context("PING failed")?;

    if reply != "PONG" {
        return Err(anyhow!("unexpected PING reply: {}", reply));
    }
    Ok(())
}

/// Accept either a full `redis://` URL or a bare `host:port` address.
pub fn normalize_redis_url(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    if trimmed.starts_with("redis://") || trimmed.starts_with("rediss://") {
        Some(trimmed.to_string())
    } else {
        Some(format!("redis://{}", trimmed))
    }
}
