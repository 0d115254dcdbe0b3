//! Redis-based counter storage.

use std::time::Duration;

use async_trait::async_trait;
use config::RedisConfig;
use redis::Script;
use tokio::time::Instant;

use super::redis_pool::{self, Pool};
use super::{CounterState, CounterStore};
use crate::error::StorageError;

/// Increments the counter and sets its expiry when the key is new, in one atomic step.
///
/// A key without a TTL (created outside of this script, or a lost `PEXPIRE`) gets
/// one as well, so no counter can live forever.
const INCREMENT_SCRIPT: &str = r#"
local consumed = redis.call('INCR', KEYS[1])
local ttl = redis.call('PTTL', KEYS[1])

if consumed == 1 or ttl < 0 then
    redis.call('PEXPIRE', KEYS[1], ARGV[1])
    ttl = tonumber(ARGV[1])
end

return { consumed, ttl }
"#;

/// Redis-based counter storage, shared by every process using the same server.
pub struct RedisStorage {
    pool: Pool,
    script: Script,
    response_timeout: Duration,
}

impl RedisStorage {
    /// Create a new Redis storage instance and check the server answers.
    pub async fn new(config: &RedisConfig) -> Result<Self, StorageError> {
        let pool = redis_pool::create_pool(config)
            .map_err(|e| StorageError::Connection(format!("Failed to create Redis connection pool: {e}")))?;

        let storage = Self {
            pool,
            script: Script::new(INCREMENT_SCRIPT),
            response_timeout: config.response_timeout,
        };

        storage.ping().await?;

        Ok(storage)
    }

    async fn ping(&self) -> Result<(), StorageError> {
        let mut conn = self
            .pool
            .get()
            .await
            .map_err(|e| StorageError::Connection(format!("Failed to get Redis connection from pool: {e}")))?;

        let _: String = redis::cmd("PING")
            .query_async(&mut *conn)
            .await
            .map_err(|e| StorageError::Connection(format!("Failed to ping Redis server: {e}")))?;

        Ok(())
    }

    async fn run_increment(&self, key: &str, window_millis: u64) -> Result<(u64, i64), StorageError> {
        let mut conn = self
            .pool
            .get()
            .await
            .map_err(|e| StorageError::Connection(e.to_string()))?;

        self.script
            .key(key)
            .arg(window_millis)
            .invoke_async(&mut *conn)
            .await
            .map_err(|e| StorageError::Query(e.to_string()))
    }
}

#[async_trait]
impl CounterStore for RedisStorage {
    async fn increment(&self, key: &str, duration: Duration) -> Result<CounterState, StorageError> {
        let window_millis = u64::try_from(duration.as_millis())
            .map_err(|_| StorageError::Internal(format!("Window of {duration:?} is too long")))?
            .max(1);

        let increment = self.run_increment(key, window_millis);
        let (consumed_points, ttl_millis) = tokio::time::timeout(self.response_timeout, increment)
            .await
            .map_err(|_| StorageError::Timeout(self.response_timeout))??;

        // PTTL is negative only if the key vanished between the two calls of the script.
        let ttl_millis = u64::try_from(ttl_millis).unwrap_or(window_millis);

        Ok(CounterState {
            consumed_points,
            expires_at: Instant::now() + Duration::from_millis(ttl_millis),
        })
    }

    fn name(&self) -> &'static str {
        "redis"
    }
}
