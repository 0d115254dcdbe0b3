//! Storage backends for rate limiting.

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use config::StorageConfig;
use tokio::time::Instant;

use crate::error::StorageError;

mod memory;
mod redis;
mod redis_pool;

pub use self::memory::InMemoryStorage;
pub use self::redis::RedisStorage;

/// Counter of one key within its current window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CounterState {
    /// Points consumed in the current window, including the current consumption.
    pub consumed_points: u64,
    /// When the counter resets to zero.
    pub expires_at: Instant,
}

/// Trait for counter storage backends.
///
/// `increment` must be atomic per key across all concurrent callers: a missing or
/// expired counter starts over at one point with a fresh expiry, a live counter is
/// incremented and keeps its expiry.
#[async_trait]
pub trait CounterStore: Send + Sync {
    /// Consume one point for the key and return the updated counter.
    async fn increment(&self, key: &str, duration: Duration) -> Result<CounterState, StorageError>;

    /// Short backend name, used in logs and metrics.
    fn name(&self) -> &'static str;
}

/// Build the storage backend selected in the configuration.
///
/// Redis storage connects eagerly and fails if the server cannot be reached.
/// In-memory storage starts its background sweeper, so this must run inside a
/// Tokio runtime.
pub async fn from_config(config: &StorageConfig) -> Result<Arc<dyn CounterStore>, StorageError> {
    match config {
        StorageConfig::Memory(memory) => {
            let storage = Arc::new(InMemoryStorage::new());
            storage.spawn_sweeper(memory.sweep_interval);

            log::debug!(
                "Using in-memory rate limit storage, sweeping every {:?}",
                memory.sweep_interval
            );

            Ok(storage)
        }
        StorageConfig::Redis(redis) => {
            let storage = RedisStorage::new(redis).await?;
            log::debug!("Using Redis rate limit storage");

            Ok(Arc::new(storage))
        }
    }
}
