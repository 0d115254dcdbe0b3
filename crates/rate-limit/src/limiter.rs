//! Point consumption on top of a counter store.

use std::sync::Arc;
use std::time::Duration;

use config::RateLimitConfig;
use telemetry::metrics::RateLimitMetrics;
use tokio::time::Instant;

use crate::error::StorageError;
use crate::storage::{self, CounterStore};

/// Outcome of consuming one point for a key.
///
/// A rejection is a regular value with `allowed == false`, never an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConsumeResult {
    /// Whether the key is still within its budget after this consumption.
    pub allowed: bool,
    /// Points left in the current window, zero once the budget is exhausted.
    pub remaining_points: u64,
    /// Points consumed in the current window, this consumption included.
    pub consumed_points: u64,
    /// Milliseconds until the window resets.
    pub ms_before_next: u64,
    /// Whether this consumption opened a new window for the key.
    pub is_first_in_duration: bool,
}

impl ConsumeResult {
    /// Time until the window resets.
    pub fn reset_after(&self) -> Duration {
        Duration::from_millis(self.ms_before_next)
    }
}

/// Consumes points against a counter store.
///
/// Cheap to share behind an [`Arc`]; the store is the only mutable state.
pub struct RateLimiter {
    points: u32,
    duration: Duration,
    key_prefix: String,
    store: Arc<dyn CounterStore>,
    metrics: RateLimitMetrics,
}

impl RateLimiter {
    /// Create a limiter with the storage backend selected in the configuration.
    pub async fn new(config: &RateLimitConfig) -> Result<Self, StorageError> {
        let store = storage::from_config(&config.storage).await?;

        Ok(Self::with_store(config, store))
    }

    /// Create a limiter on top of an existing store.
    pub fn with_store(config: &RateLimitConfig, store: Arc<dyn CounterStore>) -> Self {
        log::debug!(
            "Rate limiter using {} storage: {} points per {:?}, key prefix '{}'",
            store.name(),
            config.points,
            config.duration,
            config.key_prefix
        );

        Self {
            points: config.points,
            duration: config.duration,
            key_prefix: config.key_prefix.clone(),
            store,
            metrics: RateLimitMetrics::new(),
        }
    }

    /// Points available per window.
    pub fn points(&self) -> u32 {
        self.points
    }

    /// Length of a window.
    pub fn duration(&self) -> Duration {
        self.duration
    }

    /// Prefix added to every key.
    pub fn key_prefix(&self) -> &str {
        &self.key_prefix
    }

    /// Consume one point for the key.
    ///
    /// Only a failing store produces an error.
    pub async fn consume(&self, key: &str) -> Result<ConsumeResult, StorageError> {
        let key = self.storage_key(key);

        let started = std::time::Instant::now();
        let outcome = self.store.increment(&key, self.duration).await;

        self.metrics
            .record_store_call(self.store.name(), outcome.is_ok(), started.elapsed());

        let state = outcome.inspect_err(|err| {
            self.metrics.record_decision("store_error");
            log::debug!("Counter update for key '{key}' failed: {err}");
        })?;

        let points = u64::from(self.points);
        let ms_before_next = state.expires_at.saturating_duration_since(Instant::now()).as_millis();

        let result = ConsumeResult {
            allowed: state.consumed_points <= points,
            remaining_points: points.saturating_sub(state.consumed_points),
            consumed_points: state.consumed_points,
            ms_before_next: u64::try_from(ms_before_next).unwrap_or(u64::MAX),
            is_first_in_duration: state.consumed_points == 1,
        };

        self.metrics
            .record_decision(if result.allowed { "allowed" } else { "denied" });

        log::debug!(
            "Key '{key}' consumed {}/{} points, window resets in {}ms",
            result.consumed_points,
            self.points,
            result.ms_before_next
        );

        Ok(result)
    }

    fn storage_key(&self, key: &str) -> String {
        if self.key_prefix.is_empty() {
            key.to_string()
        } else {
            format!("{}:{key}", self.key_prefix)
        }
    }
}
