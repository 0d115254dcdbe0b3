//! In-memory counter storage.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use super::{CounterState, CounterStore};
use crate::error::StorageError;

/// In-memory counter storage for a single process.
///
/// Counters are kept in a sharded map. Each increment holds the shard lock of its
/// key for the whole read-modify-write, which makes it atomic per key without a
/// global lock. Expired counters are replaced on their next access and evicted by
/// [`InMemoryStorage::purge_expired`].
#[derive(Default)]
pub struct InMemoryStorage {
    counters: DashMap<String, CounterState>,
}

impl InMemoryStorage {
    /// Create a new in-memory storage instance.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of counters currently held, expired or not.
    pub fn len(&self) -> usize {
        self.counters.len()
    }

    /// Whether no counter is held.
    pub fn is_empty(&self) -> bool {
        self.counters.is_empty()
    }

    /// Remove every expired counter, returning how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.counters.len();

        self.counters.retain(|_, state| state.expires_at > now);

        before.saturating_sub(self.counters.len())
    }

    /// Periodically purge expired counters on the current Tokio runtime.
    ///
    /// The task only holds a weak reference and stops once the storage is dropped.
    pub fn spawn_sweeper(self: &Arc<Self>, every: Duration) -> JoinHandle<()> {
        let storage = Arc::downgrade(self);

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(every);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

            // The first tick completes immediately.
            interval.tick().await;

            loop {
                interval.tick().await;

                let Some(storage) = storage.upgrade() else {
                    log::debug!("In-memory rate limit storage dropped, stopping sweeper");
                    break;
                };

                let purged = storage.purge_expired();

                if purged > 0 {
                    log::debug!("Purged {purged} expired rate limit counters, {} remaining", storage.len());
                }
            }
        })
    }
}

#[async_trait]
impl CounterStore for InMemoryStorage {
    async fn increment(&self, key: &str, duration: Duration) -> Result<CounterState, StorageError> {
        let now = Instant::now();

        let fresh = CounterState {
            consumed_points: 0,
            expires_at: now + duration,
        };

        let mut state = self.counters.entry(key.to_string()).or_insert(fresh);

        if state.expires_at <= now {
            log::debug!("Counter for key '{key}' expired, starting a new window");
            *state = fresh;
        }

        state.consumed_points += 1;

        Ok(*state)
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}
