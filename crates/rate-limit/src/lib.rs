//! Rate limiting functionality for Turnstile.
//!
//! A [`RateLimiter`] consumes one point per call for a key and reports whether the
//! key is still within its budget. Counters live in a [`CounterStore`]:
//! - [`InMemoryStorage`] for a single process
//! - [`RedisStorage`] to share counters between processes

#![deny(missing_docs)]

mod error;
mod limiter;
mod storage;

pub use error::StorageError;
pub use limiter::{ConsumeResult, RateLimiter};
pub use storage::{CounterState, CounterStore, InMemoryStorage, RedisStorage, from_config};
