//! Error types for rate limiting.

use std::time::Duration;

/// Errors that can occur in storage backends.
///
/// A rejected request is not an error, see [`crate::ConsumeResult::allowed`].
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// The backend could not be reached.
    #[error("Storage connection error: {0}")]
    Connection(String),

    /// The backend rejected or failed the counter update.
    #[error("Storage query error: {0}")]
    Query(String),

    /// The backend did not answer in time.
    #[error("Storage did not respond within {0:?}")]
    Timeout(Duration),

    /// Internal storage error.
    #[error("Storage error: {0}")]
    Internal(String),
}
