//! Queue error types.

use thiserror::Error;

/// Sync queue error type.
#[derive(Error, Debug)]
pub enum QueueError {
    /// Store error
    #[error("Store error: {0}")]
    Store(#[from] local_store::StoreError),

    /// No queued mutation with this id
    #[error("Queued mutation not found: {0}")]
    NotFound(i64),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias using QueueError.
pub type QueueResult<T> = Result<T, QueueError>;
