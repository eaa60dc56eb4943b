//! Sync manager error types.
//!
//! Only the caller-facing entry points return these. Drain cycles never
//! fail; their problems land in queue state or are broadcast as faults.

use remote_api_client::RemoteFailure;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Store error: {0}")]
    Store(#[from] local_store::StoreError),

    #[error("Queue error: {0}")]
    Queue(#[from] sync_queue::QueueError),

    #[error("Cache error: {0}")]
    Cache(#[from] entity_cache::CacheError),

    #[error("Conflict error: {0}")]
    Conflict(#[from] conflict_coordinator::ConflictError),

    /// Fetching fresh server data failed.
    #[error("Remote request failed: {0}")]
    Remote(RemoteFailure),
}

/// Result type alias using SyncError.
pub type SyncResult<T> = Result<T, SyncError>;
