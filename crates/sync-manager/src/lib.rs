//! Offline-first sync engine.
//!
//! [`SyncManager`] drains the durable [`sync_queue`] against a
//! [`RemoteApiClient`] whenever the device comes online, a mutation is
//! enqueued while online, a retry timer fires, or [`SyncManager::sync`] is
//! called. At most one drain cycle runs at a time.
//!
//! # Per-item processing
//!
//! Items are replayed in ascending id order:
//!
//! - Items at `max_retries` are skipped and stay visible as failed.
//! - Success marks the item synced (or deletes it, see [`RetentionPolicy`])
//!   and refreshes the cached entity and its baseline in the same
//!   transaction.
//! - A non-retryable failure jumps straight to `max_retries`. A 409 also
//!   refetches the resource so conflicts can be detected.
//! - A retryable failure bumps `retry_count` and stamps `next_attempt_at`.
//!   Until then the item and every later item for the same resource are
//!   held back; unrelated items keep draining.
//!
//! The cycle stops scheduling items as soon as connectivity drops.
//!
//! [`RemoteApiClient`]: remote_api_client::RemoteApiClient

mod backoff;
mod clock;
mod drain;
mod error;
mod fresh;
mod manager;
mod settings;
mod status;

#[cfg(test)]
mod tests;

pub use backoff::{compute_backoff, next_wake};
pub use error::{SyncError, SyncResult};
pub use manager::SyncManager;
pub use settings::{RetentionPolicy, SyncSettings};
pub use status::{DrainOutcome, DrainReport, EngineFault, SyncEvent, SyncStatus};

use local_store::{CollectionSchema, Store, StoreResult};
use std::path::Path;

/// Every collection the engine needs.
pub fn engine_schemas() -> Vec<CollectionSchema> {
    vec![
        sync_queue::schema(),
        entity_cache::schema(),
        conflict_coordinator::schema(),
    ]
}

/// Open the engine's store at `path`, memory-only if the file cannot be used.
pub async fn open_store(path: &Path) -> StoreResult<Store> {
    Store::open(path, engine_schemas()).await
}

/// Open a memory-only engine store.
pub async fn open_memory_store() -> StoreResult<Store> {
    Store::open_in_memory(engine_schemas()).await
}
