//! Durable, ordered log of pending mutations.
//!
//! Records live in the `sync_queue` collection of a [`local_store::Store`]
//! with store-assigned ascending ids. Synced records are kept with
//! `synced = true` until purged.

mod error;
mod models;
pub mod ops;
mod queue;

pub use error::{QueueError, QueueResult};
pub use models::{HttpMethod, NewMutation, OperationType, QueueCounts, QueuedMutation};
pub use queue::SyncQueue;

use local_store::CollectionSchema;

/// Collection holding queue records.
pub const QUEUE_COLLECTION: &str = "sync_queue";

/// Index over the `synced` flag.
pub const INDEX_SYNCED: &str = "synced";

/// Compound index over `(target_collection, target_id)`.
pub const INDEX_TARGET: &str = "target";

/// Schema to register when opening the store.
pub fn schema() -> CollectionSchema {
    CollectionSchema::auto_increment(QUEUE_COLLECTION, "id")
        .with_index(INDEX_SYNCED, &["synced"])
        .with_index(INDEX_TARGET, &["target_collection", "target_id"])
}
