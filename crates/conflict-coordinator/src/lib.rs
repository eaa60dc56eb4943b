//! Conflict detection and resolution.
//!
//! [`detect`] is a pure three-way comparison between the local live value,
//! the server value and the last-synced baseline. [`ConflictCoordinator`]
//! stores the resulting [`DataConflict`]s and resolves them, changing the
//! queue, cache and conflict list in a single store transaction.

mod coordinator;
mod detect;
mod error;
mod models;
pub mod ops;

pub use coordinator::ConflictCoordinator;
pub use detect::detect;
pub use error::{ConflictError, ConflictResult};
pub use models::{BulkResolution, DataConflict, MergeFn, Resolution};

use local_store::CollectionSchema;

/// Collection holding open conflicts.
pub const CONFLICTS_COLLECTION: &str = "conflicts";

/// Compound index over `(resource_type, resource_id)`.
pub const INDEX_RESOURCE: &str = "resource";

/// Schema to register when opening the store.
pub fn schema() -> CollectionSchema {
    CollectionSchema::keyed(CONFLICTS_COLLECTION, "id")
        .with_index(INDEX_RESOURCE, &["resource_type", "resource_id"])
}
