//! Cache repository for domain entity snapshots.
//!
//! Every entity is stored with its live value and a baseline: the last
//! value known to match the server. The two differ while a local edit is
//! pending, which is what conflict detection compares against.

mod cache;
mod error;
pub mod fields;
mod models;
pub mod ops;

pub use cache::EntityCache;
pub use error::{CacheError, CacheResult};
pub use models::CachedEntity;

use local_store::CollectionSchema;

/// Collection holding every cached entity, across domain collections.
pub const CACHE_COLLECTION: &str = "entity_cache";

/// Index over the domain collection name.
pub const INDEX_COLLECTION: &str = "collection";

/// Schema to register when opening the store.
pub fn schema() -> CollectionSchema {
    CollectionSchema::keyed(CACHE_COLLECTION, "cache_key").with_index(INDEX_COLLECTION, &["collection"])
}
