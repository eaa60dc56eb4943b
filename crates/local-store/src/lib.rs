//! Durable local store for the offline sync engine.
//!
//! This crate provides:
//! - Named collections of JSON records with declared key paths
//! - Auto-increment keys and secondary indexes (single and compound)
//! - Atomic multi-collection transactions on a dedicated SQLite thread
//! - Transparent fallback to an in-memory database when disk storage fails
//!
//! ```ignore
//! let store = Store::open(path, [CollectionSchema::keyed("projects", "id")]).await?;
//! store.transaction(|tx| {
//!     tx.put("projects", json!({"id": "p1", "name": "Alpha"}))?;
//!     Ok(())
//! }).await?;
//! ```

mod error;
mod key;
mod migrations;
mod schema;
mod store;
mod txn;

pub use error::{StoreError, StoreResult};
pub use key::Key;
pub use migrations::run_migrations;
pub use schema::{CollectionSchema, IndexSpec, KeySpec, Schemas};
pub use store::{StorageMode, Store};
pub use txn::StoreTxn;
