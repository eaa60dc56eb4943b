//! Cache error types.

use thiserror::Error;

/// Cache repository error type.
#[derive(Error, Debug)]
pub enum CacheError {
    /// Store error
    #[error("Store error: {0}")]
    Store(#[from] local_store::StoreError),

    /// Entity not cached
    #[error("Entity not cached: {collection}/{id}")]
    NotFound { collection: String, id: String },
}

/// Result type alias using CacheError.
pub type CacheResult<T> = Result<T, CacheError>;
