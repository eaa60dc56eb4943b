//! Conflict coordinator error types.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConflictError {
    /// Store error
    #[error("Store error: {0}")]
    Store(#[from] local_store::StoreError),

    /// No open conflict with this id
    #[error("Conflict not found: {0}")]
    NotFound(String),
}

/// Result type alias using ConflictError.
pub type ConflictResult<T> = Result<T, ConflictError>;
