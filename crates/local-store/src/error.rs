//! Store error types.

use rusqlite::ErrorCode;
use thiserror::Error;

/// Local store error type.
#[derive(Error, Debug)]
pub enum StoreError {
    /// SQLite error
    #[error("SQLite error: {0}")]
    Sqlite(#[source] rusqlite::Error),

    /// The backing storage cannot be written (disk full, read-only, denied).
    #[error("Storage unavailable: {0}")]
    StorageUnavailable(String),

    /// Executor connection error
    #[error("Connection error: {0}")]
    Connection(String),

    /// Collection was not registered when the store was opened
    #[error("Unknown collection: {0}")]
    UnknownCollection(String),

    /// Index was not declared on the collection's schema
    #[error("Unknown index '{index}' on collection '{collection}'")]
    UnknownIndex { collection: String, index: String },

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid data error
    #[error("Invalid data: {0}")]
    InvalidData(String),
}

impl StoreError {
    /// Whether this error means the durable backend can no longer be used.
    pub fn is_storage_unavailable(&self) -> bool {
        matches!(self, StoreError::StorageUnavailable(_))
    }
}

/// SQLite result codes that mean the device refuses writes rather than
/// the statement being wrong.
fn is_unavailable_code(code: ErrorCode) -> bool {
    matches!(
        code,
        ErrorCode::DiskFull
            | ErrorCode::ReadOnly
            | ErrorCode::CannotOpen
            | ErrorCode::PermissionDenied
            | ErrorCode::SystemIoFailure
    )
}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        match &e {
            rusqlite::Error::SqliteFailure(inner, _) if is_unavailable_code(inner.code) => {
                StoreError::StorageUnavailable(e.to_string())
            }
            _ => StoreError::Sqlite(e),
        }
    }
}

/// Result type alias using StoreError.
pub type StoreResult<T> = Result<T, StoreError>;
