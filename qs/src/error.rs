//! Store error types

use thiserror::Error;

/// Errors from store operations
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("metadata error: {0}")]
    Metadata(#[from] serde_json::Error),

    #[error("timestamp error: {0}")]
    Timestamp(#[from] chrono::ParseError),

    #[error("invalid {field}: {value}")]
    InvalidField { field: &'static str, value: String },
}

/// Result alias for store operations
pub type Result<T> = std::result::Result<T, StoreError>;

impl StoreError {
    /// Whether the error is a transient storage condition worth retrying.
    ///
    /// Covers SQLite busy/locked (another process holds the write lock)
    /// and raw I/O failures. Everything else is treated as permanent.
    pub fn is_transient(&self) -> bool {
        match self {
            StoreError::Io(_) => true,
            StoreError::Database(rusqlite::Error::SqliteFailure(e, _)) => matches!(
                e.code,
                rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked
            ),
            _ => false,
        }
    }
}
