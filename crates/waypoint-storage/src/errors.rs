//! Storage error types.

/// Errors surfaced by any repository in this crate.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// The connection pool could not hand out a connection.
    #[error("failed to acquire a database connection: {0}")]
    Pool(#[from] r2d2::Error),
    /// The underlying `SQLite` call failed.
    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    /// A row was expected but not found.
    #[error("not found: {0}")]
    NotFound(String),
    /// A blocking write task panicked before completing.
    #[error("write task panicked: {0}")]
    TaskPanicked(String),
}

impl From<StorageError> for waypoint_core::errors::StorageError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound(what) => Self::NotFound(what),
            other => Self::Backend(other.to_string()),
        }
    }
}
