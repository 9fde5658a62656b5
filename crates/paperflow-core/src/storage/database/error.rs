use thiserror::Error;

/// Failures of the deduplication store.
///
/// The pipeline treats every variant as fatal for the current document only.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Connection error: {0}")]
    Connection(#[source] rusqlite::Error),

    #[error("Migration error at version {version}: {message}")]
    Migration { version: u32, message: String },

    #[error("Constraint violation: {0}")]
    Constraint(String),

    #[error("Query error: {0}")]
    Query(String),

    #[error("Snapshot serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Connection lock poisoned")]
    Poisoned,
}

impl From<rusqlite::Error> for StorageError {
    fn from(e: rusqlite::Error) -> Self {
        match e {
            rusqlite::Error::QueryReturnedNoRows => {
                StorageError::Query("No rows returned".to_string())
            }
            rusqlite::Error::SqliteFailure(err, message)
                if err.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                StorageError::Constraint(message.unwrap_or_else(|| err.to_string()))
            }
            other => StorageError::Connection(other),
        }
    }
}

pub type StorageResult<T> = std::result::Result<T, StorageError>;
