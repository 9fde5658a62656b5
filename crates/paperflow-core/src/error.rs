use thiserror::Error;

pub use crate::storage::database::StorageError;

/// Invariant violations raised while building a [`crate::models::DocumentRecord`].
///
/// A record that fails construction never enters the ingestion pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConstructionError {
    #[error("title is empty after normalization")]
    EmptyTitle,

    #[error("'{title}' is a script import without download URL or content")]
    MissingPayload { title: String },

    #[error("invalid date '{0}': expected an ISO-8601 date")]
    InvalidDate(String),
}

/// All errors that can occur in paperflow-core.
#[derive(Debug, Error)]
pub enum PaperflowError {
    #[error("Construction error: {0}")]
    Construction(#[from] ConstructionError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Entry not found: {0}")]
    EntryNotFound(String),

    #[error("Config error: {0}")]
    ConfigError(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),
}

/// Process exit codes used by the CLI.
#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitCode {
    Success = 0,
    GeneralError = 1,
    NotFound = 2,
    InvalidArgs = 3,
    StorageError = 4,
    AiError = 5,
    NetworkError = 6,
    PartialFailure = 7,
}

pub type Result<T> = std::result::Result<T, PaperflowError>;
