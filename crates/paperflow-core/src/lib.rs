pub mod config;
pub mod error;
pub mod models;
pub mod storage;

pub use config::{AppConfig, DEFAULT_ALLOWED_TAGS};
pub use error::{ConstructionError, ExitCode, PaperflowError, Result};
pub use models::*;

pub use storage::database::{ConnectionPool, Database, StorageError, StorageResult, open_database, open_in_memory};
pub use storage::dedup::DedupStore;
pub use storage::repositories::{ConflictPolicy, DedupCounts, DedupRepository, Repository, SqliteDedupRepository};
