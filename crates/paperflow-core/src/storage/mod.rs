pub mod database;
pub mod dedup;
pub mod repositories;

pub use database::{ConnectionPool, Database, StorageError, StorageResult};
pub use dedup::DedupStore;
pub use repositories::{ConflictPolicy, DedupCounts, DedupRepository, Repository, SqliteDedupRepository};
