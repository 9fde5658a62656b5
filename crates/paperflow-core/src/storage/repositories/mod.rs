mod dedup_repository;

pub use dedup_repository::{ConflictPolicy, DedupCounts, DedupRepository, SqliteDedupRepository};

use crate::storage::database::StorageResult;

pub trait Repository {
    type Entity;
    type Id;

    fn find_by_id(&self, id: &Self::Id) -> StorageResult<Option<Self::Entity>>;
    fn delete(&self, id: &Self::Id) -> StorageResult<bool>;
}
