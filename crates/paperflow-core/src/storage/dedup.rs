use chrono::NaiveDate;

use crate::models::{CustomFields, DedupEntry, NormalizedTitle};
use crate::storage::database::StorageResult;

/// Persistent record of titles already admitted into the pipeline.
///
/// Implementations must tolerate concurrent `record_seen` / `has_been_seen`
/// calls; the unique title key is the only admission guard.
pub trait DedupStore: Send + Sync {
    fn has_been_seen(&self, title: &NormalizedTitle) -> StorageResult<bool>;

    /// Insert-if-absent. Returns `false` when an entry already existed; the
    /// existing row, snapshot included, is left as it was.
    fn record_seen(
        &self,
        title: &NormalizedTitle,
        date: NaiveDate,
        source: &str,
        custom_fields: Option<&CustomFields>,
    ) -> StorageResult<bool>;

    /// No-op when the title is unknown.
    fn mark_synced(&self, title: &NormalizedTitle) -> StorageResult<()>;

    fn load_custom_fields(&self, title: &NormalizedTitle) -> StorageResult<Option<CustomFields>>;

    /// Replaces the stored snapshot. Returns `false` when the title is unknown.
    fn update_custom_fields(&self, title: &NormalizedTitle, fields: &CustomFields) -> StorageResult<bool>;

    fn fetch_entry(&self, title: &NormalizedTitle) -> StorageResult<Option<DedupEntry>>;

    fn list_unsynced(&self, limit: usize) -> StorageResult<Vec<DedupEntry>>;
}
