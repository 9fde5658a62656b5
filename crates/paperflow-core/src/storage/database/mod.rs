mod connection;
mod error;
mod migrations;
mod schema;

pub use connection::ConnectionPool;
pub use error::{StorageError, StorageResult};
pub use migrations::{Migration, get_applied_versions, run_migrations};
pub use schema::SCHEMA_VERSION;

use std::path::Path;

use chrono::NaiveDate;

use crate::models::{CustomFields, DedupEntry, NormalizedTitle};

use super::dedup::DedupStore;
use super::repositories::{ConflictPolicy, DedupCounts, DedupRepository, Repository, SqliteDedupRepository};

pub fn open_database(path: &Path) -> StorageResult<ConnectionPool> {
    let pool = ConnectionPool::open(path)?;
    {
        let conn = pool.get_connection()?;
        run_migrations(&conn)?;
    }
    Ok(pool)
}

pub fn open_in_memory() -> StorageResult<ConnectionPool> {
    let pool = ConnectionPool::open_in_memory()?;
    {
        let conn = pool.get_connection()?;
        run_migrations(&conn)?;
    }
    Ok(pool)
}

/// SQLite-backed dedup store.
pub struct Database {
    pool: ConnectionPool,
    conflict_policy: ConflictPolicy,
}

impl Database {
    pub fn open(path: &Path) -> StorageResult<Self> {
        let pool = open_database(path)?;
        tracing::debug!(path = %path.display(), "opened dedup store");
        Ok(Self {
            pool,
            conflict_policy: ConflictPolicy::default(),
        })
    }

    pub fn open_in_memory() -> StorageResult<Self> {
        Ok(Self {
            pool: open_in_memory()?,
            conflict_policy: ConflictPolicy::default(),
        })
    }

    pub fn with_conflict_policy(mut self, policy: ConflictPolicy) -> Self {
        self.conflict_policy = policy;
        self
    }

    pub fn path(&self) -> Option<&str> {
        self.pool.path()
    }

    pub fn counts(&self) -> StorageResult<DedupCounts> {
        self.repo()?.counts()
    }

    /// Removes an entry so the title can be admitted again.
    pub fn forget(&self, title: &NormalizedTitle) -> StorageResult<bool> {
        self.repo()?.delete(title)
    }

    pub fn close(self) -> StorageResult<()> {
        self.pool.close()
    }

    fn repo(&self) -> StorageResult<SqliteDedupRepository<'_>> {
        Ok(SqliteDedupRepository::new(self.pool.get_connection()?))
    }
}

impl DedupStore for Database {
    fn has_been_seen(&self, title: &NormalizedTitle) -> StorageResult<bool> {
        self.repo()?.exists(title)
    }

    fn record_seen(
        &self,
        title: &NormalizedTitle,
        date: NaiveDate,
        source: &str,
        custom_fields: Option<&CustomFields>,
    ) -> StorageResult<bool> {
        let entry = DedupEntry {
            title: title.clone(),
            date,
            source: source.to_string(),
            custom_fields: custom_fields.cloned(),
            synced: false,
        };
        let inserted = self.repo()?.insert(&entry, self.conflict_policy)?;
        if !inserted {
            tracing::debug!(title = %title, "already recorded, keeping original entry");
        }
        Ok(inserted)
    }

    fn mark_synced(&self, title: &NormalizedTitle) -> StorageResult<()> {
        if !self.repo()?.set_synced(title, true)? {
            tracing::debug!(title = %title, "mark_synced on unknown title ignored");
        }
        Ok(())
    }

    fn load_custom_fields(&self, title: &NormalizedTitle) -> StorageResult<Option<CustomFields>> {
        self.repo()?.load_custom_fields(title)
    }

    fn update_custom_fields(&self, title: &NormalizedTitle, fields: &CustomFields) -> StorageResult<bool> {
        self.repo()?.replace_custom_fields(title, fields)
    }

    fn fetch_entry(&self, title: &NormalizedTitle) -> StorageResult<Option<DedupEntry>> {
        self.repo()?.find_by_id(title)
    }

    fn list_unsynced(&self, limit: usize) -> StorageResult<Vec<DedupEntry>> {
        self.repo()?.list_unsynced(limit)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::models::CustomFieldName;

    fn title(s: &str) -> NormalizedTitle {
        NormalizedTitle::parse(s).unwrap()
    }

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 5, 12).unwrap()
    }

    #[test]
    fn record_seen_is_idempotent() {
        let db = Database::open_in_memory().unwrap();
        let t = title("Quantum Error Correction");

        assert!(!db.has_been_seen(&t).unwrap());
        assert!(db.record_seen(&t, day(), "https://arxiv.org/", None).unwrap());
        assert!(!db.record_seen(&t, day(), "https://arxiv.org/", None).unwrap());
        assert!(db.has_been_seen(&t).unwrap());
        assert_eq!(db.counts().unwrap().total, 1);
    }

    #[test]
    fn differently_written_titles_share_an_entry() {
        let db = Database::open_in_memory().unwrap();
        db.record_seen(&title("  Quantum Error Correction\u{200b} "), day(), "x", None)
            .unwrap();
        assert!(db.has_been_seen(&title("Quantum Error Correction")).unwrap());
    }

    #[test]
    fn second_record_seen_keeps_original_snapshot() {
        let db = Database::open_in_memory().unwrap();
        let t = title("Lattice Signatures");
        let first = CustomFields::new().with(CustomFieldName::Keywords, "lattices");
        let second = CustomFields::new().with(CustomFieldName::Keywords, "something else");

        db.record_seen(&t, day(), "arxiv", Some(&first)).unwrap();
        db.record_seen(&t, day(), "scraper", Some(&second)).unwrap();

        let entry = db.fetch_entry(&t).unwrap().unwrap();
        assert_eq!(entry.source, "arxiv");
        assert_eq!(entry.custom_fields, Some(first));
    }

    #[test]
    fn error_policy_rejects_duplicates() {
        let db = Database::open_in_memory()
            .unwrap()
            .with_conflict_policy(ConflictPolicy::Error);
        let t = title("Duplicate");
        db.record_seen(&t, day(), "x", None).unwrap();
        let err = db.record_seen(&t, day(), "x", None).unwrap_err();
        assert!(matches!(err, StorageError::Constraint(_)));
    }

    #[test]
    fn mark_synced_flips_flag_and_ignores_unknown_titles() {
        let db = Database::open_in_memory().unwrap();
        let t = title("Synced Paper");
        db.record_seen(&t, day(), "x", None).unwrap();
        assert!(!db.fetch_entry(&t).unwrap().unwrap().synced);

        db.mark_synced(&t).unwrap();
        db.mark_synced(&t).unwrap();
        assert!(db.fetch_entry(&t).unwrap().unwrap().synced);

        db.mark_synced(&title("Never Seen")).unwrap();
        assert!(db.fetch_entry(&title("Never Seen")).unwrap().is_none());
    }

    #[test]
    fn custom_fields_are_replaced_and_reloaded() {
        let db = Database::open_in_memory().unwrap();
        let t = title("Snapshot");
        assert_eq!(db.load_custom_fields(&t).unwrap(), None);

        db.record_seen(&t, day(), "x", None).unwrap();
        assert_eq!(db.load_custom_fields(&t).unwrap(), None);

        let fields = CustomFields::new()
            .with(CustomFieldName::Keywords, "qkd, pqc")
            .with(CustomFieldName::QuriskRelevance, 4);
        assert!(db.update_custom_fields(&t, &fields).unwrap());
        assert_eq!(db.load_custom_fields(&t).unwrap(), Some(fields.clone()));

        assert!(!db.update_custom_fields(&title("Missing"), &fields).unwrap());
    }

    #[test]
    fn unsynced_entries_are_listed() {
        let db = Database::open_in_memory().unwrap();
        for name in ["A", "B", "C"] {
            db.record_seen(&title(name), day(), "x", None).unwrap();
        }
        db.mark_synced(&title("B")).unwrap();

        let pending: Vec<String> = db
            .list_unsynced(10)
            .unwrap()
            .into_iter()
            .map(|e| e.title.into_inner())
            .collect();
        assert_eq!(pending, vec!["A", "C"]);
        assert_eq!(db.counts().unwrap().unsynced(), 2);
    }

    #[test]
    fn forget_allows_readmission() {
        let db = Database::open_in_memory().unwrap();
        let t = title("Forgotten");
        db.record_seen(&t, day(), "x", None).unwrap();
        assert!(db.forget(&t).unwrap());
        assert!(!db.has_been_seen(&t).unwrap());
        assert!(db.record_seen(&t, day(), "x", None).unwrap());
        assert!(!db.forget(&title("Never Seen")).unwrap());
    }

    #[test]
    fn synced_entry_survives_a_later_record_seen() {
        let db = Database::open_in_memory().unwrap();
        let t = title("Merged Paper");
        let merged = CustomFields::new().with(CustomFieldName::Keywords, "qkd");
        db.record_seen(&t, day(), "arxiv", None).unwrap();
        db.update_custom_fields(&t, &merged).unwrap();
        db.mark_synced(&t).unwrap();

        let later = NaiveDate::from_ymd_opt(2026, 1, 2).unwrap();
        assert!(!db.record_seen(&t, later, "scraper", None).unwrap());

        let entry = db.fetch_entry(&t).unwrap().unwrap();
        assert_eq!(entry.date, day());
        assert_eq!(entry.source, "arxiv");
        assert_eq!(entry.custom_fields, Some(merged));
        assert!(entry.synced);
    }

    #[test]
    fn entries_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state").join("dedup.db");
        {
            let db = Database::open(&path).unwrap();
            db.record_seen(&title("Persistent"), day(), "x", None).unwrap();
            db.close().unwrap();
        }
        let db = Database::open(&path).unwrap();
        assert!(db.has_been_seen(&title("Persistent")).unwrap());
    }

    #[test]
    fn concurrent_admission_inserts_once() {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let t = title("Raced Title");
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let db = Arc::clone(&db);
                let t = t.clone();
                std::thread::spawn(move || db.record_seen(&t, day(), "x", None).unwrap())
            })
            .collect();
        let inserted = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|inserted| *inserted)
            .count();
        assert_eq!(inserted, 1);
        assert_eq!(db.counts().unwrap().total, 1);
    }
}
