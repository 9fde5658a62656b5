use std::sync::MutexGuard;

use chrono::NaiveDate;
use rusqlite::{Connection, OptionalExtension, Row, params};

use crate::models::{CustomFields, DedupEntry, NormalizedTitle};
use crate::storage::database::{StorageError, StorageResult};

use super::Repository;

/// What an insert does when the title is already present.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConflictPolicy {
    /// Keep the existing row untouched and report "not inserted".
    #[default]
    Ignore,
    /// Fail with [`StorageError::Constraint`].
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DedupCounts {
    pub total: u64,
    pub synced: u64,
}

impl DedupCounts {
    pub fn unsynced(&self) -> u64 {
        self.total.saturating_sub(self.synced)
    }
}

pub trait DedupRepository: Repository<Entity = DedupEntry, Id = NormalizedTitle> {
    /// Returns `true` when a new row was written.
    fn insert(&self, entry: &DedupEntry, policy: ConflictPolicy) -> StorageResult<bool>;
    fn exists(&self, title: &NormalizedTitle) -> StorageResult<bool>;
    fn set_synced(&self, title: &NormalizedTitle, synced: bool) -> StorageResult<bool>;
    fn load_custom_fields(&self, title: &NormalizedTitle) -> StorageResult<Option<CustomFields>>;
    fn replace_custom_fields(&self, title: &NormalizedTitle, fields: &CustomFields) -> StorageResult<bool>;
    fn list_unsynced(&self, limit: usize) -> StorageResult<Vec<DedupEntry>>;
    fn counts(&self) -> StorageResult<DedupCounts>;
}

pub struct SqliteDedupRepository<'a> {
    conn: MutexGuard<'a, Connection>,
}

impl<'a> SqliteDedupRepository<'a> {
    pub fn new(conn: MutexGuard<'a, Connection>) -> Self {
        Self { conn }
    }

    fn row_to_entry(row: &Row<'_>) -> rusqlite::Result<(String, String, String, Option<String>, bool)> {
        Ok((
            row.get(0)?,
            row.get(1)?,
            row.get(2)?,
            row.get(3)?,
            row.get::<_, i64>(4)? != 0,
        ))
    }

    fn decode(raw: (String, String, String, Option<String>, bool)) -> StorageResult<DedupEntry> {
        let (title, date_iso, source, fields_json, synced) = raw;
        let title = NormalizedTitle::parse(&title)
            .map_err(|e| StorageError::Query(format!("stored title '{title}': {e}")))?;
        let date = NaiveDate::parse_from_str(&date_iso, "%Y-%m-%d")
            .map_err(|e| StorageError::Query(format!("stored date '{date_iso}': {e}")))?;
        let custom_fields = fields_json
            .as_deref()
            .map(CustomFields::from_json)
            .transpose()?;
        Ok(DedupEntry {
            title,
            date,
            source,
            custom_fields,
            synced,
        })
    }
}

const SELECT_ENTRY: &str = "SELECT title, date_iso, source, custom_fields_json, custom_fields_synced FROM articles";

impl<'a> Repository for SqliteDedupRepository<'a> {
    type Entity = DedupEntry;
    type Id = NormalizedTitle;

    fn find_by_id(&self, id: &Self::Id) -> StorageResult<Option<Self::Entity>> {
        let raw = self
            .conn
            .query_row(
                &format!("{SELECT_ENTRY} WHERE title = ?1"),
                params![id.as_str()],
                Self::row_to_entry,
            )
            .optional()?;
        raw.map(Self::decode).transpose()
    }

    fn delete(&self, id: &Self::Id) -> StorageResult<bool> {
        let rows = self
            .conn
            .execute("DELETE FROM articles WHERE title = ?1", params![id.as_str()])?;
        Ok(rows > 0)
    }
}

impl<'a> DedupRepository for SqliteDedupRepository<'a> {
    fn insert(&self, entry: &DedupEntry, policy: ConflictPolicy) -> StorageResult<bool> {
        let fields_json = entry.custom_fields.as_ref().map(CustomFields::to_json).transpose()?;
        let sql = match policy {
            ConflictPolicy::Ignore => {
                "INSERT INTO articles (title, date_iso, source, custom_fields_json, custom_fields_synced)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(title) DO NOTHING"
            }
            ConflictPolicy::Error => {
                "INSERT INTO articles (title, date_iso, source, custom_fields_json, custom_fields_synced)
                 VALUES (?1, ?2, ?3, ?4, ?5)"
            }
        };
        let rows = self.conn.execute(
            sql,
            params![
                entry.title.as_str(),
                entry.date_iso(),
                entry.source,
                fields_json,
                entry.synced as i64,
            ],
        )?;
        Ok(rows > 0)
    }

    fn exists(&self, title: &NormalizedTitle) -> StorageResult<bool> {
        let found = self
            .conn
            .prepare_cached("SELECT 1 FROM articles WHERE title = ?1")?
            .exists(params![title.as_str()])?;
        Ok(found)
    }

    fn set_synced(&self, title: &NormalizedTitle, synced: bool) -> StorageResult<bool> {
        let rows = self.conn.execute(
            "UPDATE articles SET custom_fields_synced = ?2 WHERE title = ?1",
            params![title.as_str(), synced as i64],
        )?;
        Ok(rows > 0)
    }

    fn load_custom_fields(&self, title: &NormalizedTitle) -> StorageResult<Option<CustomFields>> {
        let json: Option<Option<String>> = self
            .conn
            .query_row(
                "SELECT custom_fields_json FROM articles WHERE title = ?1",
                params![title.as_str()],
                |row| row.get(0),
            )
            .optional()?;
        match json.flatten() {
            Some(json) => Ok(Some(CustomFields::from_json(&json)?)),
            None => Ok(None),
        }
    }

    fn replace_custom_fields(&self, title: &NormalizedTitle, fields: &CustomFields) -> StorageResult<bool> {
        let rows = self.conn.execute(
            "UPDATE articles SET custom_fields_json = ?2 WHERE title = ?1",
            params![title.as_str(), fields.to_json()?],
        )?;
        Ok(rows > 0)
    }

    fn list_unsynced(&self, limit: usize) -> StorageResult<Vec<DedupEntry>> {
        let mut stmt = self.conn.prepare(&format!(
            "{SELECT_ENTRY} WHERE custom_fields_synced = 0 ORDER BY date_iso DESC, title LIMIT ?1"
        ))?;
        let rows = stmt.query_map(params![limit as i64], Self::row_to_entry)?;

        let mut entries = Vec::new();
        for row in rows {
            entries.push(Self::decode(row?)?);
        }
        Ok(entries)
    }

    fn counts(&self) -> StorageResult<DedupCounts> {
        let (total, synced): (i64, i64) = self.conn.query_row(
            "SELECT COUNT(*), COALESCE(SUM(custom_fields_synced), 0) FROM articles",
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;
        Ok(DedupCounts {
            total: total as u64,
            synced: synced as u64,
        })
    }
}
