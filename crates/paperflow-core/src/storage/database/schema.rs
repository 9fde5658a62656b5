use rusqlite::Connection;

use super::error::StorageResult;

pub const SCHEMA_VERSION: u32 = 2;

pub fn apply_pragmas(conn: &Connection) -> StorageResult<()> {
    conn.execute_batch(
        "
        PRAGMA journal_mode = WAL;
        PRAGMA synchronous = NORMAL;
        PRAGMA busy_timeout = 5000;
        ",
    )?;
    Ok(())
}

/// `title` is the normalized title; the primary key is the at-most-once
/// admission constraint.
pub fn create_tables(conn: &Connection) -> StorageResult<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS schema_migrations (
            version    INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS articles (
            title                TEXT PRIMARY KEY NOT NULL,
            date_iso             TEXT NOT NULL,
            source               TEXT NOT NULL,
            custom_fields_json   TEXT,
            custom_fields_synced INTEGER NOT NULL DEFAULT 0
        );
        ",
    )?;
    Ok(())
}

pub fn create_indexes(conn: &Connection) -> StorageResult<()> {
    conn.execute_batch(
        "
        CREATE INDEX IF NOT EXISTS idx_articles_synced ON articles(custom_fields_synced);
        CREATE INDEX IF NOT EXISTS idx_articles_source ON articles(source);
        ",
    )?;
    Ok(())
}
