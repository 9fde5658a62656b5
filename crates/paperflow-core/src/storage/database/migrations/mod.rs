mod v1_initial;
mod v2_sync_indexes;

use chrono::Utc;
use rusqlite::Connection;

use super::error::{StorageError, StorageResult};

pub trait Migration {
    fn version(&self) -> u32;
    fn description(&self) -> &'static str;
    fn up(&self, conn: &Connection) -> StorageResult<()>;
}

fn record_migration(conn: &Connection, version: u32) -> StorageResult<()> {
    conn.execute(
        "INSERT OR IGNORE INTO schema_migrations(version, applied_at) VALUES (?1, ?2)",
        rusqlite::params![version, Utc::now().to_rfc3339()],
    )?;
    Ok(())
}

fn has_migrations_table(conn: &Connection) -> StorageResult<bool> {
    let exists = conn
        .prepare("SELECT name FROM sqlite_master WHERE type='table' AND name='schema_migrations'")?
        .exists([])?;
    Ok(exists)
}

fn is_migration_applied(conn: &Connection, version: u32) -> StorageResult<bool> {
    if !has_migrations_table(conn)? {
        return Ok(false);
    }

    let applied = conn
        .prepare("SELECT 1 FROM schema_migrations WHERE version = ?1")?
        .exists(rusqlite::params![version])?;
    Ok(applied)
}

pub fn run_migrations(conn: &Connection) -> StorageResult<()> {
    let migrations: Vec<Box<dyn Migration>> = vec![
        Box::new(v1_initial::V1Initial),
        Box::new(v2_sync_indexes::V2SyncIndexes),
    ];

    for migration in migrations {
        if is_migration_applied(conn, migration.version())? {
            continue;
        }
        migration.up(conn).map_err(|e| StorageError::Migration {
            version: migration.version(),
            message: e.to_string(),
        })?;
        record_migration(conn, migration.version())?;
        tracing::debug!(
            version = migration.version(),
            description = migration.description(),
            "applied migration"
        );
    }

    Ok(())
}

pub fn get_applied_versions(conn: &Connection) -> StorageResult<Vec<u32>> {
    if !has_migrations_table(conn)? {
        return Ok(Vec::new());
    }

    let mut stmt = conn.prepare("SELECT version FROM schema_migrations ORDER BY version")?;
    let rows = stmt.query_map([], |row| row.get(0))?;
    let mut versions = Vec::new();
    for row in rows {
        versions.push(row?);
    }
    Ok(versions)
}
