use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use rusqlite::Connection;

use super::error::{StorageError, StorageResult};
use super::schema::apply_pragmas;

/// A single SQLite connection shared behind a mutex.
///
/// Statements are short point lookups and single-row writes, so one
/// serialized connection is enough for concurrent ingestion sources.
pub struct ConnectionPool {
    path: Option<String>,
    connection: Mutex<Connection>,
}

impl ConnectionPool {
    pub fn open(path: &Path) -> StorageResult<Self> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)
                .map_err(|e| StorageError::Query(format!("cannot create {}: {e}", parent.display())))?;
        }
        let conn = Connection::open(path)?;
        apply_pragmas(&conn)?;
        Ok(Self {
            path: Some(path.to_string_lossy().to_string()),
            connection: Mutex::new(conn),
        })
    }

    pub fn open_in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        apply_pragmas(&conn)?;
        Ok(Self {
            path: None,
            connection: Mutex::new(conn),
        })
    }

    pub fn get_connection(&self) -> StorageResult<MutexGuard<'_, Connection>> {
        self.connection.lock().map_err(|_| StorageError::Poisoned)
    }

    pub fn path(&self) -> Option<&str> {
        self.path.as_deref()
    }

    /// Checkpoints and closes the underlying connection.
    pub fn close(self) -> StorageResult<()> {
        let conn = self
            .connection
            .into_inner()
            .map_err(|_| StorageError::Poisoned)?;
        conn.close().map_err(|(_, e)| StorageError::from(e))
    }
}
