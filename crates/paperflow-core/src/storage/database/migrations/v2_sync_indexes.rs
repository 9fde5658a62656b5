use rusqlite::Connection;

use super::Migration;
use crate::storage::database::error::StorageResult;
use crate::storage::database::schema;

pub struct V2SyncIndexes;

impl Migration for V2SyncIndexes {
    fn version(&self) -> u32 {
        2
    }

    fn description(&self) -> &'static str {
        "Indexes for the reconciliation pass (synced flag, source)"
    }

    fn up(&self, conn: &Connection) -> StorageResult<()> {
        schema::create_indexes(conn)
    }
}
