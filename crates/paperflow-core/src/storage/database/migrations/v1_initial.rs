use rusqlite::Connection;

use super::Migration;
use crate::storage::database::error::StorageResult;
use crate::storage::database::schema;

pub struct V1Initial;

impl Migration for V1Initial {
    fn version(&self) -> u32 {
        1
    }

    fn description(&self) -> &'static str {
        "Initial schema with the articles dedup table"
    }

    fn up(&self, conn: &Connection) -> StorageResult<()> {
        schema::create_tables(conn)
    }
}
