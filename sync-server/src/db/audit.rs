//! Sync audit log
//!
//! Append-only: one record per batch attempt, written before the batch
//! response leaves the server. Used for troubleshooting, never for replay.

use redb::{Database, ReadableDatabase, ReadableTableMetadata};
use std::sync::Arc;

use super::models::SyncLogRecord;
use super::{SYNC_LOGS_TABLE, StoreResult};

#[derive(Clone)]
pub struct AuditLog {
    db: Arc<Database>,
}

impl AuditLog {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    pub fn append(&self, record: &SyncLogRecord) -> StoreResult<()> {
        let txn = self.db.begin_write()?;
        {
            let mut table = txn.open_table(SYNC_LOGS_TABLE)?;
            let value = serde_json::to_vec(record)?;
            table.insert(record.id.as_str(), value.as_slice())?;
        }
        txn.commit()?;
        Ok(())
    }

    pub fn get(&self, id: &str) -> StoreResult<Option<SyncLogRecord>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(SYNC_LOGS_TABLE)?;
        match table.get(id)? {
            Some(value) => Ok(Some(serde_json::from_slice(value.value())?)),
            None => Ok(None),
        }
    }

    pub fn count(&self) -> StoreResult<u64> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(SYNC_LOGS_TABLE)?;
        Ok(table.len()?)
    }
}
