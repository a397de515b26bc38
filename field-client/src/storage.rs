//! redb-backed outbox and draft storage
//!
//! # Tables
//!
//! | Table | Key | Value | Purpose |
//! |-------|-----|-------|---------|
//! | `operations` | `sequence` | `OutboxEntry` | Operation log (ordered by sequence) |
//! | `drafts` | `order_local_id` | `DraftOrder` | Draft aggregates |
//! | `meta` | `"active_draft"` | `order_local_id` | Active draft pointer |
//! | `sequence_counter` | `"seq"` / `"last_created_at"` | `u64` | Sequence and timestamp high-water marks |
//!
//! # Atomicity
//!
//! A draft mutation stores the draft and appends its entry in the same
//! write transaction (see [`OutboxStorage::append_operation`]); an aborted
//! transaction leaves neither behind.

use chrono::{DateTime, Utc};
use redb::{
    Database, ReadableDatabase, ReadableTable, ReadableTableMetadata, TableDefinition,
    WriteTransaction,
};
use shared::sync::OperationPayload;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;

use crate::draft::DraftOrder;
use crate::outbox::{EntryStatus, OutboxEntry, OutboxStatus};

/// Operation log: key = sequence, value = JSON-serialized OutboxEntry
const OPERATIONS_TABLE: TableDefinition<u64, &[u8]> = TableDefinition::new("operations");

/// Drafts: key = order local id, value = JSON-serialized DraftOrder
const DRAFTS_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("drafts");

const META_TABLE: TableDefinition<&str, &str> = TableDefinition::new("meta");

const SEQUENCE_TABLE: TableDefinition<&str, u64> = TableDefinition::new("sequence_counter");

const ACTIVE_DRAFT_KEY: &str = "active_draft";
const SEQUENCE_KEY: &str = "seq";
const LAST_CREATED_AT_KEY: &str = "last_created_at";

/// Storage errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(#[from] redb::DatabaseError),

    #[error("Transaction error: {0}")]
    Transaction(#[from] redb::TransactionError),

    #[error("Table error: {0}")]
    Table(#[from] redb::TableError),

    #[error("Storage error: {0}")]
    Storage(#[from] redb::StorageError),

    #[error("Commit error: {0}")]
    Commit(#[from] redb::CommitError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type StorageResult<T> = Result<T, StorageError>;

/// Outbox storage backed by redb
#[derive(Clone)]
pub struct OutboxStorage {
    db: Arc<Database>,
}

impl std::fmt::Debug for OutboxStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OutboxStorage").finish_non_exhaustive()
    }
}

impl OutboxStorage {
    /// Open or create the database at the given path
    ///
    /// Entries left in `syncing` by an interrupted round go back to
    /// `pending` here.
    pub fn open(path: impl AsRef<Path>) -> StorageResult<Self> {
        let db = Database::create(path)?;
        Self::init(db)
    }

    /// Open an in-memory database (tests, demos)
    pub fn open_in_memory() -> StorageResult<Self> {
        let db = Database::builder().create_with_backend(redb::backends::InMemoryBackend::new())?;
        Self::init(db)
    }

    fn init(db: Database) -> StorageResult<Self> {
        let write_txn = db.begin_write()?;
        {
            let _ = write_txn.open_table(OPERATIONS_TABLE)?;
            let _ = write_txn.open_table(DRAFTS_TABLE)?;
            let _ = write_txn.open_table(META_TABLE)?;
            let mut seq_table = write_txn.open_table(SEQUENCE_TABLE)?;
            if seq_table.get(SEQUENCE_KEY)?.is_none() {
                seq_table.insert(SEQUENCE_KEY, 0u64)?;
            }
        }
        write_txn.commit()?;

        let storage = Self { db: Arc::new(db) };
        let recovered = storage.recover_interrupted()?;
        if recovered > 0 {
            tracing::warn!(recovered, "Interrupted sync round: entries returned to pending");
        }
        Ok(storage)
    }

    /// Begin a write transaction
    pub fn begin_write(&self) -> StorageResult<WriteTransaction> {
        Ok(self.db.begin_write()?)
    }

    // ========== Sequence Operations ==========

    /// Increment and return the sequence number
    pub fn next_sequence(&self, txn: &WriteTransaction) -> StorageResult<u64> {
        let mut table = txn.open_table(SEQUENCE_TABLE)?;
        let current = table
            .get(SEQUENCE_KEY)?
            .map(|guard| guard.value())
            .unwrap_or(0);
        let next = current + 1;
        table.insert(SEQUENCE_KEY, next)?;
        Ok(next)
    }

    /// Current sequence (read-only)
    pub fn current_sequence(&self) -> StorageResult<u64> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(SEQUENCE_TABLE)?;
        Ok(table
            .get(SEQUENCE_KEY)?
            .map(|guard| guard.value())
            .unwrap_or(0))
    }

    /// Creation time for a new entry, truncated to milliseconds and never
    /// earlier than the previous entry's
    pub fn stamp(&self, txn: &WriteTransaction, now: DateTime<Utc>) -> StorageResult<DateTime<Utc>> {
        let mut table = txn.open_table(SEQUENCE_TABLE)?;
        let last = table
            .get(LAST_CREATED_AT_KEY)?
            .map(|guard| guard.value())
            .unwrap_or(0);
        let now_ms = u64::try_from(now.timestamp_millis()).unwrap_or(0);
        let stamped = now_ms.max(last);
        table.insert(LAST_CREATED_AT_KEY, stamped)?;

        let millis = i64::try_from(stamped).unwrap_or(i64::MAX);
        Ok(DateTime::from_timestamp_millis(millis).unwrap_or(now))
    }

    /// Append a pending entry for `payload` (within transaction)
    pub fn append_operation(
        &self,
        txn: &WriteTransaction,
        order_local_id: &str,
        payload: &OperationPayload,
        remote_entity_id: Option<String>,
    ) -> StorageResult<OutboxEntry> {
        let sequence = self.next_sequence(txn)?;
        let created_at = self.stamp(txn, Utc::now())?;
        let entry = OutboxEntry::new(
            sequence,
            order_local_id,
            payload,
            remote_entity_id,
            created_at,
        )?;
        self.put_entry(txn, &entry)?;
        tracing::debug!(
            sequence,
            operation_type = %entry.operation_type,
            order = order_local_id,
            "Outbox entry appended"
        );
        Ok(entry)
    }

    // ========== Entry Operations ==========

    /// Insert or overwrite an entry (within transaction)
    pub fn put_entry(&self, txn: &WriteTransaction, entry: &OutboxEntry) -> StorageResult<()> {
        let mut table = txn.open_table(OPERATIONS_TABLE)?;
        let value = serde_json::to_vec(entry)?;
        table.insert(entry.sequence, value.as_slice())?;
        Ok(())
    }

    /// Delete an entry (within transaction)
    pub fn remove_entry(&self, txn: &WriteTransaction, sequence: u64) -> StorageResult<bool> {
        let mut table = txn.open_table(OPERATIONS_TABLE)?;
        let removed = table.remove(sequence)?.is_some();
        Ok(removed)
    }

    pub fn get_entry(&self, sequence: u64) -> StorageResult<Option<OutboxEntry>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(OPERATIONS_TABLE)?;
        match table.get(sequence)? {
            Some(value) => Ok(Some(serde_json::from_slice(value.value())?)),
            None => Ok(None),
        }
    }

    /// Every entry, ordered by sequence
    pub fn entries(&self) -> StorageResult<Vec<OutboxEntry>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(OPERATIONS_TABLE)?;
        read_entries(&table)
    }

    /// Every entry, ordered by sequence (within transaction)
    pub fn entries_txn(&self, txn: &WriteTransaction) -> StorageResult<Vec<OutboxEntry>> {
        let table = txn.open_table(OPERATIONS_TABLE)?;
        read_entries(&table)
    }

    /// Entries ready to send, ordered by `(sequence, created_at)`
    pub fn pending_entries(&self) -> StorageResult<Vec<OutboxEntry>> {
        let mut pending: Vec<OutboxEntry> = self
            .entries()?
            .into_iter()
            .filter(|e| e.status == EntryStatus::Pending)
            .collect();
        pending.sort_by_key(|e| (e.sequence, e.created_at));
        Ok(pending)
    }

    pub fn entry_count(&self) -> StorageResult<u64> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(OPERATIONS_TABLE)?;
        Ok(table.len()?)
    }

    /// Entry counts by status
    pub fn status(&self) -> StorageResult<OutboxStatus> {
        let mut status = OutboxStatus::default();
        for entry in self.entries()? {
            match entry.status {
                EntryStatus::Pending => status.pending += 1,
                EntryStatus::Syncing => status.syncing += 1,
                EntryStatus::Failed => status.failed += 1,
                EntryStatus::Succeeded => {}
            }
        }
        Ok(status)
    }

    pub fn has_pending(&self) -> StorageResult<bool> {
        Ok(self
            .entries()?
            .iter()
            .any(|e| e.status == EntryStatus::Pending))
    }

    /// Entries of one aggregate (within transaction)
    pub fn entries_for_order_txn(
        &self,
        txn: &WriteTransaction,
        order_local_id: &str,
    ) -> StorageResult<Vec<OutboxEntry>> {
        Ok(self
            .entries_txn(txn)?
            .into_iter()
            .filter(|e| e.order_local_id == order_local_id)
            .collect())
    }

    /// Drop the entries of one aggregate that have not been sent
    pub fn remove_unsent_for_order(
        &self,
        txn: &WriteTransaction,
        order_local_id: &str,
    ) -> StorageResult<usize> {
        let doomed: Vec<u64> = self
            .entries_for_order_txn(txn, order_local_id)?
            .into_iter()
            .filter(OutboxEntry::is_unsent)
            .map(|e| e.sequence)
            .collect();
        let mut table = txn.open_table(OPERATIONS_TABLE)?;
        for sequence in &doomed {
            table.remove(*sequence)?;
        }
        Ok(doomed.len())
    }

    // ========== Status Transitions ==========

    /// Move the given pending entries to `syncing`
    ///
    /// Returns the entries actually moved, in sequence order; an entry
    /// removed or changed since the caller read it is skipped.
    pub fn mark_syncing(&self, sequences: &[u64]) -> StorageResult<Vec<OutboxEntry>> {
        let mut claimed = self.transition(
            |e| e.status == EntryStatus::Pending && sequences.contains(&e.sequence),
            EntryStatus::Syncing,
        )?;
        claimed.sort_by_key(|e| (e.sequence, e.created_at));
        Ok(claimed)
    }

    /// Move the given syncing entries back to `pending`
    pub fn revert_syncing(&self, sequences: &[u64]) -> StorageResult<usize> {
        let reverted = self.transition(
            |e| e.status == EntryStatus::Syncing && sequences.contains(&e.sequence),
            EntryStatus::Pending,
        )?;
        Ok(reverted.len())
    }

    /// Every syncing entry back to `pending` (startup recovery)
    pub fn recover_interrupted(&self) -> StorageResult<usize> {
        let recovered =
            self.transition(|e| e.status == EntryStatus::Syncing, EntryStatus::Pending)?;
        Ok(recovered.len())
    }

    /// Every failed entry back to `pending`
    pub fn reset_failed(&self) -> StorageResult<usize> {
        let reset = self.transition(|e| e.status == EntryStatus::Failed, EntryStatus::Pending)?;
        Ok(reset.len())
    }

    /// One failed entry back to `pending`; `false` when it is not failed
    pub fn reset_entry(&self, sequence: u64) -> StorageResult<bool> {
        let reset = self.transition(
            |e| e.sequence == sequence && e.status == EntryStatus::Failed,
            EntryStatus::Pending,
        )?;
        Ok(!reset.is_empty())
    }

    fn transition(
        &self,
        select: impl Fn(&OutboxEntry) -> bool,
        to: EntryStatus,
    ) -> StorageResult<Vec<OutboxEntry>> {
        let txn = self.db.begin_write()?;
        let changed = {
            let mut table = txn.open_table(OPERATIONS_TABLE)?;
            let mut selected: Vec<OutboxEntry> = read_entries(&table)?
                .into_iter()
                .filter(|e| select(e))
                .collect();
            for entry in &mut selected {
                entry.status = to;
                let value = serde_json::to_vec(&*entry)?;
                table.insert(entry.sequence, value.as_slice())?;
            }
            selected
        };
        txn.commit()?;
        Ok(changed)
    }

    // ========== Draft Operations ==========

    /// Store a draft (within transaction)
    pub fn store_draft(&self, txn: &WriteTransaction, draft: &DraftOrder) -> StorageResult<()> {
        let mut table = txn.open_table(DRAFTS_TABLE)?;
        let value = serde_json::to_vec(draft)?;
        table.insert(draft.local_id.as_str(), value.as_slice())?;
        Ok(())
    }

    pub fn get_draft(&self, local_id: &str) -> StorageResult<Option<DraftOrder>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(DRAFTS_TABLE)?;
        match table.get(local_id)? {
            Some(value) => Ok(Some(serde_json::from_slice(value.value())?)),
            None => Ok(None),
        }
    }

    /// Get a draft (within transaction)
    pub fn get_draft_txn(
        &self,
        txn: &WriteTransaction,
        local_id: &str,
    ) -> StorageResult<Option<DraftOrder>> {
        let table = txn.open_table(DRAFTS_TABLE)?;
        match table.get(local_id)? {
            Some(value) => Ok(Some(serde_json::from_slice(value.value())?)),
            None => Ok(None),
        }
    }

    /// Delete a draft (within transaction)
    pub fn remove_draft(&self, txn: &WriteTransaction, local_id: &str) -> StorageResult<bool> {
        let mut table = txn.open_table(DRAFTS_TABLE)?;
        let removed = table.remove(local_id)?.is_some();
        Ok(removed)
    }

    pub fn drafts(&self) -> StorageResult<Vec<DraftOrder>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(DRAFTS_TABLE)?;
        read_drafts(&table)
    }

    /// All drafts (within transaction)
    pub fn drafts_txn(&self, txn: &WriteTransaction) -> StorageResult<Vec<DraftOrder>> {
        let table = txn.open_table(DRAFTS_TABLE)?;
        read_drafts(&table)
    }

    // ========== Active Draft Pointer ==========

    pub fn active_draft_id(&self) -> StorageResult<Option<String>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(META_TABLE)?;
        Ok(table
            .get(ACTIVE_DRAFT_KEY)?
            .map(|guard| guard.value().to_string()))
    }

    /// Active draft pointer (within transaction)
    pub fn active_draft_id_txn(&self, txn: &WriteTransaction) -> StorageResult<Option<String>> {
        let table = txn.open_table(META_TABLE)?;
        Ok(table
            .get(ACTIVE_DRAFT_KEY)?
            .map(|guard| guard.value().to_string()))
    }

    /// Set or clear the active draft pointer (within transaction)
    pub fn set_active_draft(
        &self,
        txn: &WriteTransaction,
        local_id: Option<&str>,
    ) -> StorageResult<()> {
        let mut table = txn.open_table(META_TABLE)?;
        match local_id {
            Some(id) => {
                table.insert(ACTIVE_DRAFT_KEY, id)?;
            }
            None => {
                table.remove(ACTIVE_DRAFT_KEY)?;
            }
        }
        Ok(())
    }
}

fn read_entries(table: &impl ReadableTable<u64, &'static [u8]>) -> StorageResult<Vec<OutboxEntry>> {
    let mut entries = Vec::new();
    for result in table.iter()? {
        let (_key, value) = result?;
        entries.push(serde_json::from_slice(value.value())?);
    }
    Ok(entries)
}

fn read_drafts(table: &impl ReadableTable<&'static str, &'static [u8]>) -> StorageResult<Vec<DraftOrder>> {
    let mut drafts = Vec::new();
    for result in table.iter()? {
        let (_key, value) = result?;
        drafts.push(serde_json::from_slice(value.value())?);
    }
    Ok(drafts)
}
