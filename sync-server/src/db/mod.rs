//! redb-backed authoritative store
//!
//! # Tables
//!
//! | Table | Key | Value | Purpose |
//! |-------|-----|-------|---------|
//! | `orders` | `order_id` | `OrderRecord` | Order headers |
//! | `lines` | `line_id` | `LineRecord` | Order lines (units and extras nested) |
//! | `order_lines` | `(order_id, line_id)` | `()` | Lines of an order |
//! | `local_ids` | `local_id` | `remote_id` | Create idempotency and reference resolution |
//! | `sync_logs` | `sync_log_id` | `SyncLogRecord` | Batch audit (append-only) |
//!
//! Values are JSON-serialized.

pub mod audit;
pub mod models;
pub mod store;

pub use audit::AuditLog;
pub use models::{LineRecord, OrderDetail, OrderRecord, SyncLogRecord};
pub use store::OrderStore;

use redb::{Database, TableDefinition};
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;

pub(crate) const ORDERS_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("orders");
pub(crate) const LINES_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("lines");
pub(crate) const ORDER_LINES_TABLE: TableDefinition<(&str, &str), ()> =
    TableDefinition::new("order_lines");
pub(crate) const LOCAL_IDS_TABLE: TableDefinition<&str, &str> = TableDefinition::new("local_ids");
pub(crate) const SYNC_LOGS_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("sync_logs");

/// Storage errors
#[derive(Debug, Error)]
pub enum StoreError {
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

pub type StoreResult<T> = Result<T, StoreError>;

/// Open or create the database file and make sure every table exists
///
/// redb commits with `Durability::Immediate` by default, so a batch
/// operation is durable as soon as its handler returns.
pub fn open(path: impl AsRef<Path>) -> StoreResult<Arc<Database>> {
    let db = Database::create(path)?;
    init_tables(&db)?;
    Ok(Arc::new(db))
}

/// Open an in-memory database (tests, demos)
pub fn open_in_memory() -> StoreResult<Arc<Database>> {
    let db = Database::builder().create_with_backend(redb::backends::InMemoryBackend::new())?;
    init_tables(&db)?;
    Ok(Arc::new(db))
}

fn init_tables(db: &Database) -> StoreResult<()> {
    let write_txn = db.begin_write()?;
    {
        let _ = write_txn.open_table(ORDERS_TABLE)?;
        let _ = write_txn.open_table(LINES_TABLE)?;
        let _ = write_txn.open_table(ORDER_LINES_TABLE)?;
        let _ = write_txn.open_table(LOCAL_IDS_TABLE)?;
        let _ = write_txn.open_table(SYNC_LOGS_TABLE)?;
    }
    write_txn.commit()?;
    Ok(())
}
