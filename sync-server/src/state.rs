//! Shared application state

use redb::Database;
use std::sync::Arc;

use crate::config::Config;
use crate::db::{self, AuditLog, OrderStore};
use crate::sync::{BatchProcessor, InventoryHook, NoopInventory};

type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Clone)]
pub struct AppState {
    pub store: OrderStore,
    pub audit: AuditLog,
    pub processor: Arc<BatchProcessor>,
}

impl AppState {
    /// Open the database under `work_dir` and wire the processor
    pub fn new(config: &Config) -> Result<Self, BoxError> {
        std::fs::create_dir_all(&config.work_dir)?;
        let db = db::open(config.database_path())?;
        tracing::info!(path = %config.database_path().display(), "Database opened");
        Ok(Self::from_database(
            db,
            config.max_batch_operations,
            Arc::new(NoopInventory),
        ))
    }

    pub fn from_database(
        db: Arc<Database>,
        max_batch_operations: usize,
        inventory: Arc<dyn InventoryHook>,
    ) -> Self {
        let store = OrderStore::new(db.clone());
        let audit = AuditLog::new(db);
        let processor = Arc::new(BatchProcessor::new(
            store.clone(),
            audit.clone(),
            inventory,
            max_batch_operations,
        ));
        Self {
            store,
            audit,
            processor,
        }
    }

    /// In-memory state (tests, demos)
    pub fn in_memory() -> Result<Self, BoxError> {
        let db = db::open_in_memory()?;
        Ok(Self::from_database(
            db,
            shared::sync::MAX_SYNC_BATCH_OPERATIONS,
            Arc::new(NoopInventory),
        ))
    }
}
