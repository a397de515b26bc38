//! Field client - offline order composition with batch synchronization
//!
//! Orders are composed against a local draft; every mutation lands in a
//! durable outbox that [`SyncClient::synchronize`] later replays on the
//! sync server in one batch.
//!
//! # Example
//!
//! ```ignore
//! use field_client::{ClientConfig, FieldClient};
//! use shared::models::OrderOrigin;
//! use tokio_util::sync::CancellationToken;
//!
//! let client = FieldClient::open(
//!     ClientConfig::new("http://localhost:9630").with_operator("waiter-7"),
//! )?;
//! client.drafts().start_new("T12", OrderOrigin::Primary, "waiter-7")?;
//! let report = client.sync().synchronize(CancellationToken::new()).await?;
//! ```

pub mod config;
pub mod draft;
pub mod error;
pub mod outbox;
pub mod storage;
pub mod sync;

pub use config::ClientConfig;
pub use draft::{DraftLine, DraftManager, DraftOrder, RemoteOrder};
pub use error::{ClientError, ClientResult};
pub use outbox::{EntryStatus, OutboxEntry, OutboxStatus};
pub use storage::{OutboxStorage, StorageError};
pub use sync::{SyncClient, SyncReport};

use std::sync::Arc;

/// Storage, draft manager and sync client wired over HTTP
#[derive(Debug)]
pub struct FieldClient {
    drafts: Arc<DraftManager>,
    sync: SyncClient,
}

impl FieldClient {
    /// Open the outbox under `config.data_dir` and connect to `config.base_url`
    pub fn open(config: ClientConfig) -> ClientResult<Self> {
        std::fs::create_dir_all(&config.data_dir)?;
        let storage = OutboxStorage::open(config.database_path())?;
        tracing::info!(
            path = %config.database_path().display(),
            server = %config.normalized_base_url(),
            "Field client opened"
        );
        Self::with_storage(storage, &config)
    }

    /// Wire a client over an already opened storage
    pub fn with_storage(storage: OutboxStorage, config: &ClientConfig) -> ClientResult<Self> {
        let drafts = Arc::new(DraftManager::new(storage)?);
        let transport = Arc::new(sync::HttpTransport::new(config)?);
        let reachability = Arc::new(sync::HttpReachability::new(config)?);
        let sync = SyncClient::new(drafts.clone(), transport, reachability)
            .with_max_batch(config.max_batch_operations);
        Ok(Self { drafts, sync })
    }

    pub fn drafts(&self) -> &DraftManager {
        &self.drafts
    }

    pub fn sync(&self) -> &SyncClient {
        &self.sync
    }
}
