//! Client configuration

use shared::sync::MAX_SYNC_BATCH_OPERATIONS;
use std::path::PathBuf;
use std::time::Duration;

/// Field client configuration
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Sync server base URL (e.g., "http://localhost:9630")
    pub base_url: String,

    /// Bearer token sent with every request
    pub token: Option<String>,

    /// Operator recorded in the server's sync audit (`X-Operator-Id`)
    pub operator: Option<String>,

    /// Request timeout in seconds
    pub timeout: u64,

    /// Reachability probe timeout in seconds
    pub probe_timeout: u64,

    /// Directory holding the outbox database
    pub data_dir: PathBuf,

    /// Operations per batch; a larger outbox goes out in several batches
    /// within one round. Must not exceed the server's limit.
    pub max_batch_operations: usize,
}

impl ClientConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            token: None,
            operator: None,
            timeout: 30,
            probe_timeout: 3,
            data_dir: PathBuf::from("./data"),
            max_batch_operations: MAX_SYNC_BATCH_OPERATIONS,
        }
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn with_operator(mut self, operator: impl Into<String>) -> Self {
        self.operator = Some(operator.into());
        self
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout = secs;
        self
    }

    pub fn with_probe_timeout(mut self, secs: u64) -> Self {
        self.probe_timeout = secs;
        self
    }

    pub fn with_data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.data_dir = dir.into();
        self
    }

    pub fn with_max_batch_operations(mut self, max: usize) -> Self {
        self.max_batch_operations = max.max(1);
        self
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.timeout)
    }

    pub fn probe_duration(&self) -> Duration {
        Duration::from_secs(self.probe_timeout)
    }

    /// Outbox database file
    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join("field-client.redb")
    }

    /// Base URL without a trailing slash
    pub fn normalized_base_url(&self) -> &str {
        self.base_url.trim_end_matches('/')
    }
}
