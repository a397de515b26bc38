//! Server configuration
//!
//! Every value comes from the environment (a `.env` file is loaded first
//! by `main`), with development defaults.

use std::path::PathBuf;

use shared::sync::MAX_SYNC_BATCH_OPERATIONS;

#[derive(Debug, Clone)]
pub struct Config {
    /// Directory holding the database file (env: WORK_DIR)
    pub work_dir: String,
    /// HTTP port (env: HTTP_PORT)
    pub http_port: u16,
    /// development | staging | production (env: ENVIRONMENT)
    pub environment: String,
    /// Default tracing filter when RUST_LOG is unset (env: LOG_LEVEL)
    pub log_level: String,
    /// Daily rolling log files go here when set (env: LOG_DIR)
    pub log_dir: Option<String>,
    /// Upper bound on operations per batch (env: MAX_BATCH_OPERATIONS)
    pub max_batch_operations: usize,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        Self {
            work_dir: std::env::var("WORK_DIR").unwrap_or_else(|_| "./data".into()),
            http_port: std::env::var("HTTP_PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(9630),
            environment: std::env::var("ENVIRONMENT").unwrap_or_else(|_| "development".into()),
            log_level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".into()),
            log_dir: std::env::var("LOG_DIR").ok().filter(|s| !s.is_empty()),
            max_batch_operations: std::env::var("MAX_BATCH_OPERATIONS")
                .ok()
                .and_then(|v| v.parse().ok())
                .filter(|v: &usize| *v > 0)
                .unwrap_or(MAX_SYNC_BATCH_OPERATIONS),
        }
    }

    pub fn database_path(&self) -> PathBuf {
        PathBuf::from(&self.work_dir).join("sync-server.redb")
    }

    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            work_dir: "./data".into(),
            http_port: 9630,
            environment: "development".into(),
            log_level: "info".into(),
            log_dir: None,
            max_batch_operations: MAX_SYNC_BATCH_OPERATIONS,
        }
    }
}
