//! Shared types for the offline order sync stack
//!
//! Common types used by both `field-client` and `sync-server`: the order
//! aggregate building blocks, the outbox operation union, the batch wire
//! protocol and the unified error system.

pub mod error;
pub mod models;
pub mod sync;
pub mod util;

// Re-exports
pub use serde::{Deserialize, Serialize};

pub use error::{ApiResponse, AppError, AppResult, ErrorCode};
pub use sync::{OperationPayload, OperationType, SyncBatchRequest, SyncBatchResponse};
