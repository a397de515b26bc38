//! Operation log entries

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use shared::sync::{OperationPayload, OperationType, SyncOperation};

/// Lifecycle of an outbox entry
///
/// ```text
/// pending → syncing → succeeded (entry deleted)
///                   → failed ──retry──→ pending
/// ```
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EntryStatus {
    Pending,
    Syncing,
    Succeeded,
    Failed,
}

/// One recorded mutation, durable until the server accepts it
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OutboxEntry {
    /// Monotonic per device, never reused
    pub sequence: u64,
    pub operation_type: OperationType,
    /// Aggregate the entry belongs to
    pub order_local_id: String,
    /// Local id of the affected order or line
    pub local_entity_id: String,
    /// Remote id of the affected entity, once known
    #[serde(default)]
    pub remote_entity_id: Option<String>,
    /// Payload body (the wire `data`)
    pub data: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub status: EntryStatus,
    #[serde(default)]
    pub attempts: u32,
    #[serde(default)]
    pub last_error: Option<String>,
}

impl OutboxEntry {
    pub fn new(
        sequence: u64,
        order_local_id: impl Into<String>,
        payload: &OperationPayload,
        remote_entity_id: Option<String>,
        created_at: DateTime<Utc>,
    ) -> Result<Self, serde_json::Error> {
        Ok(Self {
            sequence,
            operation_type: payload.operation_type(),
            order_local_id: order_local_id.into(),
            local_entity_id: payload.entity_id().to_string(),
            remote_entity_id,
            data: payload.to_data()?,
            created_at,
            status: EntryStatus::Pending,
            attempts: 0,
            last_error: None,
        })
    }

    /// Typed payload
    pub fn payload(&self) -> Result<OperationPayload, serde_json::Error> {
        OperationPayload::from_parts(self.operation_type, self.data.clone())
    }

    /// Wire form; the sequence travels along for exact result matching
    pub fn to_sync_operation(&self) -> SyncOperation {
        SyncOperation {
            operation_type: self.operation_type.as_str().to_string(),
            id_local: self.local_entity_id.clone(),
            data: self.data.clone(),
            timestamp_local: self.created_at,
            sequence: Some(self.sequence),
        }
    }

    pub fn is_unsent(&self) -> bool {
        matches!(self.status, EntryStatus::Pending | EntryStatus::Failed)
    }
}

/// Entry counts by status
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboxStatus {
    pub pending: usize,
    pub syncing: usize,
    pub failed: usize,
}

impl OutboxStatus {
    pub fn total(&self) -> usize {
        self.pending + self.syncing + self.failed
    }
}
