//! Batch synchronization wire protocol
//!
//! Used by field-client to push its outbox to sync-server, and by
//! sync-server to replay the batch and report per-operation outcomes.
//!
//! ```text
//! POST /api/sync/batch
//!   → SyncBatchRequest  { operations: [SyncOperation] }
//!   ← SyncBatchResponse { success, message, data: SyncBatchData }
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::operation::{OperationPayload, OperationType};
use crate::error::AppError;

/// Default upper bound on operations accepted in one batch
pub const MAX_SYNC_BATCH_OPERATIONS: usize = 500;

/// One operation as transmitted
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncOperation {
    /// Wire name of the [`OperationType`]; kept as a string so an unknown
    /// kind fails only this operation
    pub operation_type: String,
    /// Local id of the affected entity
    pub id_local: String,
    /// Type-specific payload body
    pub data: serde_json::Value,
    /// Client wall-clock time the operation was recorded
    pub timestamp_local: DateTime<Utc>,
    /// Client outbox sequence (secondary ordering key, echoed in results)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sequence: Option<u64>,
}

impl SyncOperation {
    pub fn new(
        payload: &OperationPayload,
        timestamp_local: DateTime<Utc>,
        sequence: Option<u64>,
    ) -> Result<Self, serde_json::Error> {
        Ok(Self {
            operation_type: payload.operation_type().as_str().to_string(),
            id_local: payload.entity_id().to_string(),
            data: payload.to_data()?,
            timestamp_local,
            sequence,
        })
    }

    pub fn parsed_type(&self) -> Option<OperationType> {
        self.operation_type.parse().ok()
    }
}

/// Batch request body
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SyncBatchRequest {
    pub operations: Vec<SyncOperation>,
}

/// Outcome of one operation
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OperationOutcome {
    Succeeded,
    Error,
}

/// Per-operation result
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct OperationResult {
    pub id_local: String,
    pub operation_type: String,
    pub outcome: OperationOutcome,
    pub remote_id: Option<String>,
    pub error: Option<String>,
    /// Numeric [`crate::error::ErrorCode`] of a failed operation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_code: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sequence: Option<u64>,
}

impl OperationResult {
    pub fn succeeded(op: &SyncOperation, remote_id: Option<String>) -> Self {
        Self {
            id_local: op.id_local.clone(),
            operation_type: op.operation_type.clone(),
            outcome: OperationOutcome::Succeeded,
            remote_id,
            error: None,
            error_code: None,
            sequence: op.sequence,
        }
    }

    pub fn failed(op: &SyncOperation, err: &AppError) -> Self {
        Self {
            id_local: op.id_local.clone(),
            operation_type: op.operation_type.clone(),
            outcome: OperationOutcome::Error,
            remote_id: None,
            error: Some(err.message.clone()),
            error_code: Some(err.code.code()),
            sequence: op.sequence,
        }
    }

    pub fn is_success(&self) -> bool {
        self.outcome == OperationOutcome::Succeeded
    }
}

/// Batch counters
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct SyncSummary {
    pub total: u32,
    pub succeeded: u32,
    pub failed: u32,
}

impl SyncSummary {
    pub fn from_results(results: &[OperationResult]) -> Self {
        let succeeded = results.iter().filter(|r| r.is_success()).count() as u32;
        let total = results.len() as u32;
        Self {
            total,
            succeeded,
            failed: total - succeeded,
        }
    }
}

/// Overall batch state
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OverallState {
    Completed,
    Failed,
    CompletedWithErrors,
}

impl OverallState {
    pub fn from_summary(summary: &SyncSummary) -> Self {
        if summary.failed == 0 {
            Self::Completed
        } else if summary.succeeded == 0 {
            Self::Failed
        } else {
            Self::CompletedWithErrors
        }
    }
}

/// Response payload
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncBatchData {
    /// Audit record id (see `GET /api/sync/logs/{id}`)
    pub sync_log_id: String,
    pub summary: SyncSummary,
    pub overall_state: OverallState,
    pub results: Vec<OperationResult>,
    /// Every local → remote assignment made by this batch
    #[serde(default)]
    pub id_mapping: HashMap<String, String>,
}

/// Response envelope
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncBatchResponse {
    pub success: bool,
    pub message: String,
    #[serde(default)]
    pub data: Option<SyncBatchData>,
}

impl SyncBatchResponse {
    pub fn processed(data: SyncBatchData) -> Self {
        Self {
            success: true,
            message: format!(
                "Batch processed: {} succeeded, {} failed",
                data.summary.succeeded, data.summary.failed
            ),
            data: Some(data),
        }
    }
}
