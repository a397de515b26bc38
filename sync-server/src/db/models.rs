//! Authoritative records

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use shared::models::{LineItem, OrderHeader};
use shared::sync::{OperationResult, OverallState, SyncOperation, SyncSummary};
use std::collections::HashMap;

/// Stored order header
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderRecord {
    /// Remote id assigned by this store
    pub id: String,
    /// Id the field device created the order with
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local_id: Option<String>,
    pub header: OrderHeader,
    /// Unix millis of the last write
    pub updated_at: i64,
}

/// Stored order line
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineRecord {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local_id: Option<String>,
    /// Remote id of the parent order
    pub order_id: String,
    pub item: LineItem,
    pub updated_at: i64,
}

/// Order with its lines (read model for `GET /api/orders/{id}`)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderDetail {
    pub order: OrderRecord,
    pub lines: Vec<LineRecord>,
    pub total: Decimal,
}

/// Audit record of one batch attempt
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncLogRecord {
    pub id: String,
    /// Who submitted the batch
    pub operator: String,
    pub received_at: DateTime<Utc>,
    /// Operations as submitted (arrival order)
    pub operations: Vec<SyncOperation>,
    /// Outcomes in execution order
    pub results: Vec<OperationResult>,
    pub summary: SyncSummary,
    pub overall_state: OverallState,
    #[serde(default)]
    pub id_mapping: HashMap<String, String>,
}
