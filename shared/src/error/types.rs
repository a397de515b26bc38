//! AppError and the read-endpoint envelope

use super::codes::ErrorCode;
use crate::models::LineError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use thiserror::Error;

/// Error crossing a service boundary: a numeric code, a message and
/// optional structured context (e.g. the id that was not found)
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct AppError {
    pub code: ErrorCode,
    pub message: String,
    pub details: Option<HashMap<String, Value>>,
}

impl AppError {
    /// Error carrying the code's default message
    pub fn new(code: ErrorCode) -> Self {
        Self::with_message(code, code.message())
    }

    pub fn with_message(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
        }
    }

    pub fn with_detail(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.details
            .get_or_insert_with(HashMap::new)
            .insert(key.into(), value.into());
        self
    }

    pub fn order_not_found(id: impl Into<String>) -> Self {
        let id = id.into();
        Self::with_message(ErrorCode::OrderNotFound, format!("Order not found: {id}"))
            .with_detail("order_id", id)
    }

    pub fn line_not_found(id: impl Into<String>) -> Self {
        let id = id.into();
        Self::with_message(ErrorCode::OrderLineNotFound, format!("Order line not found: {id}"))
            .with_detail("line_id", id)
    }

    pub fn sync_log_not_found(id: impl Into<String>) -> Self {
        let id = id.into();
        Self::with_message(ErrorCode::SyncLogNotFound, format!("Sync log not found: {id}"))
            .with_detail("sync_log_id", id)
    }
}

impl From<LineError> for AppError {
    fn from(err: LineError) -> Self {
        let code = match &err {
            LineError::UnitNotFound(_) => ErrorCode::ConsumptionUnitNotFound,
            LineError::ExtraNotFound { .. } => ErrorCode::ExtraNotFound,
            LineError::InvalidQuantity(_) => ErrorCode::InvalidQuantity,
        };
        Self::with_message(code, err.to_string())
    }
}

pub type AppResult<T> = Result<T, AppError>;

/// Envelope of the read endpoints and of every error body
///
/// `code` is 0 on success; on failure it is the [`ErrorCode`] value and
/// `details` mirrors [`AppError::details`]. The batch endpoint answers with
/// its own `SyncBatchResponse` on success.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<u16>,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<HashMap<String, Value>>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            code: Some(ErrorCode::Success.code()),
            message: "OK".to_string(),
            data: Some(data),
            details: None,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self.code, None | Some(0))
    }
}

impl ApiResponse<()> {
    pub fn error(err: &AppError) -> Self {
        Self {
            code: Some(err.code.code()),
            message: err.message.clone(),
            data: None,
            details: err.details.clone(),
        }
    }
}
