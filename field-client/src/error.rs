//! Client error types

use shared::error::{AppError, ErrorCode};
use shared::models::LineError;
use thiserror::Error;

use crate::storage::StorageError;

/// Client error type
#[derive(Debug, Error)]
pub enum ClientError {
    /// HTTP request failed
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Error response from the sync server
    #[error("API error {code}: {message}")]
    Api { code: u16, message: String },

    /// Response did not have the expected shape
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// Local outbox/draft storage failed
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// Structural rule of a line was violated
    #[error(transparent)]
    Line(#[from] LineError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("No active draft")]
    NoActiveDraft,

    #[error("Line not found in draft: {0}")]
    LineNotFound(String),

    #[error("Outbox entry not found: {0}")]
    OperationNotFound(u64),

    #[error("Outbox entry {0} is not failed")]
    NotRetryable(u64),

    #[error("Sync server unreachable")]
    NetworkUnavailable,

    #[error("Synchronization already in progress")]
    SyncInProgress,

    #[error("Synchronization cancelled")]
    Cancelled,
}

impl ClientError {
    /// Unified error code for this error
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Http(e) if e.is_timeout() => ErrorCode::TimeoutError,
            Self::Http(_) => ErrorCode::NetworkError,
            Self::Api { code, .. } => ErrorCode::try_from(*code).unwrap_or(ErrorCode::Unknown),
            Self::InvalidResponse(_) => ErrorCode::InvalidFormat,
            Self::Storage(_) => ErrorCode::DatabaseError,
            Self::Line(LineError::UnitNotFound(_)) => ErrorCode::ConsumptionUnitNotFound,
            Self::Line(LineError::ExtraNotFound { .. }) => ErrorCode::ExtraNotFound,
            Self::Line(LineError::InvalidQuantity(_)) => ErrorCode::InvalidQuantity,
            Self::Serialization(_) => ErrorCode::InvalidFormat,
            Self::Io(_) => ErrorCode::InternalError,
            Self::NoActiveDraft => ErrorCode::NoActiveDraft,
            Self::LineNotFound(_) => ErrorCode::OrderLineNotFound,
            Self::OperationNotFound(_) => ErrorCode::OperationNotFound,
            Self::NotRetryable(_) => ErrorCode::InvalidRequest,
            Self::NetworkUnavailable => ErrorCode::NetworkUnavailable,
            Self::SyncInProgress => ErrorCode::SyncInProgress,
            Self::Cancelled => ErrorCode::SyncCancelled,
        }
    }

    /// Transient failures that a later round may get past
    pub fn is_transient(&self) -> bool {
        matches!(
            self.code(),
            ErrorCode::NetworkUnavailable | ErrorCode::NetworkError | ErrorCode::TimeoutError
        )
    }
}

// Commits happen outside the storage layer (drafts and reconciliation own
// their transactions)
impl From<redb::CommitError> for ClientError {
    fn from(err: redb::CommitError) -> Self {
        Self::Storage(StorageError::Commit(err))
    }
}

impl From<ClientError> for AppError {
    fn from(err: ClientError) -> Self {
        AppError::with_message(err.code(), err.to_string())
    }
}

/// Result type for client operations
pub type ClientResult<T> = Result<T, ClientError>;
