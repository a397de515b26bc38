//! Unified error codes for the order sync stack
//!
//! This module defines all error codes used across sync-server and field-client.
//! The numeric value is what travels on the wire; ranges:
//! - 0xxx: General errors
//! - 4xxx: Order / draft errors
//! - 6xxx: Sync errors
//! - 9xxx: System errors

use serde::{Deserialize, Serialize};
use std::fmt;

/// Error code shared by sync-server and field-client
///
/// Serialized as its bare `u16` value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "u16", try_from = "u16")]
#[repr(u16)]
pub enum ErrorCode {
    // ==================== 0xxx: General ====================
    /// Operation completed successfully
    Success = 0,
    /// Unknown error
    Unknown = 1,
    /// Validation failed
    ValidationFailed = 2,
    /// Resource not found
    NotFound = 3,
    /// Invalid request
    InvalidRequest = 5,
    /// Invalid format
    InvalidFormat = 6,

    // ==================== 4xxx: Order ====================
    /// Order not found
    OrderNotFound = 4001,
    /// Order line not found
    OrderLineNotFound = 4002,
    /// Consumption unit index not found on the line
    ConsumptionUnitNotFound = 4003,
    /// Extra not found on the consumption unit
    ExtraNotFound = 4004,
    /// Quantity must be at least 1
    InvalidQuantity = 4005,
    /// No draft is being edited
    NoActiveDraft = 4006,

    // ==================== 6xxx: Sync ====================
    /// Remote service is not reachable
    NetworkUnavailable = 6001,
    /// Another synchronization round is running
    SyncInProgress = 6002,
    /// Synchronization was cancelled before completion
    SyncCancelled = 6003,
    /// Batch exceeds the accepted operation count
    BatchTooLarge = 6004,
    /// Operation type is not part of the protocol
    UnknownOperationType = 6005,
    /// Operation payload does not match its type
    InvalidPayload = 6006,
    /// Outbox entry not found
    OperationNotFound = 6007,
    /// Sync audit record not found
    SyncLogNotFound = 6008,

    // ==================== 9xxx: System ====================
    /// Internal server error
    InternalError = 9001,
    /// Database error
    DatabaseError = 9002,
    /// Network error
    NetworkError = 9004,
    /// Timeout error
    TimeoutError = 9005,
}

impl ErrorCode {
    #[inline]
    pub const fn code(&self) -> u16 {
        *self as u16
    }

    /// Server-side failure rather than a problem with the request
    pub const fn is_system(&self) -> bool {
        self.code() >= 9000
    }

    /// Default English message
    pub const fn message(&self) -> &'static str {
        match self {
            // General
            ErrorCode::Success => "Operation completed successfully",
            ErrorCode::Unknown => "An unknown error occurred",
            ErrorCode::ValidationFailed => "Validation failed",
            ErrorCode::NotFound => "Resource not found",
            ErrorCode::InvalidRequest => "Invalid request",
            ErrorCode::InvalidFormat => "Invalid format",

            // Order
            ErrorCode::OrderNotFound => "Order not found",
            ErrorCode::OrderLineNotFound => "Order line not found",
            ErrorCode::ConsumptionUnitNotFound => "Consumption unit not found",
            ErrorCode::ExtraNotFound => "Extra not found",
            ErrorCode::InvalidQuantity => "Quantity must be at least 1",
            ErrorCode::NoActiveDraft => "No order is being edited",

            // Sync
            ErrorCode::NetworkUnavailable => "Network is not available",
            ErrorCode::SyncInProgress => "A synchronization is already running",
            ErrorCode::SyncCancelled => "Synchronization was cancelled",
            ErrorCode::BatchTooLarge => "Batch contains too many operations",
            ErrorCode::UnknownOperationType => "Unknown operation type",
            ErrorCode::InvalidPayload => "Operation payload does not match its type",
            ErrorCode::OperationNotFound => "Operation not found",
            ErrorCode::SyncLogNotFound => "Sync log not found",

            // System
            ErrorCode::InternalError => "Internal server error",
            ErrorCode::DatabaseError => "Database error",
            ErrorCode::NetworkError => "Network error",
            ErrorCode::TimeoutError => "Operation timed out",
        }
    }
}

impl From<ErrorCode> for u16 {
    #[inline]
    fn from(code: ErrorCode) -> Self {
        code.code()
    }
}

/// A `u16` that is not a known [`ErrorCode`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvalidErrorCode(pub u16);

impl fmt::Display for InvalidErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown error code {}", self.0)
    }
}

impl std::error::Error for InvalidErrorCode {}

impl TryFrom<u16> for ErrorCode {
    type Error = InvalidErrorCode;

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        match value {
            // General
            0 => Ok(ErrorCode::Success),
            1 => Ok(ErrorCode::Unknown),
            2 => Ok(ErrorCode::ValidationFailed),
            3 => Ok(ErrorCode::NotFound),
            5 => Ok(ErrorCode::InvalidRequest),
            6 => Ok(ErrorCode::InvalidFormat),

            // Order
            4001 => Ok(ErrorCode::OrderNotFound),
            4002 => Ok(ErrorCode::OrderLineNotFound),
            4003 => Ok(ErrorCode::ConsumptionUnitNotFound),
            4004 => Ok(ErrorCode::ExtraNotFound),
            4005 => Ok(ErrorCode::InvalidQuantity),
            4006 => Ok(ErrorCode::NoActiveDraft),

            // Sync
            6001 => Ok(ErrorCode::NetworkUnavailable),
            6002 => Ok(ErrorCode::SyncInProgress),
            6003 => Ok(ErrorCode::SyncCancelled),
            6004 => Ok(ErrorCode::BatchTooLarge),
            6005 => Ok(ErrorCode::UnknownOperationType),
            6006 => Ok(ErrorCode::InvalidPayload),
            6007 => Ok(ErrorCode::OperationNotFound),
            6008 => Ok(ErrorCode::SyncLogNotFound),

            // System
            9001 => Ok(ErrorCode::InternalError),
            9002 => Ok(ErrorCode::DatabaseError),
            9004 => Ok(ErrorCode::NetworkError),
            9005 => Ok(ErrorCode::TimeoutError),

            _ => Err(InvalidErrorCode(value)),
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}
