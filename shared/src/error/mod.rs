//! Unified error system
//!
//! This module provides:
//! - [`ErrorCode`]: Standardized error codes for all error types
//! - [`AppError`]: Rich error type with codes, messages, and details
//! - [`ApiResponse`]: Unified API response format
//!
//! # Error Code Ranges
//!
//! - 0xxx: General errors
//! - 4xxx: Order / draft errors
//! - 6xxx: Sync errors
//! - 9xxx: System errors
//!
//! # Example
//!
//! ```
//! use shared::error::{AppError, ErrorCode, ApiResponse};
//!
//! let err = AppError::with_message(ErrorCode::OrderLineNotFound, "Line l-1 not found")
//!     .with_detail("line_id", "l-1");
//!
//! let response = ApiResponse::<()>::error(&err);
//! assert_eq!(response.code, Some(4002));
//! ```

mod codes;
mod http;
mod types;

pub use codes::{ErrorCode, InvalidErrorCode};
pub use types::{ApiResponse, AppError, AppResult};
