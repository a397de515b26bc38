//! Service-layer error type for sync-server
//!
//! `ServiceError` bridges storage errors (`StoreError`) and the API-layer
//! error (`AppError`), so handlers can use `?` on both.

use axum::response::IntoResponse;
use shared::error::{AppError, ErrorCode};
use shared::models::LineError;

use crate::db::StoreError;

#[derive(Debug)]
pub enum ServiceError {
    /// Storage failure (logged, mapped to DatabaseError)
    Store(StoreError),
    /// Business-rule error, passed through to the client unchanged
    App(AppError),
}

impl From<StoreError> for ServiceError {
    fn from(e: StoreError) -> Self {
        ServiceError::Store(e)
    }
}

impl From<AppError> for ServiceError {
    fn from(e: AppError) -> Self {
        ServiceError::App(e)
    }
}

impl From<LineError> for ServiceError {
    fn from(e: LineError) -> Self {
        ServiceError::App(e.into())
    }
}

impl From<ServiceError> for AppError {
    fn from(e: ServiceError) -> Self {
        match e {
            ServiceError::App(app_err) => app_err,
            ServiceError::Store(store_err) => {
                tracing::error!(error = %store_err, "Store error");
                AppError::with_message(ErrorCode::DatabaseError, store_err.to_string())
            }
        }
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> axum::response::Response {
        let app_error: AppError = self.into();
        app_error.into_response()
    }
}

pub type ServiceResult<T> = Result<T, ServiceError>;
