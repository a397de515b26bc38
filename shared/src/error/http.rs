//! HTTP boundary: status mapping and axum responses

use super::codes::ErrorCode;
use super::types::{ApiResponse, AppError};
use axum::Json;
use axum::response::{IntoResponse, Response};
use http::StatusCode;
use serde::Serialize;

impl ErrorCode {
    pub fn http_status(&self) -> StatusCode {
        match self {
            Self::Success => StatusCode::OK,

            Self::NotFound
            | Self::OrderNotFound
            | Self::OrderLineNotFound
            | Self::ConsumptionUnitNotFound
            | Self::ExtraNotFound
            | Self::NoActiveDraft
            | Self::OperationNotFound
            | Self::SyncLogNotFound => StatusCode::NOT_FOUND,

            Self::SyncInProgress => StatusCode::CONFLICT,
            Self::BatchTooLarge => StatusCode::PAYLOAD_TOO_LARGE,

            // Transient: the device keeps its outbox and tries again later
            Self::NetworkUnavailable | Self::NetworkError | Self::TimeoutError => {
                StatusCode::SERVICE_UNAVAILABLE
            }

            Self::Unknown | Self::InternalError | Self::DatabaseError => {
                StatusCode::INTERNAL_SERVER_ERROR
            }

            _ => StatusCode::BAD_REQUEST,
        }
    }
}

impl AppError {
    pub fn http_status(&self) -> StatusCode {
        self.code.http_status()
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if self.code.is_system() {
            tracing::error!(code = %self.code, message = %self.message, "Request failed");
        }
        (self.http_status(), Json(ApiResponse::<()>::error(&self))).into_response()
    }
}

impl<T: Serialize> IntoResponse for ApiResponse<T> {
    fn into_response(self) -> Response {
        let status = match self.code {
            None | Some(0) => StatusCode::OK,
            Some(code) => ErrorCode::try_from(code)
                .map(|c| c.http_status())
                .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
        };
        (status, Json(self)).into_response()
    }
}
