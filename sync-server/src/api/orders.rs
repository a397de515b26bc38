//! Read endpoints: authoritative orders and sync audit records

use axum::Json;
use axum::extract::{Path, State};
use shared::error::{ApiResponse, AppError};

use crate::db::{OrderDetail, SyncLogRecord};
use crate::error::ServiceResult;
use crate::state::AppState;

/// GET /api/orders/{id} — `id` may be the remote id or the device's local id
pub async fn get_order(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ServiceResult<Json<ApiResponse<OrderDetail>>> {
    let remote = state
        .store
        .remote_id_for_local(&id)?
        .unwrap_or_else(|| id.clone());
    let detail = state
        .store
        .order_detail(&remote)?
        .ok_or_else(|| AppError::order_not_found(&id))?;
    Ok(Json(ApiResponse::success(detail)))
}

/// GET /api/sync/logs/{id}
pub async fn get_sync_log(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ServiceResult<Json<ApiResponse<SyncLogRecord>>> {
    let record = state
        .audit
        .get(&id)?
        .ok_or_else(|| AppError::sync_log_not_found(&id))?;
    Ok(Json(ApiResponse::success(record)))
}
