//! POST /api/sync/batch — replay an outbox batch from a field device

use axum::Json;
use axum::extract::State;
use axum::http::HeaderMap;
use shared::error::{AppError, ErrorCode};
use shared::sync::{SyncBatchRequest, SyncBatchResponse};

use crate::state::AppState;

/// Header naming the operator that submitted the batch
pub const OPERATOR_HEADER: &str = "x-operator-id";

const ANONYMOUS_OPERATOR: &str = "anonymous";

/// Handle a sync batch
///
/// The batch runs on the blocking pool and is not tied to this request
/// future: if the client disconnects, processing and the audit write still
/// complete.
pub async fn handle_batch(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<SyncBatchRequest>,
) -> Result<Json<SyncBatchResponse>, AppError> {
    let operator = operator_from(&headers);
    tracing::debug!(operator = %operator, operations = request.operations.len(), "Sync batch received");

    let processor = state.processor.clone();
    let data = tokio::task::spawn_blocking(move || processor.process(&operator, request))
        .await
        .map_err(|e| {
            tracing::error!("Sync batch task failed: {e}");
            AppError::new(ErrorCode::InternalError)
        })??;

    Ok(Json(SyncBatchResponse::processed(data)))
}

fn operator_from(headers: &HeaderMap) -> String {
    headers
        .get(OPERATOR_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .unwrap_or(ANONYMOUS_OPERATOR)
        .to_string()
}
