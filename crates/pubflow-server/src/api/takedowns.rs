//! Takedown request intake.

use axum::{extract::State, http::StatusCode, Extension, Json};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use pubflow_pipeline::request_takedown;

use super::{map_pipeline_error, ApiError, ApiResponse, AppState, ResponseMeta};
use crate::middleware::RequestId;

#[derive(Debug, Deserialize)]
pub struct TakedownRequestBody {
    pub source_id: String,
    pub reason: String,
}

#[derive(Debug, Serialize)]
pub struct TakedownData {
    pub source_id: String,
    pub already_pending: bool,
    pub scheduled_deletion_at: DateTime<Utc>,
}

/// `POST /api/v1/takedowns` — files a takedown, unpublishing the item
/// immediately and scheduling its deferred deletion.
///
/// Repeat requests for the same item are acknowledged with the original
/// schedule rather than rejected.
pub async fn create_takedown(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Json(body): Json<TakedownRequestBody>,
) -> Result<(StatusCode, Json<ApiResponse<TakedownData>>), ApiError> {
    if body.reason.trim().is_empty() {
        return Err(ApiError::new(
            req_id.0,
            "validation_error",
            "reason must not be empty",
        ));
    }

    let receipt = request_takedown(
        &state.pool,
        &state.ghost,
        &state.notifier,
        &body.source_id,
        &body.reason,
        state.config.takedown_grace_hours,
    )
    .await
    .map_err(|e| map_pipeline_error(req_id.0.clone(), &e))?;

    let Some(receipt) = receipt else {
        return Err(ApiError::new(
            req_id.0,
            "not_found",
            format!("no content item with source_id {}", body.source_id),
        ));
    };

    Ok((
        StatusCode::ACCEPTED,
        Json(ApiResponse {
            data: TakedownData {
                source_id: receipt.source_id,
                already_pending: receipt.already_pending,
                scheduled_deletion_at: receipt.scheduled_deletion_at,
            },
            meta: ResponseMeta::new(req_id.0),
        }),
    ))
}
