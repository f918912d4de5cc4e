//! Manual collection trigger.

use axum::{extract::State, http::StatusCode, Extension, Json};
use chrono::Utc;
use serde::{Deserialize, Serialize};

use pubflow_pipeline::{task, TaskPayload};

use super::{map_pipeline_error, ApiError, ApiResponse, AppState, ResponseMeta};
use crate::middleware::RequestId;

#[derive(Debug, Deserialize)]
pub struct TriggerRequest {
    /// Subreddits to collect from; defaults to the configured set.
    #[serde(default)]
    pub subreddits: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct TriggerData {
    pub task_ids: Vec<i64>,
}

/// `POST /api/v1/tasks/trigger` — enqueues one collect task per subreddit,
/// admitted under today's quota day.
pub async fn trigger_collection(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Json(request): Json<TriggerRequest>,
) -> Result<(StatusCode, Json<ApiResponse<TriggerData>>), ApiError> {
    let subreddits = if request.subreddits.is_empty() {
        state.config.subreddits.clone()
    } else {
        request.subreddits
    };

    if subreddits.is_empty() {
        return Err(ApiError::new(
            req_id.0,
            "validation_error",
            "no subreddits configured and none supplied",
        ));
    }

    let now = Utc::now();
    let quota_day = now.date_naive();
    let mut task_ids = Vec::with_capacity(subreddits.len());

    for subreddit in subreddits {
        let payload = TaskPayload::Collect {
            subreddit,
            quota_day,
        };
        let id = task::enqueue(&state.pool, &payload, now)
            .await
            .map_err(|e| map_pipeline_error(req_id.0.clone(), &e))?;
        task_ids.push(id);
    }

    tracing::info!(count = task_ids.len(), "collection triggered via API");

    Ok((
        StatusCode::ACCEPTED,
        Json(ApiResponse {
            data: TriggerData { task_ids },
            meta: ResponseMeta::new(req_id.0),
        }),
    ))
}
