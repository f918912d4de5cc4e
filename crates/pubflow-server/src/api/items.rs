//! Per-item status lookup.

use axum::{
    extract::{Path, State},
    Extension, Json,
};
use chrono::{DateTime, Utc};
use serde::Serialize;

use pubflow_db::{get_content_item, get_takedown_request, list_tasks_for_source};

use super::{map_db_error, ApiError, ApiResponse, AppState, ResponseMeta};
use crate::middleware::RequestId;

#[derive(Debug, Serialize)]
pub struct ItemData {
    pub source_id: String,
    pub title: String,
    pub score: i64,
    pub comment_count: i64,
    pub summary: Option<String>,
    pub tags: Option<serde_json::Value>,
    pub publish_ref: Option<String>,
    pub publish_url: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
    pub takedown_status: &'static str,
    pub last_error: Option<String>,
    pub takedown: Option<TakedownSummary>,
    pub tasks: Vec<TaskSummary>,
}

#[derive(Debug, Serialize)]
pub struct TakedownSummary {
    pub reason: String,
    pub received_at: DateTime<Utc>,
    pub scheduled_deletion_at: DateTime<Utc>,
    pub executed_at: Option<DateTime<Utc>>,
    pub sla_met: Option<bool>,
}

#[derive(Debug, Serialize)]
pub struct TaskSummary {
    pub id: i64,
    pub queue: String,
    pub status: String,
    pub attempt: i32,
    pub run_at: DateTime<Utc>,
    pub last_error: Option<String>,
}

/// `GET /api/v1/items/{source_id}` — the item's pipeline progress: its
/// enrichment and publication state, any takedown, and every task that has
/// referenced it (newest first). Budget-parked tasks show up here as
/// `pending` with a future `run_at`.
pub async fn get_item(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(source_id): Path<String>,
) -> Result<Json<ApiResponse<ItemData>>, ApiError> {
    let item = get_content_item(&state.pool, &source_id)
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;

    let Some(item) = item else {
        return Err(ApiError::new(
            req_id.0,
            "not_found",
            format!("no content item with source_id {source_id}"),
        ));
    };

    let tasks = list_tasks_for_source(&state.pool, &source_id)
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;
    let takedown = get_takedown_request(&state.pool, &source_id)
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;

    let data = ItemData {
        takedown_status: item.takedown_status().as_str(),
        source_id: item.source_id,
        title: item.title,
        score: item.score,
        comment_count: item.comment_count,
        summary: item.summary,
        tags: item.tags,
        publish_ref: item.publish_ref,
        publish_url: item.publish_url,
        published_at: item.published_at,
        last_error: item.last_error,
        takedown: takedown.map(|t| TakedownSummary {
            reason: t.reason,
            received_at: t.received_at,
            scheduled_deletion_at: t.scheduled_deletion_at,
            executed_at: t.executed_at,
            sla_met: t.sla_met,
        }),
        tasks: tasks
            .into_iter()
            .map(|t| TaskSummary {
                id: t.id,
                queue: t.queue,
                status: t.status,
                attempt: t.attempt,
                run_at: t.run_at,
                last_error: t.last_error,
            })
            .collect(),
    };

    Ok(Json(ApiResponse {
        data,
        meta: ResponseMeta::new(req_id.0),
    }))
}
