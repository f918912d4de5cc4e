//! Queue depth and budget reporting.

use axum::{extract::State, Extension, Json};
use chrono::Utc;
use serde::Serialize;

use pubflow_core::Quota;
use pubflow_db::{peek_budget, queue_depths, QueueDepthRow};

use super::{map_db_error, ApiError, ApiResponse, AppState, ResponseMeta};
use crate::middleware::RequestId;

#[derive(Debug, Serialize)]
pub struct QueueStatusData {
    pub queues: Vec<QueueDepthRow>,
    pub budgets: Vec<BudgetStatus>,
}

#[derive(Debug, Serialize)]
pub struct BudgetStatus {
    pub quota: &'static str,
    pub total: i64,
    pub limit: i64,
}

/// `GET /api/v1/queues/status` — per-queue depths plus today's spend
/// against each daily quota.
pub async fn queue_status(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
) -> Result<Json<ApiResponse<QueueStatusData>>, ApiError> {
    let queues = queue_depths(&state.pool)
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;

    let today = Utc::now().date_naive();
    let mut budgets = Vec::with_capacity(2);
    for (quota, limit) in [
        (Quota::Calls, state.config.calls_per_day),
        (Quota::Tokens, state.config.tokens_per_day),
    ] {
        let total = peek_budget(&state.pool, quota, today)
            .await
            .map_err(|e| map_db_error(req_id.0.clone(), &e))?;
        budgets.push(BudgetStatus {
            quota: quota.as_str(),
            total,
            limit,
        });
    }

    Ok(Json(ApiResponse {
        data: QueueStatusData { queues, budgets },
        meta: ResponseMeta::new(req_id.0),
    }))
}
