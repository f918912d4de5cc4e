//! Database operations for `pipeline_tasks` — the three routed task queues.
//!
//! One table backs the `collect`, `process`, and `publish` queues, routed
//! by the `queue` column. Dequeue uses `FOR UPDATE SKIP LOCKED` so multiple
//! worker processes never hand the same task to two consumers. A stage
//! persists its output before the next stage's task is enqueued, which is
//! what gives the pipeline its per-item ordering guarantee.

use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::PgPool;

use crate::DbError;

/// A row from the `pipeline_tasks` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct TaskRow {
    pub id: i64,
    pub queue: String,
    pub payload: Value,
    /// 1-indexed attempt number, incremented by the orchestrator on
    /// re-enqueue — never by the stage itself.
    pub attempt: i32,
    pub status: String,
    pub run_at: DateTime<Utc>,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Pending/active/failed counts for one queue.
#[derive(Debug, Clone, sqlx::FromRow, serde::Serialize)]
pub struct QueueDepthRow {
    pub queue: String,
    pub pending: i64,
    pub active: i64,
    pub failed: i64,
}

/// Enqueues a task on the named queue, runnable at `run_at`.
///
/// Returns the new task id.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the insert fails.
pub async fn enqueue_task(
    pool: &PgPool,
    queue: &str,
    payload: &Value,
    attempt: i32,
    run_at: DateTime<Utc>,
) -> Result<i64, DbError> {
    let id: i64 = sqlx::query_scalar(
        "INSERT INTO pipeline_tasks (queue, payload, attempt, run_at) \
         VALUES ($1, $2::jsonb, $3, $4) \
         RETURNING id",
    )
    .bind(queue)
    .bind(payload)
    .bind(attempt)
    .bind(run_at)
    .fetch_one(pool)
    .await?;

    Ok(id)
}

/// Claims the next runnable task on the queue, if any.
///
/// The claim flips the row to `active` inside a single statement; other
/// workers skip locked rows, so a task is delivered to at most one
/// consumer. A process crash leaves the row `active` until
/// [`reclaim_stale_tasks`] returns it to the queue; delivery is
/// at-least-once, and the stages are written to tolerate redelivery.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the update fails.
pub async fn dequeue_task(pool: &PgPool, queue: &str) -> Result<Option<TaskRow>, DbError> {
    let row = sqlx::query_as::<_, TaskRow>(
        "UPDATE pipeline_tasks SET status = 'active', updated_at = NOW() \
         WHERE id = ( \
             SELECT id FROM pipeline_tasks \
             WHERE queue = $1 AND status = 'pending' AND run_at <= NOW() \
             ORDER BY run_at, id \
             LIMIT 1 \
             FOR UPDATE SKIP LOCKED \
         ) \
         RETURNING *",
    )
    .bind(queue)
    .fetch_optional(pool)
    .await?;

    Ok(row)
}

/// Marks a task done.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the update fails.
pub async fn complete_task(pool: &PgPool, id: i64) -> Result<(), DbError> {
    sqlx::query(
        "UPDATE pipeline_tasks SET status = 'done', updated_at = NOW() WHERE id = $1",
    )
    .bind(id)
    .execute(pool)
    .await?;

    Ok(())
}

/// Re-enqueues a task for another attempt after a retryable failure.
///
/// The caller supplies the incremented attempt number and the backoff
/// deadline decided by the retry policy.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the update fails.
pub async fn retry_task(
    pool: &PgPool,
    id: i64,
    attempt: i32,
    run_at: DateTime<Utc>,
    error: &str,
) -> Result<(), DbError> {
    sqlx::query(
        "UPDATE pipeline_tasks \
         SET status = 'pending', attempt = $2, run_at = $3, last_error = $4, \
             updated_at = NOW() \
         WHERE id = $1",
    )
    .bind(id)
    .bind(attempt)
    .bind(run_at)
    .bind(error)
    .execute(pool)
    .await?;

    Ok(())
}

/// Marks a task terminally failed.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the update fails.
pub async fn fail_task(pool: &PgPool, id: i64, error: &str) -> Result<(), DbError> {
    sqlx::query(
        "UPDATE pipeline_tasks \
         SET status = 'failed', last_error = $2, updated_at = NOW() \
         WHERE id = $1",
    )
    .bind(id)
    .bind(error)
    .execute(pool)
    .await?;

    Ok(())
}

/// Parks a budget-blocked task back on the queue without consuming an
/// attempt. `payload` is rewritten so the orchestrator can re-bind the
/// quota day to the resume day.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the update fails.
pub async fn release_task(
    pool: &PgPool,
    id: i64,
    run_at: DateTime<Utc>,
    payload: &Value,
) -> Result<(), DbError> {
    sqlx::query(
        "UPDATE pipeline_tasks \
         SET status = 'pending', run_at = $2, payload = $3::jsonb, updated_at = NOW() \
         WHERE id = $1",
    )
    .bind(id)
    .bind(run_at)
    .bind(payload)
    .execute(pool)
    .await?;

    Ok(())
}

/// Returns every `active` task whose last update predates `cutoff` to
/// `pending`, making it claimable again.
///
/// A claim bumps `updated_at`, so a healthy worker's in-flight task never
/// falls behind the cutoff; only tasks stranded by a crashed or killed
/// worker do. Returns how many tasks were reclaimed.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the update fails.
pub async fn reclaim_stale_tasks(
    pool: &PgPool,
    cutoff: DateTime<Utc>,
) -> Result<u64, DbError> {
    let result = sqlx::query(
        "UPDATE pipeline_tasks \
         SET status = 'pending', updated_at = NOW() \
         WHERE status = 'active' AND updated_at < $1",
    )
    .bind(cutoff)
    .execute(pool)
    .await?;

    Ok(result.rows_affected())
}

/// Pending/active/failed counts for every queue that has ever held a task.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn queue_depths(pool: &PgPool) -> Result<Vec<QueueDepthRow>, DbError> {
    let rows = sqlx::query_as::<_, QueueDepthRow>(
        "SELECT queue, \
             COUNT(*) FILTER (WHERE status = 'pending') AS pending, \
             COUNT(*) FILTER (WHERE status = 'active')  AS active, \
             COUNT(*) FILTER (WHERE status = 'failed')  AS failed \
         FROM pipeline_tasks \
         GROUP BY queue \
         ORDER BY queue",
    )
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// All tasks whose payload references the given `source_id`, newest first.
/// Used by the item-status API to distinguish budget-parked work from
/// permanent failures.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_tasks_for_source(
    pool: &PgPool,
    source_id: &str,
) -> Result<Vec<TaskRow>, DbError> {
    let rows = sqlx::query_as::<_, TaskRow>(
        "SELECT * FROM pipeline_tasks \
         WHERE payload->>'source_id' = $1 \
         ORDER BY id DESC",
    )
    .bind(source_id)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}
