//! Database operations for `takedown_requests`.
//!
//! A takedown request is immutable once created except for the execution
//! audit fields written when the deferred deletion fires.

use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::DbError;

/// A row from the `takedown_requests` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct TakedownRequestRow {
    pub id: i64,
    pub source_id: String,
    pub reason: String,
    pub received_at: DateTime<Utc>,
    pub scheduled_deletion_at: DateTime<Utc>,
    pub executed_at: Option<DateTime<Utc>>,
    /// Whether the deletion ran at or before `scheduled_deletion_at`.
    pub sla_met: Option<bool>,
}

/// Inserts a takedown request; a second request for the same `source_id`
/// is a no-op.
///
/// Returns the created row, or `None` when a request already existed.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the insert fails (including a missing
/// content item, via the foreign key).
pub async fn insert_takedown_request(
    pool: &PgPool,
    source_id: &str,
    reason: &str,
    received_at: DateTime<Utc>,
    scheduled_deletion_at: DateTime<Utc>,
) -> Result<Option<TakedownRequestRow>, DbError> {
    let row = sqlx::query_as::<_, TakedownRequestRow>(
        "INSERT INTO takedown_requests \
             (source_id, reason, received_at, scheduled_deletion_at) \
         VALUES ($1, $2, $3, $4) \
         ON CONFLICT (source_id) DO NOTHING \
         RETURNING *",
    )
    .bind(source_id)
    .bind(reason)
    .bind(received_at)
    .bind(scheduled_deletion_at)
    .fetch_optional(pool)
    .await?;

    Ok(row)
}

/// Fetches the takedown request for an item, if one exists.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn get_takedown_request(
    pool: &PgPool,
    source_id: &str,
) -> Result<Option<TakedownRequestRow>, DbError> {
    let row = sqlx::query_as::<_, TakedownRequestRow>(
        "SELECT * FROM takedown_requests WHERE source_id = $1",
    )
    .bind(source_id)
    .fetch_optional(pool)
    .await?;

    Ok(row)
}

/// Lists unexecuted requests whose scheduled deletion time has passed.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_due_takedowns(
    pool: &PgPool,
    now: DateTime<Utc>,
) -> Result<Vec<TakedownRequestRow>, DbError> {
    let rows = sqlx::query_as::<_, TakedownRequestRow>(
        "SELECT * FROM takedown_requests \
         WHERE executed_at IS NULL AND scheduled_deletion_at <= $1 \
         ORDER BY scheduled_deletion_at",
    )
    .bind(now)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// Records the execution audit for a takedown: when the deletion ran and
/// whether the SLA was met.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the update fails.
pub async fn mark_takedown_executed(
    pool: &PgPool,
    id: i64,
    executed_at: DateTime<Utc>,
    sla_met: bool,
) -> Result<(), DbError> {
    sqlx::query(
        "UPDATE takedown_requests SET executed_at = $2, sla_met = $3 WHERE id = $1",
    )
    .bind(id)
    .bind(executed_at)
    .bind(sla_met)
    .execute(pool)
    .await?;

    Ok(())
}
