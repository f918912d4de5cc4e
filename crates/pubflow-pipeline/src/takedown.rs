//! Two-phase takedown workflow.
//!
//! Phase one (on request): best-effort unpublish at the target, flip the
//! item to `takedown_pending`, and record the request with its deletion
//! deadline. Phase two (the sweep): once the grace window has passed,
//! permanently delete at the target, flip to `removed`, and write the
//! audit trail. A failed delete stays unexecuted and is retried by the
//! next sweep; a ref the target no longer knows counts as deleted.

use chrono::{DateTime, Duration, Utc};
use sqlx::PgPool;

use pubflow_db::{
    get_content_item, get_takedown_request, insert_takedown_request, list_due_takedowns,
    mark_takedown_executed, transition_takedown_status, DbError, TakedownStatus,
};
use pubflow_ghost::GhostClient;

use crate::error::PipelineError;
use crate::notify::{Notifier, Severity};

/// Acknowledgement returned to the caller that filed a takedown.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TakedownReceipt {
    pub source_id: String,
    /// `true` when an earlier request already existed; the original
    /// schedule stands.
    pub already_pending: bool,
    pub scheduled_deletion_at: DateTime<Utc>,
}

/// Files a takedown request for an item.
///
/// Returns `None` if no such item exists. A second request for the same
/// item changes nothing and answers with the original schedule. The
/// unpublish at the target is best-effort only; the deferred deletion is
/// the guarantee.
///
/// # Errors
///
/// Returns [`PipelineError::Db`] if any persistence step fails.
pub async fn request_takedown(
    pool: &PgPool,
    ghost: &GhostClient,
    notifier: &Notifier,
    source_id: &str,
    reason: &str,
    grace_hours: i64,
) -> Result<Option<TakedownReceipt>, PipelineError> {
    let Some(item) = get_content_item(pool, source_id).await? else {
        return Ok(None);
    };

    if let Some(existing) = get_takedown_request(pool, source_id).await? {
        tracing::info!(source_id, "takedown already filed, keeping the original schedule");
        return Ok(Some(TakedownReceipt {
            source_id: source_id.to_string(),
            already_pending: true,
            scheduled_deletion_at: existing.scheduled_deletion_at,
        }));
    }

    if let Some(publish_ref) = item.publish_ref.as_deref() {
        if let Err(e) = ghost.unpublish_post(publish_ref).await {
            // Visibility stays until the deletion sweep; not a failure.
            tracing::warn!(
                source_id,
                publish_ref,
                error = %e,
                "best-effort unpublish failed; deferred deletion will still run"
            );
        }
    }

    transition_takedown_status(
        pool,
        source_id,
        TakedownStatus::Active,
        TakedownStatus::TakedownPending,
    )
    .await?;

    let received_at = Utc::now();
    let scheduled_deletion_at = received_at + Duration::hours(grace_hours);

    let receipt = match insert_takedown_request(
        pool,
        source_id,
        reason,
        received_at,
        scheduled_deletion_at,
    )
    .await?
    {
        Some(row) => TakedownReceipt {
            source_id: source_id.to_string(),
            already_pending: false,
            scheduled_deletion_at: row.scheduled_deletion_at,
        },
        // A concurrent request won the insert; answer with its schedule.
        None => {
            let row = get_takedown_request(pool, source_id)
                .await?
                .ok_or(DbError::NotFound)?;
            TakedownReceipt {
                source_id: source_id.to_string(),
                already_pending: true,
                scheduled_deletion_at: row.scheduled_deletion_at,
            }
        }
    };

    if !receipt.already_pending {
        tracing::info!(
            source_id,
            reason,
            scheduled_deletion_at = %receipt.scheduled_deletion_at,
            "takedown accepted"
        );
        notifier
            .send(
                Severity::Warning,
                "takedown request accepted",
                serde_json::json!({
                    "source_id": source_id,
                    "reason": reason,
                    "scheduled_deletion_at": receipt.scheduled_deletion_at,
                }),
            )
            .await;
    }

    Ok(Some(receipt))
}

/// Executes every takedown whose deletion deadline has passed.
///
/// Returns the number of takedowns completed this sweep. A delete the
/// target refuses is logged and left for the next sweep; everything else
/// in the batch still proceeds.
///
/// # Errors
///
/// Returns [`PipelineError::Db`] if the due list cannot be read.
pub async fn execute_due_takedowns(
    pool: &PgPool,
    ghost: &GhostClient,
    now: DateTime<Utc>,
) -> Result<u32, PipelineError> {
    let due = list_due_takedowns(pool, now).await?;
    let mut executed = 0;

    for request in due {
        match execute_one(pool, ghost, &request.source_id, request.id, request.scheduled_deletion_at, now).await {
            Ok(()) => executed += 1,
            Err(e) => {
                tracing::error!(
                    source_id = %request.source_id,
                    error = %e,
                    "takedown execution failed, will retry next sweep"
                );
            }
        }
    }

    if executed > 0 {
        tracing::info!(executed, "takedown sweep finished");
    }
    Ok(executed)
}

async fn execute_one(
    pool: &PgPool,
    ghost: &GhostClient,
    source_id: &str,
    request_id: i64,
    scheduled_deletion_at: DateTime<Utc>,
    now: DateTime<Utc>,
) -> Result<(), PipelineError> {
    if let Some(item) = get_content_item(pool, source_id).await? {
        if let Some(publish_ref) = item.publish_ref.as_deref() {
            // A 404 from the target is success; anything else aborts this
            // entry and leaves it due.
            ghost.delete_post(publish_ref).await?;
        }
    }

    transition_takedown_status(
        pool,
        source_id,
        TakedownStatus::TakedownPending,
        TakedownStatus::Removed,
    )
    .await?;

    // The audit is strict: execution any time past the deadline is a miss.
    let sla_met = now <= scheduled_deletion_at;
    mark_takedown_executed(pool, request_id, now, sla_met).await?;

    tracing::info!(source_id, sla_met, "takedown executed");
    Ok(())
}
