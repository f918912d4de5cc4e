//! Process stage: enrich one item and hand it to the publish queue.
//!
//! Token accounting is exact: whatever the enrichment service reports as
//! consumed is charged, including for replies that fail the quality
//! contract. A quality failure triggers one attempt against the fallback
//! model; a second quality failure is final. Redelivered tasks whose item
//! is already enriched skip the model entirely and only re-enqueue.

use chrono::{NaiveDate, Utc};

use pubflow_core::Quota;
use pubflow_db::{get_content_item, set_enrichment, DbError, TakedownStatus};
use pubflow_enrich::{EnrichError, Enrichment};

use crate::budget::Admission;
use crate::error::classify_enrich;
use crate::idempotency::content_fingerprint;
use crate::stages::{StageContext, StageOutcome};
use crate::task::{self, TaskPayload};

enum ModelFailure {
    /// The reply violated the quality contract; the fallback may do better.
    Quality(String),
    /// Anything else; already folded into an outcome.
    Outcome(StageOutcome),
}

/// Runs the process stage for one item against the `quota_day` token
/// budget.
pub async fn run(ctx: &StageContext, source_id: &str, quota_day: NaiveDate) -> StageOutcome {
    let item = match get_content_item(&ctx.pool, source_id).await {
        Ok(Some(item)) => item,
        Ok(None) => {
            return StageOutcome::Fatal {
                message: format!("no content item for source_id {source_id}"),
            }
        }
        Err(e) => return StageOutcome::from_db_error(&e),
    };

    if item.takedown_status() != TakedownStatus::Active {
        tracing::info!(
            source_id,
            status = %item.takedown_status,
            "skipping enrichment for a non-active item"
        );
        return StageOutcome::Done;
    }

    let fingerprint = content_fingerprint(&item.title, &item.body, &item.media_url_list());

    // Redelivery after a crash between the enrichment write and the
    // enqueue: the work is done, only the hand-off is missing.
    if item.summary.is_some() && item.content_hash.as_deref() == Some(fingerprint.as_str()) {
        tracing::info!(source_id, "item already enriched, re-enqueueing publish only");
        return enqueue_publish(ctx, source_id).await;
    }

    match ctx.gate.admit(Quota::Tokens, quota_day).await {
        Ok(Admission::Admitted) => {}
        Ok(Admission::Blocked { quota, resume_at }) => {
            return StageOutcome::Blocked { quota, resume_at }
        }
        Err(e) => return StageOutcome::from_db_error(&e),
    }

    let enrichment = match try_model(
        ctx,
        &item.title,
        &item.body,
        &ctx.config.enrich_primary_model,
        quota_day,
    )
    .await
    {
        Ok(enrichment) => enrichment,
        Err(ModelFailure::Outcome(outcome)) => return outcome,
        Err(ModelFailure::Quality(primary_reason)) => {
            tracing::warn!(
                source_id,
                model = %ctx.config.enrich_primary_model,
                reason = %primary_reason,
                "primary model failed the quality contract, trying fallback"
            );
            match try_model(
                ctx,
                &item.title,
                &item.body,
                &ctx.config.enrich_fallback_model,
                quota_day,
            )
            .await
            {
                Ok(enrichment) => enrichment,
                Err(ModelFailure::Outcome(outcome)) => return outcome,
                Err(ModelFailure::Quality(fallback_reason)) => {
                    return StageOutcome::Fatal {
                        message: format!(
                            "both models failed the quality contract \
                             (primary: {primary_reason}; fallback: {fallback_reason})"
                        ),
                    }
                }
            }
        }
    };

    if let Err(e) = set_enrichment(
        &ctx.pool,
        source_id,
        &enrichment.summary,
        &enrichment.tags,
        &enrichment.analysis,
        &fingerprint,
    )
    .await
    {
        return match e {
            DbError::NotFound => StageOutcome::Fatal {
                message: format!("content item {source_id} vanished before enrichment write"),
            },
            other => StageOutcome::from_db_error(&other),
        };
    }

    tracing::info!(
        source_id,
        tags = enrichment.tags.len(),
        "item enriched"
    );
    enqueue_publish(ctx, source_id).await
}

async fn enqueue_publish(ctx: &StageContext, source_id: &str) -> StageOutcome {
    let payload = TaskPayload::Publish {
        source_id: source_id.to_string(),
    };
    match task::enqueue(&ctx.pool, &payload, Utc::now()).await {
        Ok(_) => StageOutcome::Done,
        Err(e) => StageOutcome::Retry {
            class: crate::retry::ErrorClass::Transient,
            message: format!("failed to enqueue publish task: {e}"),
        },
    }
}

/// One model attempt. Charges reported token usage whether or not the
/// reply passed the quality check.
async fn try_model(
    ctx: &StageContext,
    title: &str,
    body: &str,
    model: &str,
    quota_day: NaiveDate,
) -> Result<Enrichment, ModelFailure> {
    match ctx.enrich.enrich(title, body, model).await {
        Ok(result) => {
            charge_tokens(ctx, quota_day, result.tokens_used).await?;
            Ok(result.enrichment)
        }
        Err(EnrichError::Quality {
            reason,
            tokens_used,
        }) => {
            charge_tokens(ctx, quota_day, tokens_used).await?;
            Err(ModelFailure::Quality(reason))
        }
        Err(e) => Err(ModelFailure::Outcome(StageOutcome::from_class(
            classify_enrich(&e),
            e.to_string(),
        ))),
    }
}

async fn charge_tokens(
    ctx: &StageContext,
    quota_day: NaiveDate,
    tokens_used: i64,
) -> Result<(), ModelFailure> {
    if tokens_used <= 0 {
        return Ok(());
    }
    ctx.gate
        .spend(Quota::Tokens, quota_day, tokens_used)
        .await
        .map(|_| ())
        .map_err(|e| ModelFailure::Outcome(StageOutcome::from_db_error(&e)))
}
