//! Publish stage: push an enriched item to the publishing target.
//!
//! The create/update/skip decision is made from local state before any
//! network call. The takedown status is checked twice around the call:
//! once before, so a takedown accepted while the task sat queued
//! suppresses the call entirely, and once after, so one that landed
//! mid-flight gets its post pulled back down. A target ref is minted at
//! most once per item; updates reuse it.

use sqlx::PgPool;

use pubflow_db::{
    get_content_item, get_takedown_status, set_published, ContentItemRow, DbError, TakedownStatus,
};
use pubflow_ghost::{GhostClient, GhostError, PostDraft, PublishRef};

use crate::error::classify_ghost;
use crate::idempotency::{self, PublishAction};
use crate::notify::{Notifier, Severity};
use crate::stages::{StageContext, StageOutcome};

/// Runs the publish stage for one item.
pub async fn run(ctx: &StageContext, source_id: &str) -> StageOutcome {
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
            "skipping publish for a non-active item"
        );
        return StageOutcome::Done;
    }

    let Some(content_hash) = item.content_hash.clone() else {
        return StageOutcome::Fatal {
            message: format!("item {source_id} reached publish without an enrichment fingerprint"),
        };
    };

    let action = idempotency::decide(
        item.published_hash.as_deref(),
        &content_hash,
        item.publish_ref.is_some(),
    );

    if action == PublishAction::Skip {
        tracing::info!(source_id, "content unchanged since last publish, skipping");
        return StageOutcome::Done;
    }

    // Last-moment re-check: a takedown accepted after this task was queued
    // must suppress the outbound call.
    match get_takedown_status(&ctx.pool, source_id).await {
        Ok(Some(TakedownStatus::Active)) => {}
        Ok(_) => {
            tracing::info!(source_id, "takedown arrived while queued, publish suppressed");
            return StageOutcome::Done;
        }
        Err(e) => return StageOutcome::from_db_error(&e),
    }

    let draft = build_draft(&item);

    let call = match action {
        PublishAction::Create => ctx.ghost.create_post(&draft).await,
        PublishAction::Update => match item.publish_ref.as_deref() {
            Some(publish_ref) => ctx.ghost.update_post(publish_ref, &draft).await,
            None => {
                return StageOutcome::Fatal {
                    message: format!("update decided for {source_id} without a publish ref"),
                }
            }
        },
        PublishAction::Skip => return StageOutcome::Done,
    };

    let publish_ref = match call {
        Ok(publish_ref) => publish_ref,
        Err(e) => return ghost_outcome(&e),
    };

    finalize(
        &ctx.pool,
        &ctx.ghost,
        &ctx.notifier,
        source_id,
        action,
        &publish_ref,
        &content_hash,
    )
    .await
}

/// Records the minted ref, then re-checks the takedown status once more.
///
/// The ref write comes first unconditionally: the deletion sweep needs it
/// to erase the post, so losing it is worse than briefly leaving a
/// taken-down item visible. A takedown that landed during the outbound
/// call gets a best-effort unpublish here; the sweep's deferred deletion
/// is the guarantee either way.
async fn finalize(
    pool: &PgPool,
    ghost: &GhostClient,
    notifier: &Notifier,
    source_id: &str,
    action: PublishAction,
    publish_ref: &PublishRef,
    content_hash: &str,
) -> StageOutcome {
    if let Err(e) = set_published(
        pool,
        source_id,
        &publish_ref.id,
        publish_ref.url.as_deref(),
        content_hash,
    )
    .await
    {
        return persist_failure_outcome(notifier, source_id, action, publish_ref, &e).await;
    }

    match get_takedown_status(pool, source_id).await {
        Ok(Some(status)) if status != TakedownStatus::Active => {
            tracing::warn!(
                source_id,
                publish_ref = %publish_ref.id,
                status = status.as_str(),
                "takedown arrived mid-publish, pulling the post back down"
            );
            if let Err(e) = ghost.unpublish_post(&publish_ref.id).await {
                tracing::warn!(
                    source_id,
                    error = %e,
                    "unpublish after mid-publish takedown failed; deferred deletion will still run"
                );
            }
            return StageOutcome::Done;
        }
        Ok(_) => {}
        // The ref is already recorded; the sweep stays authoritative.
        Err(e) => {
            tracing::warn!(source_id, error = %e, "takedown re-check failed after publish");
        }
    }

    tracing::info!(
        source_id,
        publish_ref = %publish_ref.id,
        action = ?action,
        "item published"
    );
    StageOutcome::Done
}

fn ghost_outcome(err: &GhostError) -> StageOutcome {
    StageOutcome::from_class(classify_ghost(err), err.to_string())
}

/// The target call succeeded but the ref write failed. Retrying a create
/// would mint a second post, so that case halts for an operator; an update
/// is safe to retry.
async fn persist_failure_outcome(
    notifier: &Notifier,
    source_id: &str,
    action: PublishAction,
    publish_ref: &PublishRef,
    err: &DbError,
) -> StageOutcome {
    match action {
        PublishAction::Create => {
            tracing::error!(
                source_id,
                publish_ref = %publish_ref.id,
                error = %err,
                "publish ref could not be recorded after create; halting to avoid a duplicate post"
            );
            notifier
                .send(
                    Severity::Critical,
                    "publish ref lost after create",
                    serde_json::json!({
                        "source_id": source_id,
                        "publish_ref": publish_ref.id,
                        "error": err.to_string(),
                    }),
                )
                .await;
            StageOutcome::Fatal {
                message: format!(
                    "created post {} but failed to record the ref: {err}",
                    publish_ref.id
                ),
            }
        }
        _ => StageOutcome::from_db_error(err),
    }
}

/// Renders the published artefact: summary lead-in, body paragraphs, then
/// media links, all HTML-escaped.
fn build_draft(item: &ContentItemRow) -> PostDraft {
    let mut html = String::new();

    if let Some(summary) = item.summary.as_deref().filter(|s| !s.trim().is_empty()) {
        html.push_str("<p><em>");
        html.push_str(&escape_html(summary));
        html.push_str("</em></p>\n");
    }

    for paragraph in item.body.split("\n\n").filter(|p| !p.trim().is_empty()) {
        html.push_str("<p>");
        html.push_str(&escape_html(paragraph));
        html.push_str("</p>\n");
    }

    for url in item.media_url_list() {
        let escaped = escape_html(&url);
        html.push_str(&format!("<p><a href=\"{escaped}\">{escaped}</a></p>\n"));
    }

    let tags = item
        .tags
        .as_ref()
        .and_then(|v| v.as_array())
        .map(|tags| {
            tags.iter()
                .filter_map(|t| t.as_str().map(ToOwned::to_owned))
                .collect()
        })
        .unwrap_or_default();

    PostDraft {
        title: item.title.clone(),
        html,
        tags,
    }
}

fn escape_html(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}
