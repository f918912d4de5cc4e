//! Command handlers for the CLI.
//!
//! These are called from `main` after the database pool and config are
//! established. Output goes to stdout; the server's workers do the actual
//! stage execution.

use chrono::Utc;

use pubflow_core::{AppConfig, Quota};
use pubflow_pipeline::{task, Notifier, TaskPayload};

/// Enqueue one collect task per subreddit, admitted under today's quota
/// day. An empty `subreddits` falls back to the configured set.
///
/// # Errors
///
/// Returns an error if no subreddits are available or an enqueue fails.
pub(crate) async fn run_trigger(
    pool: &sqlx::PgPool,
    config: &AppConfig,
    subreddits: Vec<String>,
) -> anyhow::Result<()> {
    let subreddits = if subreddits.is_empty() {
        config.subreddits.clone()
    } else {
        subreddits
    };

    if subreddits.is_empty() {
        anyhow::bail!("no subreddits configured and none supplied; pass --subreddit");
    }

    let now = Utc::now();
    let quota_day = now.date_naive();
    let count = subreddits.len();

    for subreddit in subreddits {
        let payload = TaskPayload::Collect {
            subreddit: subreddit.clone(),
            quota_day,
        };
        let id = task::enqueue(pool, &payload, now).await?;
        println!("enqueued collect task {id} for r/{subreddit}");
    }

    println!("triggered collection for {count} subreddits");
    Ok(())
}

/// File a takedown request: unpublish now, schedule the deferred deletion.
///
/// # Errors
///
/// Returns an error if the item does not exist or the request cannot be
/// recorded.
pub(crate) async fn run_takedown(
    pool: &sqlx::PgPool,
    config: &AppConfig,
    source_id: &str,
    reason: &str,
) -> anyhow::Result<()> {
    let ghost = pubflow_ghost::GhostClient::new(
        &config.ghost_base_url,
        &config.ghost_admin_key,
        config.http_request_timeout_secs,
    )
    .map_err(|e| anyhow::anyhow!("failed to build publishing client: {e}"))?;
    let notifier = Notifier::new(
        config.notify_webhook_url.clone(),
        config.http_request_timeout_secs,
    )?;

    let receipt = pubflow_pipeline::request_takedown(
        pool,
        &ghost,
        &notifier,
        source_id,
        reason,
        config.takedown_grace_hours,
    )
    .await?
    .ok_or_else(|| anyhow::anyhow!("no content item with source_id '{source_id}'"))?;

    if receipt.already_pending {
        println!(
            "takedown for {source_id} was already pending; deletion stays scheduled at {}",
            receipt.scheduled_deletion_at
        );
    } else {
        println!(
            "takedown filed for {source_id}; deletion scheduled at {}",
            receipt.scheduled_deletion_at
        );
    }
    Ok(())
}

/// Print queue depths and budget spend, or one item's pipeline progress.
///
/// # Errors
///
/// Returns an error if a query fails or the requested item does not exist.
pub(crate) async fn run_status(
    pool: &sqlx::PgPool,
    config: &AppConfig,
    source_id: Option<&str>,
) -> anyhow::Result<()> {
    match source_id {
        Some(source_id) => print_item_status(pool, source_id).await,
        None => print_global_status(pool, config).await,
    }
}

async fn print_global_status(pool: &sqlx::PgPool, config: &AppConfig) -> anyhow::Result<()> {
    let depths = pubflow_db::queue_depths(pool).await?;
    if depths.is_empty() {
        println!("queues: empty");
    } else {
        println!("queues:");
        for row in depths {
            println!(
                "  {:<8} pending={} active={} failed={}",
                row.queue, row.pending, row.active, row.failed
            );
        }
    }

    let today = Utc::now().date_naive();
    println!("budgets ({today}):");
    for (quota, limit) in [
        (Quota::Calls, config.calls_per_day),
        (Quota::Tokens, config.tokens_per_day),
    ] {
        let total = pubflow_db::peek_budget(pool, quota, today).await?;
        println!("  {:<8} {total}/{limit}", quota.as_str());
    }
    Ok(())
}

async fn print_item_status(pool: &sqlx::PgPool, source_id: &str) -> anyhow::Result<()> {
    let item = pubflow_db::get_content_item(pool, source_id)
        .await?
        .ok_or_else(|| anyhow::anyhow!("no content item with source_id '{source_id}'"))?;

    println!("{}: {}", item.source_id, item.title);
    println!("  takedown_status: {}", item.takedown_status().as_str());
    println!("  enriched: {}", item.summary.is_some());
    match (&item.publish_ref, &item.publish_url) {
        (Some(publish_ref), Some(url)) => println!("  published: {publish_ref} ({url})"),
        (Some(publish_ref), None) => println!("  published: {publish_ref}"),
        _ => println!("  published: no"),
    }
    if let Some(error) = &item.last_error {
        println!("  last_error: {error}");
    }

    if let Some(request) = pubflow_db::get_takedown_request(pool, source_id).await? {
        println!(
            "  takedown: reason='{}' scheduled={} executed={}",
            request.reason,
            request.scheduled_deletion_at,
            request
                .executed_at
                .map_or_else(|| "pending".to_string(), |t| t.to_string()),
        );
    }

    let tasks = pubflow_db::list_tasks_for_source(pool, source_id).await?;
    if tasks.is_empty() {
        println!("  tasks: none");
    } else {
        println!("  tasks:");
        for t in tasks {
            println!(
                "    #{} {:<8} {:<8} attempt={} run_at={}",
                t.id, t.queue, t.status, t.attempt, t.run_at
            );
        }
    }
    Ok(())
}
