//! Collect stage: page through a subreddit listing and ingest new posts.
//!
//! Every listing fetch passes three gates in order: budget admission, the
//! token bucket, then the request itself, with the spend recorded after
//! the response. Ingestion is idempotent on `source_id`, so a re-run after
//! a partial pass (budget block, crash) only adds what is missing.

use chrono::{NaiveDate, Utc};
use sqlx::PgPool;

use pubflow_core::Quota;
use pubflow_db::{insert_content_item, refresh_collection_stats, DbError, NewContentItem};
use pubflow_reddit::{RawPost, RedditClient, RedditError};

use crate::budget::Admission;
use crate::error::classify_reddit;
use crate::stages::{StageContext, StageOutcome};
use crate::task::{self, TaskPayload};

#[derive(Debug, Default, Clone, Copy)]
struct IngestStats {
    created: u32,
    refreshed: u32,
    skipped_nsfw: u32,
}

impl IngestStats {
    fn absorb(&mut self, other: IngestStats) {
        self.created += other.created;
        self.refreshed += other.refreshed;
        self.skipped_nsfw += other.skipped_nsfw;
    }
}

/// Runs one collection pass over `subreddit` against the `quota_day`
/// budget.
pub async fn run(ctx: &StageContext, subreddit: &str, quota_day: NaiveDate) -> StageOutcome {
    let client = match RedditClient::with_base_urls(
        &ctx.config.reddit_client_id,
        &ctx.config.reddit_client_secret,
        &ctx.config.reddit_user_agent,
        ctx.config.http_request_timeout_secs,
        &ctx.reddit_auth_base_url,
        &ctx.reddit_api_base_url,
    )
    .await
    {
        Ok(client) => client,
        Err(e) => return reddit_outcome(ctx, &e).await,
    };

    let mut stats = IngestStats::default();
    let mut after: Option<String> = None;

    for _ in 0..ctx.config.reddit_max_pages {
        match ctx.gate.admit(Quota::Calls, quota_day).await {
            Ok(Admission::Admitted) => {}
            Ok(Admission::Blocked { quota, resume_at }) => {
                // Work ingested so far is kept; the re-run refetches from
                // page one and the idempotent insert skips it.
                tracing::info!(
                    subreddit,
                    created = stats.created,
                    "collection blocked mid-pass by the daily budget"
                );
                return StageOutcome::Blocked { quota, resume_at };
            }
            Err(e) => return StageOutcome::from_db_error(&e),
        }

        ctx.bucket.acquire().await;

        let page = match client
            .fetch_listing(subreddit, ctx.config.reddit_page_size, after.as_deref())
            .await
        {
            Ok(page) => page,
            Err(e) => return reddit_outcome(ctx, &e).await,
        };

        if let Err(e) = ctx.gate.spend(Quota::Calls, quota_day, 1).await {
            return StageOutcome::from_db_error(&e);
        }

        match ingest_page(&ctx.pool, &page.posts).await {
            Ok(page_stats) => stats.absorb(page_stats),
            Err(e) => return StageOutcome::from_db_error(&e),
        }

        after = page.after;
        if after.is_none() {
            break;
        }
    }

    tracing::info!(
        subreddit,
        created = stats.created,
        refreshed = stats.refreshed,
        skipped_nsfw = stats.skipped_nsfw,
        "collection pass finished"
    );
    StageOutcome::Done
}

async fn reddit_outcome(ctx: &StageContext, err: &RedditError) -> StageOutcome {
    if let RedditError::RateLimited { retry_after_secs } = err {
        // Feed the upstream hint into the shared limiter so sibling runs
        // back off too, not just this task's retry.
        ctx.bucket
            .apply_cooldown(std::time::Duration::from_secs(*retry_after_secs))
            .await;
    }
    StageOutcome::from_class(classify_reddit(err), err.to_string())
}

/// Ingests one page of posts: filtered posts are dropped, new posts are
/// written and handed to the process queue, known posts only get their
/// volatile stats refreshed.
async fn ingest_page(pool: &PgPool, posts: &[RawPost]) -> Result<IngestStats, DbError> {
    let mut stats = IngestStats::default();
    let today = Utc::now().date_naive();

    for post in posts {
        if post.nsfw {
            stats.skipped_nsfw += 1;
            continue;
        }

        let item = NewContentItem {
            source_id: post.id.clone(),
            title: post.title.clone(),
            body: post.body.clone(),
            media_urls: post.media_urls.clone(),
            score: post.score,
            comment_count: post.comment_count,
        };

        if insert_content_item(pool, &item).await? {
            stats.created += 1;
            // The item row exists before the task that reads it.
            let payload = TaskPayload::Process {
                source_id: post.id.clone(),
                quota_day: today,
            };
            if let Err(e) = task::enqueue(pool, &payload, Utc::now()).await {
                tracing::error!(
                    source_id = %post.id,
                    error = %e,
                    "failed to enqueue process task; item stays unprocessed until re-collected"
                );
            }
        } else {
            refresh_collection_stats(pool, &post.id, post.score, post.comment_count).await?;
            stats.refreshed += 1;
        }
    }

    Ok(stats)
}
