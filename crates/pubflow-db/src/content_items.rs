//! Database operations for `content_items`.
//!
//! A content item is created by the collect stage on first sight of a new
//! `source_id`, enriched by the process stage, and given its `publish_ref`
//! by the publish stage. Takedown transitions are forward-only and enforced
//! here with guarded UPDATEs.

use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use sqlx::PgPool;

use crate::DbError;

/// Takedown lifecycle of a content item. Transitions only move forward
/// (`Active → TakedownPending → Removed`); `Removed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TakedownStatus {
    Active,
    TakedownPending,
    Removed,
}

impl TakedownStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            TakedownStatus::Active => "active",
            TakedownStatus::TakedownPending => "takedown_pending",
            TakedownStatus::Removed => "removed",
        }
    }

    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "active" => Some(TakedownStatus::Active),
            "takedown_pending" => Some(TakedownStatus::TakedownPending),
            "removed" => Some(TakedownStatus::Removed),
            _ => None,
        }
    }
}

/// A row from the `content_items` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ContentItemRow {
    pub id: i64,
    pub source_id: String,
    pub title: String,
    pub body: String,
    /// JSON array of media URL strings.
    pub media_urls: Value,
    pub score: i64,
    pub comment_count: i64,
    pub summary: Option<String>,
    pub tags: Option<Value>,
    pub analysis: Option<Value>,
    /// Current fingerprint over (title, body, sorted media urls).
    pub content_hash: Option<String>,
    /// Fingerprint at the time of the last successful publish.
    pub published_hash: Option<String>,
    pub publish_ref: Option<String>,
    pub publish_url: Option<String>,
    pub takedown_status: String,
    pub last_error: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ContentItemRow {
    /// Typed view of `takedown_status`. Defaults to `Removed` for an
    /// unrecognised value so a corrupt row can never be re-published.
    #[must_use]
    pub fn takedown_status(&self) -> TakedownStatus {
        TakedownStatus::parse(&self.takedown_status).unwrap_or(TakedownStatus::Removed)
    }

    /// Media URLs as owned strings, dropping any non-string entries.
    #[must_use]
    pub fn media_url_list(&self) -> Vec<String> {
        self.media_urls
            .as_array()
            .map(|urls| {
                urls.iter()
                    .filter_map(|u| u.as_str().map(ToOwned::to_owned))
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// Fields written when the collect stage first sees a `source_id`.
#[derive(Debug, Clone)]
pub struct NewContentItem {
    pub source_id: String,
    pub title: String,
    pub body: String,
    pub media_urls: Vec<String>,
    pub score: i64,
    pub comment_count: i64,
}

/// Inserts a new content item; a colliding `source_id` is left untouched.
///
/// Returns `true` if a row was created, `false` if the id was already
/// collected. Collisions never overwrite.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the insert fails.
pub async fn insert_content_item(pool: &PgPool, item: &NewContentItem) -> Result<bool, DbError> {
    let result = sqlx::query(
        "INSERT INTO content_items \
             (source_id, title, body, media_urls, score, comment_count) \
         VALUES ($1, $2, $3, $4::jsonb, $5, $6) \
         ON CONFLICT (source_id) DO NOTHING",
    )
    .bind(&item.source_id)
    .bind(&item.title)
    .bind(&item.body)
    .bind(json!(item.media_urls))
    .bind(item.score)
    .bind(item.comment_count)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() == 1)
}

/// Refreshes `score` and `comment_count` for an already-collected item.
///
/// These fields are only ever written at collection time.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the update fails.
pub async fn refresh_collection_stats(
    pool: &PgPool,
    source_id: &str,
    score: i64,
    comment_count: i64,
) -> Result<(), DbError> {
    sqlx::query(
        "UPDATE content_items \
         SET score = $2, comment_count = $3, updated_at = NOW() \
         WHERE source_id = $1",
    )
    .bind(source_id)
    .bind(score)
    .bind(comment_count)
    .execute(pool)
    .await?;

    Ok(())
}

/// Fetches one content item by `source_id`.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn get_content_item(
    pool: &PgPool,
    source_id: &str,
) -> Result<Option<ContentItemRow>, DbError> {
    let row = sqlx::query_as::<_, ContentItemRow>(
        "SELECT * FROM content_items WHERE source_id = $1",
    )
    .bind(source_id)
    .fetch_optional(pool)
    .await?;

    Ok(row)
}

/// Persists the process stage's output: summary, tags, structured analysis,
/// and the content fingerprint.
///
/// # Errors
///
/// Returns [`DbError::NotFound`] if the item does not exist, or
/// [`DbError::Sqlx`] if the update fails.
pub async fn set_enrichment(
    pool: &PgPool,
    source_id: &str,
    summary: &str,
    tags: &[String],
    analysis: &Value,
    content_hash: &str,
) -> Result<(), DbError> {
    let result = sqlx::query(
        "UPDATE content_items \
         SET summary = $2, tags = $3::jsonb, analysis = $4::jsonb, \
             content_hash = $5, updated_at = NOW() \
         WHERE source_id = $1",
    )
    .bind(source_id)
    .bind(summary)
    .bind(json!(tags))
    .bind(analysis)
    .bind(content_hash)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::NotFound);
    }
    Ok(())
}

/// Persists the publish stage's output after a successful target call.
///
/// Records the assigned `publish_ref`/`publish_url` and snapshots the
/// fingerprint that was published.
///
/// # Errors
///
/// Returns [`DbError::NotFound`] if the item does not exist, or
/// [`DbError::Sqlx`] if the update fails.
pub async fn set_published(
    pool: &PgPool,
    source_id: &str,
    publish_ref: &str,
    publish_url: Option<&str>,
    published_hash: &str,
) -> Result<(), DbError> {
    let result = sqlx::query(
        "UPDATE content_items \
         SET publish_ref = $2, publish_url = $3, published_hash = $4, \
             published_at = NOW(), last_error = NULL, updated_at = NOW() \
         WHERE source_id = $1",
    )
    .bind(source_id)
    .bind(publish_ref)
    .bind(publish_url)
    .bind(published_hash)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::NotFound);
    }
    Ok(())
}

/// Records a terminal stage failure against the item so give-ups are never
/// silently dropped.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the update fails.
pub async fn record_item_failure(
    pool: &PgPool,
    source_id: &str,
    error: &str,
) -> Result<(), DbError> {
    sqlx::query(
        "UPDATE content_items SET last_error = $2, updated_at = NOW() WHERE source_id = $1",
    )
    .bind(source_id)
    .bind(error)
    .execute(pool)
    .await?;

    Ok(())
}

/// Attempts a guarded forward transition of `takedown_status`.
///
/// Returns `true` if the row moved from `from` to `to`; `false` if the item
/// was missing or no longer in `from` (e.g. a concurrent transition won).
/// Because every caller names its expected `from` state, reverse transitions
/// cannot be expressed.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the update fails.
pub async fn transition_takedown_status(
    pool: &PgPool,
    source_id: &str,
    from: TakedownStatus,
    to: TakedownStatus,
) -> Result<bool, DbError> {
    let result = sqlx::query(
        "UPDATE content_items \
         SET takedown_status = $3, updated_at = NOW() \
         WHERE source_id = $1 AND takedown_status = $2",
    )
    .bind(source_id)
    .bind(from.as_str())
    .bind(to.as_str())
    .execute(pool)
    .await?;

    Ok(result.rows_affected() == 1)
}

/// Fetches just the takedown status of an item. Used by the publish stage's
/// pre-commit re-check.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn get_takedown_status(
    pool: &PgPool,
    source_id: &str,
) -> Result<Option<TakedownStatus>, DbError> {
    let raw: Option<String> =
        sqlx::query_scalar("SELECT takedown_status FROM content_items WHERE source_id = $1")
            .bind(source_id)
            .fetch_optional(pool)
            .await?;

    Ok(raw.map(|s| TakedownStatus::parse(&s).unwrap_or(TakedownStatus::Removed)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_item(source_id: &str) -> NewContentItem {
        NewContentItem {
            source_id: source_id.to_string(),
            title: format!("Title for {source_id}"),
            body: "A body".to_string(),
            media_urls: vec!["https://img.example.com/a.png".to_string()],
            score: 10,
            comment_count: 2,
        }
    }

    #[test]
    fn takedown_status_round_trips() {
        for status in [
            TakedownStatus::Active,
            TakedownStatus::TakedownPending,
            TakedownStatus::Removed,
        ] {
            assert_eq!(TakedownStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(TakedownStatus::parse("deleted"), None);
    }

    #[sqlx::test(migrations = "../../migrations")]
    async fn insert_is_idempotent_on_source_id(pool: PgPool) {
        let item = sample_item("abc123");
        assert!(insert_content_item(&pool, &item).await.expect("insert"));
        assert!(!insert_content_item(&pool, &item).await.expect("reinsert"));

        let row = get_content_item(&pool, "abc123")
            .await
            .expect("get")
            .expect("row");
        assert_eq!(row.title, "Title for abc123");
        assert_eq!(row.takedown_status(), TakedownStatus::Active);
    }

    #[sqlx::test(migrations = "../../migrations")]
    async fn collision_does_not_overwrite(pool: PgPool) {
        insert_content_item(&pool, &sample_item("dup1"))
            .await
            .expect("insert");

        let mut changed = sample_item("dup1");
        changed.title = "Changed title".to_string();
        assert!(!insert_content_item(&pool, &changed).await.expect("insert"));

        let row = get_content_item(&pool, "dup1")
            .await
            .expect("get")
            .expect("row");
        assert_eq!(row.title, "Title for dup1");
    }

    #[sqlx::test(migrations = "../../migrations")]
    async fn enrichment_and_publish_fields_persist(pool: PgPool) {
        insert_content_item(&pool, &sample_item("enr1"))
            .await
            .expect("insert");

        set_enrichment(
            &pool,
            "enr1",
            "A summary",
            &["one".to_string(), "two".to_string(), "three".to_string()],
            &json!({"sentiment": "positive"}),
            "deadbeef",
        )
        .await
        .expect("set_enrichment");

        set_published(&pool, "enr1", "ghost-42", Some("https://blog/p/42"), "deadbeef")
            .await
            .expect("set_published");

        let row = get_content_item(&pool, "enr1")
            .await
            .expect("get")
            .expect("row");
        assert_eq!(row.summary.as_deref(), Some("A summary"));
        assert_eq!(row.content_hash.as_deref(), Some("deadbeef"));
        assert_eq!(row.published_hash.as_deref(), Some("deadbeef"));
        assert_eq!(row.publish_ref.as_deref(), Some("ghost-42"));
        assert!(row.published_at.is_some());
    }

    #[sqlx::test(migrations = "../../migrations")]
    async fn set_enrichment_on_missing_item_is_not_found(pool: PgPool) {
        let err = set_enrichment(&pool, "ghost", "s", &[], &json!({}), "h")
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::NotFound));
    }

    #[sqlx::test(migrations = "../../migrations")]
    async fn takedown_transitions_are_forward_only(pool: PgPool) {
        insert_content_item(&pool, &sample_item("td1"))
            .await
            .expect("insert");

        assert!(transition_takedown_status(
            &pool,
            "td1",
            TakedownStatus::Active,
            TakedownStatus::TakedownPending
        )
        .await
        .expect("transition"));

        // Second attempt from `active` no longer matches.
        assert!(!transition_takedown_status(
            &pool,
            "td1",
            TakedownStatus::Active,
            TakedownStatus::TakedownPending
        )
        .await
        .expect("transition"));

        assert!(transition_takedown_status(
            &pool,
            "td1",
            TakedownStatus::TakedownPending,
            TakedownStatus::Removed
        )
        .await
        .expect("transition"));

        assert_eq!(
            get_takedown_status(&pool, "td1").await.expect("status"),
            Some(TakedownStatus::Removed)
        );
    }
}
