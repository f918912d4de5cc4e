//! Shared fixtures for the pipeline integration tests.

use std::sync::Arc;

use serde_json::json;
use sqlx::PgPool;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use pubflow_core::{AppConfig, Environment};
use pubflow_db::{insert_content_item, NewContentItem};
use pubflow_enrich::EnrichClient;
use pubflow_ghost::GhostClient;
use pubflow_pipeline::{BudgetGate, Notifier, StageContext};
use pubflow_reddit::TokenBucket;

pub struct Limits {
    pub calls_per_day: i64,
    pub tokens_per_day: i64,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            calls_per_day: 1000,
            tokens_per_day: 200_000,
        }
    }
}

pub fn test_config(reddit_uri: &str, enrich_uri: &str, ghost_uri: &str, limits: &Limits) -> AppConfig {
    AppConfig {
        database_url: "postgres://unused".to_string(),
        env: Environment::Test,
        bind_addr: "127.0.0.1:0".parse().expect("valid addr"),
        log_level: "debug".to_string(),
        db_max_connections: 5,
        db_min_connections: 1,
        db_acquire_timeout_secs: 5,
        calls_per_day: limits.calls_per_day,
        tokens_per_day: limits.tokens_per_day,
        bucket_capacity: 100,
        bucket_refill_per_sec: 100.0,
        retry_base_secs: 1,
        retry_rate_limited_base_secs: 5,
        retry_min_secs: 1,
        retry_max_secs: 60,
        max_attempts_collect: 3,
        max_attempts_process: 3,
        max_attempts_publish: 5,
        worker_poll_interval_ms: 20,
        task_lease_secs: 600,
        http_request_timeout_secs: 5,
        reddit_client_id: "test-client".to_string(),
        reddit_client_secret: "test-secret".to_string(),
        reddit_user_agent: "pubflow-tests/0.1".to_string(),
        subreddits: vec!["rust".to_string()],
        reddit_page_size: 25,
        reddit_max_pages: 3,
        enrich_base_url: enrich_uri.to_string(),
        enrich_api_key: "enrich-key".to_string(),
        enrich_primary_model: "primary-model".to_string(),
        enrich_fallback_model: "fallback-model".to_string(),
        ghost_base_url: ghost_uri.to_string(),
        ghost_admin_key: "ghost-key".to_string(),
        notify_webhook_url: None,
        api_keys: vec![],
        takedown_grace_hours: 72,
        collect_cron: "0 0 * * * *".to_string(),
    }
}

pub fn context(
    pool: PgPool,
    reddit_uri: &str,
    enrich_uri: &str,
    ghost_uri: &str,
    limits: &Limits,
) -> StageContext {
    let config = Arc::new(test_config(reddit_uri, enrich_uri, ghost_uri, limits));
    let notifier = Notifier::new(None, 5).expect("build notifier");

    StageContext {
        bucket: TokenBucket::new(config.bucket_capacity, config.bucket_refill_per_sec),
        gate: BudgetGate::new(
            pool.clone(),
            config.calls_per_day,
            config.tokens_per_day,
            notifier.clone(),
        ),
        enrich: EnrichClient::new(enrich_uri, "enrich-key", 5).expect("build enrich client"),
        ghost: GhostClient::new(ghost_uri, "ghost-key", 5).expect("build ghost client"),
        notifier,
        reddit_auth_base_url: reddit_uri.to_string(),
        reddit_api_base_url: reddit_uri.to_string(),
        config,
        pool,
    }
}

pub async fn seed_item(pool: &PgPool, source_id: &str) {
    insert_content_item(
        pool,
        &NewContentItem {
            source_id: source_id.to_string(),
            title: format!("Title {source_id}"),
            body: "A body paragraph.".to_string(),
            media_urls: vec![],
            score: 12,
            comment_count: 4,
        },
    )
    .await
    .expect("seed item");
}

/// Mounts the OAuth token-exchange mock every collection run hits first.
pub async fn mount_token_exchange(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/api/v1/access_token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "test-token",
            "token_type": "bearer",
            "expires_in": 86400,
        })))
        .mount(server)
        .await;
}

/// A one-page listing body with the given posts.
pub fn listing_body(posts: &[serde_json::Value]) -> serde_json::Value {
    json!({
        "data": {
            "children": posts.iter().map(|p| json!({"data": p})).collect::<Vec<_>>(),
            "after": null,
        }
    })
}

pub fn listing_post(id: &str, nsfw: bool) -> serde_json::Value {
    json!({
        "name": id,
        "title": format!("Post {id}"),
        "selftext": "Some text.",
        "score": 3,
        "num_comments": 1,
        "over_18": nsfw,
    })
}

/// A chat-completion envelope whose model reply passes the quality check.
pub fn enrich_reply(summary: &str, tags: &[&str], total_tokens: i64) -> serde_json::Value {
    let content = json!({
        "summary": summary,
        "tags": tags,
        "analysis": {"sentiment": "neutral", "audience": "general", "key_points": []},
    });
    json!({
        "choices": [{"message": {"content": content.to_string()}}],
        "usage": {"total_tokens": total_tokens},
    })
}

pub fn ghost_post_envelope(id: &str) -> serde_json::Value {
    json!({"posts": [{"id": id, "url": format!("https://blog.example.com/{id}/")}]})
}
