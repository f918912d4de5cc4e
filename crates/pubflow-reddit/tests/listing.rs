//! Integration tests for `RedditClient` against a wiremock server.
//!
//! Covers token exchange, listing fetch/normalisation, pagination cursors,
//! and 429 handling with and without a `Retry-After` header.

use serde_json::json;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use pubflow_reddit::{RedditClient, RedditError};

/// Mounts a successful token-exchange mock and builds a client against the
/// server.
async fn client_for(server: &MockServer) -> RedditClient {
    Mock::given(method("POST"))
        .and(path("/api/v1/access_token"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(&json!({"access_token": "test-token"})),
        )
        .mount(server)
        .await;

    RedditClient::with_base_urls(
        "id",
        "secret",
        "pubflow-test/0.1",
        5,
        &server.uri(),
        &server.uri(),
    )
    .await
    .expect("failed to build test RedditClient")
}

fn listing_json(ids: &[&str], after: Option<&str>) -> serde_json::Value {
    let children: Vec<serde_json::Value> = ids
        .iter()
        .map(|id| {
            json!({
                "data": {
                    "name": format!("t3_{id}"),
                    "title": format!("Post {id}"),
                    "selftext": "body text",
                    "url_overridden_by_dest": format!("https://i.example.com/{id}.png"),
                    "score": 12,
                    "num_comments": 4,
                    "over_18": *id == "nsfw"
                }
            })
        })
        .collect();

    json!({"data": {"children": children, "after": after}})
}

#[tokio::test]
async fn fetch_listing_normalises_posts() {
    let server = MockServer::start().await;
    let client = client_for(&server).await;

    Mock::given(method("GET"))
        .and(path("/r/rust/new"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(&listing_json(&["a", "nsfw"], None)),
        )
        .mount(&server)
        .await;

    let page = client
        .fetch_listing("rust", 100, None)
        .await
        .expect("listing");

    assert_eq!(page.posts.len(), 2);
    assert_eq!(page.posts[0].id, "t3_a");
    assert_eq!(page.posts[0].title, "Post a");
    assert_eq!(page.posts[0].media_urls, vec!["https://i.example.com/a.png"]);
    assert!(!page.posts[0].nsfw);
    assert!(page.posts[1].nsfw);
    assert!(page.after.is_none());
}

#[tokio::test]
async fn fetch_listing_passes_pagination_cursor() {
    let server = MockServer::start().await;
    let client = client_for(&server).await;

    Mock::given(method("GET"))
        .and(path("/r/rust/new"))
        .and(query_param("after", "t3_cursor"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(&listing_json(&["b"], Some("t3_next"))),
        )
        .mount(&server)
        .await;

    let page = client
        .fetch_listing("rust", 100, Some("t3_cursor"))
        .await
        .expect("listing");

    assert_eq!(page.posts.len(), 1);
    assert_eq!(page.after.as_deref(), Some("t3_next"));
}

#[tokio::test]
async fn rate_limit_response_carries_retry_after_hint() {
    let server = MockServer::start().await;
    let client = client_for(&server).await;

    Mock::given(method("GET"))
        .and(path("/r/rust/new"))
        .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "17"))
        .mount(&server)
        .await;

    let err = client.fetch_listing("rust", 100, None).await.unwrap_err();
    assert!(
        matches!(err, RedditError::RateLimited { retry_after_secs: 17 }),
        "expected RateLimited with hint, got: {err:?}"
    );
}

#[tokio::test]
async fn rate_limit_without_header_defaults_to_sixty_seconds() {
    let server = MockServer::start().await;
    let client = client_for(&server).await;

    Mock::given(method("GET"))
        .and(path("/r/rust/new"))
        .respond_with(ResponseTemplate::new(429))
        .mount(&server)
        .await;

    let err = client.fetch_listing("rust", 100, None).await.unwrap_err();
    assert!(matches!(
        err,
        RedditError::RateLimited { retry_after_secs: 60 }
    ));
}

#[tokio::test]
async fn server_error_is_an_unexpected_status() {
    let server = MockServer::start().await;
    let client = client_for(&server).await;

    Mock::given(method("GET"))
        .and(path("/r/rust/new"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let err = client.fetch_listing("rust", 100, None).await.unwrap_err();
    assert!(matches!(
        err,
        RedditError::UnexpectedStatus { status: 503, .. }
    ));
}

#[tokio::test]
async fn malformed_body_is_a_deserialize_error() {
    let server = MockServer::start().await;
    let client = client_for(&server).await;

    Mock::given(method("GET"))
        .and(path("/r/rust/new"))
        .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
        .mount(&server)
        .await;

    let err = client.fetch_listing("rust", 100, None).await.unwrap_err();
    assert!(matches!(err, RedditError::Deserialize { .. }));
}

#[tokio::test]
async fn failed_token_exchange_is_an_auth_error() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/v1/access_token"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let err = RedditClient::with_base_urls(
        "id",
        "bad-secret",
        "pubflow-test/0.1",
        5,
        &server.uri(),
        &server.uri(),
    )
    .await
    .unwrap_err();

    assert!(matches!(err, RedditError::Auth { .. }));
}
