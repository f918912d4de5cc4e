mod items;
mod queues;
mod takedowns;
mod tasks;

use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::State,
    http::{header, HeaderName, Method, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Extension, Json, Router,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::PgPool;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;

use pubflow_core::AppConfig;
use pubflow_ghost::GhostClient;
use pubflow_pipeline::Notifier;

use crate::middleware::{
    enforce_rate_limit, request_id, require_bearer_auth, AuthState, RateLimitState, RequestId,
};

#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub ghost: Arc<GhostClient>,
    pub notifier: Notifier,
    pub config: Arc<AppConfig>,
}

#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub data: T,
    pub meta: ResponseMeta,
}

#[derive(Debug, Serialize)]
pub struct ResponseMeta {
    pub request_id: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct ApiError {
    pub error: ErrorBody,
    pub meta: ResponseMeta,
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
}

#[derive(Debug, Serialize, PartialEq, Eq)]
struct HealthData {
    status: &'static str,
    database: &'static str,
}

impl ResponseMeta {
    pub(super) fn new(request_id: String) -> Self {
        Self {
            request_id,
            timestamp: Utc::now(),
        }
    }
}

impl ApiError {
    pub fn new(
        request_id: impl Into<String>,
        code: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            error: ErrorBody {
                code: code.into(),
                message: message.into(),
            },
            meta: ResponseMeta::new(request_id.into()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let status = match self.error.code.as_str() {
            "not_found" => StatusCode::NOT_FOUND,
            "unauthorized" => StatusCode::UNAUTHORIZED,
            "bad_request" | "validation_error" => StatusCode::BAD_REQUEST,
            "conflict" => StatusCode::CONFLICT,
            "rate_limited" => StatusCode::TOO_MANY_REQUESTS,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(self)).into_response()
    }
}

pub(super) fn map_db_error(request_id: String, error: &pubflow_db::DbError) -> ApiError {
    tracing::error!(error = %error, "database query failed");
    ApiError::new(request_id, "internal_error", "database query failed")
}

pub(super) fn map_pipeline_error(
    request_id: String,
    error: &pubflow_pipeline::PipelineError,
) -> ApiError {
    tracing::error!(error = %error, "pipeline operation failed");
    ApiError::new(request_id, "internal_error", "pipeline operation failed")
}

fn build_cors() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([
            header::CONTENT_TYPE,
            header::AUTHORIZATION,
            HeaderName::from_static("x-request-id"),
        ])
}

fn protected_router(auth: AuthState, rate_limit: RateLimitState) -> Router<AppState> {
    Router::new()
        .route("/api/v1/tasks/trigger", post(tasks::trigger_collection))
        .route("/api/v1/queues/status", get(queues::queue_status))
        .route("/api/v1/takedowns", post(takedowns::create_takedown))
        .route("/api/v1/items/{source_id}", get(items::get_item))
        .layer(
            ServiceBuilder::new()
                .layer(axum::middleware::from_fn_with_state(
                    rate_limit,
                    enforce_rate_limit,
                ))
                .layer(axum::middleware::from_fn_with_state(
                    auth,
                    require_bearer_auth,
                )),
        )
}

pub fn build_app(state: AppState, auth: AuthState, rate_limit: RateLimitState) -> Router {
    let public_routes = Router::new().route("/api/v1/health", get(health));

    Router::new()
        .merge(public_routes)
        .merge(protected_router(auth, rate_limit))
        .layer(
            ServiceBuilder::new()
                .layer(build_cors())
                .layer(axum::middleware::from_fn(request_id)),
        )
        .with_state(state)
}

async fn health(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
) -> impl IntoResponse {
    let meta = ResponseMeta::new(req_id.0);

    match pubflow_db::health_check(&state.pool).await {
        Ok(()) => (
            StatusCode::OK,
            Json(ApiResponse {
                data: HealthData {
                    status: "ok",
                    database: "ok",
                },
                meta,
            }),
        ),
        Err(e) => {
            tracing::warn!(error = %e, "health check: database unavailable");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(ApiResponse {
                    data: HealthData {
                        status: "degraded",
                        database: "unavailable",
                    },
                    meta,
                }),
            )
        }
    }
}

pub fn default_rate_limit_state() -> RateLimitState {
    RateLimitState::new(120, Duration::from_secs(60))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use pubflow_core::Environment;
    use tower::ServiceExt;

    fn test_config() -> AppConfig {
        AppConfig {
            database_url: "postgres://unused".to_string(),
            env: Environment::Test,
            bind_addr: "127.0.0.1:0".parse().expect("valid addr"),
            log_level: "debug".to_string(),
            db_max_connections: 5,
            db_min_connections: 1,
            db_acquire_timeout_secs: 5,
            calls_per_day: 1000,
            tokens_per_day: 200_000,
            bucket_capacity: 10,
            bucket_refill_per_sec: 1.0,
            retry_base_secs: 5,
            retry_rate_limited_base_secs: 60,
            retry_min_secs: 1,
            retry_max_secs: 3600,
            max_attempts_collect: 3,
            max_attempts_process: 3,
            max_attempts_publish: 5,
            worker_poll_interval_ms: 500,
            task_lease_secs: 600,
            http_request_timeout_secs: 5,
            reddit_client_id: "id".to_string(),
            reddit_client_secret: "secret".to_string(),
            reddit_user_agent: "pubflow-tests/0.1".to_string(),
            subreddits: vec!["rust".to_string(), "programming".to_string()],
            reddit_page_size: 25,
            reddit_max_pages: 2,
            enrich_base_url: "http://127.0.0.1:9".to_string(),
            enrich_api_key: "k".to_string(),
            enrich_primary_model: "primary".to_string(),
            enrich_fallback_model: "fallback".to_string(),
            ghost_base_url: "http://127.0.0.1:9".to_string(),
            ghost_admin_key: "k".to_string(),
            notify_webhook_url: None,
            api_keys: vec![],
            takedown_grace_hours: 72,
            collect_cron: "0 0 * * * *".to_string(),
        }
    }

    fn test_state(pool: PgPool) -> AppState {
        AppState {
            pool,
            ghost: Arc::new(
                GhostClient::new("http://127.0.0.1:9", "k", 5).expect("build ghost client"),
            ),
            notifier: Notifier::new(None, 5).expect("build notifier"),
            config: Arc::new(test_config()),
        }
    }

    fn test_app(pool: PgPool) -> Router {
        let state = test_state(pool);
        let auth = AuthState::new(&state.config);
        build_app(state, auth, default_rate_limit_state())
    }

    async fn body_json(response: axum::response::Response) -> serde_json::Value {
        let body = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body bytes");
        serde_json::from_slice(&body).expect("json parse")
    }

    #[test]
    fn api_error_not_found_maps_to_404() {
        let response = ApiError::new("req-1", "not_found", "missing").into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[sqlx::test(migrations = "../../migrations")]
    async fn configured_keys_gate_the_protected_routes(pool: PgPool) {
        let mut state = test_state(pool);
        let mut config = test_config();
        config.api_keys = vec!["route-test-key".to_string()];
        state.config = Arc::new(config);
        let auth = AuthState::new(&state.config);
        let app = build_app(state, auth, default_rate_limit_state());

        // No token: rejected in the standard error envelope.
        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .uri("/api/v1/queues/status")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let json = body_json(response).await;
        assert_eq!(json["error"]["code"].as_str(), Some("unauthorized"));
        assert!(json["meta"]["request_id"].is_string());

        // Health stays public.
        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .uri("/api/v1/health")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::OK);

        // The configured key passes.
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/v1/queues/status")
                    .header("authorization", "Bearer route-test-key")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[sqlx::test(migrations = "../../migrations")]
    async fn trigger_enqueues_one_collect_task_per_subreddit(pool: PgPool) {
        let app = test_app(pool.clone());
        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/v1/tasks/trigger")
                    .header("content-type", "application/json")
                    .body(Body::from("{}"))
                    .expect("request"),
            )
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::ACCEPTED);
        let json = body_json(response).await;
        assert_eq!(json["data"]["task_ids"].as_array().map(Vec::len), Some(2));

        // Both configured subreddits landed on the collect queue.
        let mut seen = vec![];
        while let Some(task) = pubflow_db::dequeue_task(&pool, "collect")
            .await
            .expect("dequeue")
        {
            seen.push(task.payload["subreddit"].as_str().expect("subreddit").to_string());
        }
        seen.sort();
        assert_eq!(seen, vec!["programming", "rust"]);
    }

    #[sqlx::test(migrations = "../../migrations")]
    async fn trigger_accepts_an_explicit_subreddit_list(pool: PgPool) {
        let app = test_app(pool.clone());
        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/v1/tasks/trigger")
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"subreddits": ["selfhosted"]}"#))
                    .expect("request"),
            )
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::ACCEPTED);
        let task = pubflow_db::dequeue_task(&pool, "collect")
            .await
            .expect("dequeue")
            .expect("task");
        assert_eq!(task.payload["subreddit"], "selfhosted");
    }

    #[sqlx::test(migrations = "../../migrations")]
    async fn queue_status_reports_depths_and_budgets(pool: PgPool) {
        pubflow_db::enqueue_task(
            &pool,
            "process",
            &serde_json::json!({"kind": "process"}),
            1,
            Utc::now(),
        )
        .await
        .expect("enqueue");

        let app = test_app(pool);
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/v1/queues/status")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;

        let queues = json["data"]["queues"].as_array().expect("queues");
        let process = queues
            .iter()
            .find(|q| q["queue"] == "process")
            .expect("process row");
        assert_eq!(process["pending"].as_i64(), Some(1));

        let budgets = json["data"]["budgets"].as_array().expect("budgets");
        assert_eq!(budgets.len(), 2);
        let calls = budgets
            .iter()
            .find(|b| b["quota"] == "calls")
            .expect("calls row");
        assert_eq!(calls["total"].as_i64(), Some(0));
        assert_eq!(calls["limit"].as_i64(), Some(1000));
    }

    #[sqlx::test(migrations = "../../migrations")]
    async fn takedown_of_unknown_item_is_404(pool: PgPool) {
        let app = test_app(pool);
        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/v1/takedowns")
                    .header("content-type", "application/json")
                    .body(Body::from(
                        r#"{"source_id": "t3_missing", "reason": "dmca"}"#,
                    ))
                    .expect("request"),
            )
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[sqlx::test(migrations = "../../migrations")]
    async fn takedown_of_an_unpublished_item_is_accepted(pool: PgPool) {
        pubflow_db::insert_content_item(
            &pool,
            &pubflow_db::NewContentItem {
                source_id: "t3_api1".to_string(),
                title: "t".to_string(),
                body: "b".to_string(),
                media_urls: vec![],
                score: 0,
                comment_count: 0,
            },
        )
        .await
        .expect("seed");

        let app = test_app(pool.clone());
        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/v1/takedowns")
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"source_id": "t3_api1", "reason": "dmca"}"#))
                    .expect("request"),
            )
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::ACCEPTED);
        let json = body_json(response).await;
        assert_eq!(json["data"]["already_pending"].as_bool(), Some(false));

        assert_eq!(
            pubflow_db::get_takedown_status(&pool, "t3_api1")
                .await
                .expect("status"),
            Some(pubflow_db::TakedownStatus::TakedownPending)
        );
    }

    #[sqlx::test(migrations = "../../migrations")]
    async fn item_status_returns_404_for_unknown_source(pool: PgPool) {
        let app = test_app(pool);
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/v1/items/t3_missing")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[sqlx::test(migrations = "../../migrations")]
    async fn item_status_includes_tasks_and_takedown(pool: PgPool) {
        pubflow_db::insert_content_item(
            &pool,
            &pubflow_db::NewContentItem {
                source_id: "t3_api2".to_string(),
                title: "A title".to_string(),
                body: "b".to_string(),
                media_urls: vec![],
                score: 7,
                comment_count: 2,
            },
        )
        .await
        .expect("seed");
        pubflow_db::enqueue_task(
            &pool,
            "publish",
            &serde_json::json!({"kind": "publish", "source_id": "t3_api2"}),
            1,
            Utc::now(),
        )
        .await
        .expect("enqueue");

        let app = test_app(pool);
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/v1/items/t3_api2")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["data"]["title"].as_str(), Some("A title"));
        assert_eq!(json["data"]["takedown_status"].as_str(), Some("active"));
        assert!(json["data"]["takedown"].is_null());
        assert_eq!(json["data"]["tasks"].as_array().map(Vec::len), Some(1));
    }
}
