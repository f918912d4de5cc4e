//! Request middleware for the gateway: request ids, bearer auth, and a
//! fixed-window rate limit. Errors are emitted in the same envelope the
//! API handlers use, carrying the request id assigned on the way in.

use std::{
    collections::HashSet,
    sync::{Arc, Mutex},
    time::{Duration, Instant},
};

use axum::{
    extract::{Request, State},
    http::{header::AUTHORIZATION, HeaderMap, HeaderValue},
    middleware::Next,
    response::{IntoResponse, Response},
};
use uuid::Uuid;

use pubflow_core::AppConfig;

use crate::api::ApiError;

/// Newtype wrapping a request ID string, stored as a request extension.
#[derive(Debug, Clone)]
pub struct RequestId(pub String);

/// Bearer-auth policy, built from the configured key set.
#[derive(Debug, Clone)]
pub struct AuthState {
    api_keys: Arc<HashSet<String>>,
}

impl AuthState {
    /// An empty key set disables auth entirely; the config loader refuses
    /// that combination in production, so here it only needs a warning.
    #[must_use]
    pub fn new(config: &AppConfig) -> Self {
        if config.api_keys.is_empty() {
            tracing::warn!(
                env = %config.env,
                "no API keys configured; bearer auth is disabled"
            );
        }
        Self {
            api_keys: Arc::new(config.api_keys.iter().cloned().collect()),
        }
    }

    #[must_use]
    pub fn enabled(&self) -> bool {
        !self.api_keys.is_empty()
    }

    /// Whether the request's `Authorization` header carries a known key.
    fn authorizes(&self, headers: &HeaderMap) -> bool {
        bearer_token(headers).is_some_and(|token| self.api_keys.contains(token))
    }
}

/// Fixed-window limiter protecting the control-plane endpoints.
#[derive(Debug, Clone)]
pub struct RateLimitState {
    max_requests: usize,
    window: Duration,
    inner: Arc<Mutex<Window>>,
}

#[derive(Debug)]
struct Window {
    opened_at: Instant,
    served: usize,
}

impl RateLimitState {
    #[must_use]
    pub fn new(max_requests: usize, window: Duration) -> Self {
        Self {
            max_requests,
            window,
            inner: Arc::new(Mutex::new(Window {
                opened_at: Instant::now(),
                served: 0,
            })),
        }
    }

    /// Counts one request against the current window, rolling the window
    /// over first if it has expired. Returns `false` when the window is
    /// already full.
    fn try_admit(&self) -> bool {
        let Ok(mut window) = self.inner.lock() else {
            // A poisoned lock means a panic mid-count; failing open keeps
            // the control plane reachable.
            return true;
        };

        if window.opened_at.elapsed() >= self.window {
            window.opened_at = Instant::now();
            window.served = 0;
        }

        if window.served >= self.max_requests {
            return false;
        }
        window.served += 1;
        true
    }
}

/// Axum middleware that extracts or generates a request ID.
///
/// An incoming `x-request-id` header is honoured; otherwise a new `UUIDv4`
/// is generated. The ID lands in request extensions as [`RequestId`] and
/// is echoed on the response header.
pub async fn request_id(mut req: Request, next: Next) -> Response {
    let id = req
        .headers()
        .get("x-request-id")
        .and_then(|v| v.to_str().ok())
        .map_or_else(|| Uuid::new_v4().to_string(), String::from);

    req.extensions_mut().insert(RequestId(id.clone()));

    let mut res = next.run(req).await;
    if let Ok(value) = HeaderValue::from_str(&id) {
        res.headers_mut().insert("x-request-id", value);
    }
    res
}

/// Middleware enforcing bearer auth when any key is configured.
pub async fn require_bearer_auth(
    State(auth): State<AuthState>,
    req: Request,
    next: Next,
) -> Response {
    if !auth.enabled() || auth.authorizes(req.headers()) {
        return next.run(req).await;
    }

    ApiError::new(
        extension_request_id(&req),
        "unauthorized",
        "missing or invalid bearer token",
    )
    .into_response()
}

/// Middleware enforcing the fixed request-per-window limit.
pub async fn enforce_rate_limit(
    State(rate_limit): State<RateLimitState>,
    req: Request,
    next: Next,
) -> Response {
    if rate_limit.try_admit() {
        return next.run(req).await;
    }

    ApiError::new(
        extension_request_id(&req),
        "rate_limited",
        "rate limit exceeded",
    )
    .into_response()
}

/// The id assigned by [`request_id`]; that layer wraps the whole app, so a
/// miss only happens in tests exercising a middleware in isolation.
fn extension_request_id(req: &Request) -> String {
    req.extensions()
        .get::<RequestId>()
        .map_or_else(|| "unknown".to_string(), |id| id.0.clone())
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .filter(|s| !s.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::header;

    fn headers_with_auth(value: &'static str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static(value));
        headers
    }

    fn auth_with_keys(keys: &[&str]) -> AuthState {
        AuthState {
            api_keys: Arc::new(keys.iter().map(ToString::to_string).collect()),
        }
    }

    #[test]
    fn bearer_token_accepts_valid_header() {
        let headers = headers_with_auth("Bearer test-token");
        assert_eq!(bearer_token(&headers), Some("test-token"));
    }

    #[test]
    fn bearer_token_rejects_non_bearer_header() {
        let headers = headers_with_auth("Basic abc123");
        assert_eq!(bearer_token(&headers), None);
    }

    #[test]
    fn auth_disabled_without_keys_and_rejects_unknown_tokens() {
        assert!(!auth_with_keys(&[]).enabled());

        let auth = auth_with_keys(&["good-key"]);
        assert!(auth.enabled());
        assert!(auth.authorizes(&headers_with_auth("Bearer good-key")));
        assert!(!auth.authorizes(&headers_with_auth("Bearer bad-key")));
        assert!(!auth.authorizes(&HeaderMap::new()));
    }

    #[test]
    fn rate_limit_window_fills_and_rolls_over() {
        let limit = RateLimitState::new(2, Duration::from_millis(10));
        assert!(limit.try_admit());
        assert!(limit.try_admit());
        assert!(!limit.try_admit());

        std::thread::sleep(Duration::from_millis(15));
        assert!(limit.try_admit());
    }
}
