//! HTTP client for the Reddit OAuth listing API.

use std::time::Duration;

use reqwest::Client;

use crate::error::RedditError;
use crate::types::{Listing, ListingPage, TokenResponse};

/// Production token-exchange endpoint root.
pub const DEFAULT_AUTH_BASE_URL: &str = "https://www.reddit.com";
/// Production listing API root.
pub const DEFAULT_API_BASE_URL: &str = "https://oauth.reddit.com";

/// Reddit API client holding a valid access token.
///
/// Use [`RedditClient::new`] for production or
/// [`RedditClient::with_base_urls`] to point at a mock server in tests.
#[derive(Debug)]
pub struct RedditClient {
    client: Client,
    token: String,
    user_agent: String,
    api_base_url: String,
}

impl RedditClient {
    /// Creates a client by exchanging client credentials for a token against
    /// the production Reddit endpoints.
    ///
    /// # Errors
    ///
    /// Returns [`RedditError::Auth`] if token exchange fails, or
    /// [`RedditError::Http`] if the HTTP client cannot be constructed.
    pub async fn new(
        client_id: &str,
        client_secret: &str,
        user_agent: &str,
        timeout_secs: u64,
    ) -> Result<Self, RedditError> {
        Self::with_base_urls(
            client_id,
            client_secret,
            user_agent,
            timeout_secs,
            DEFAULT_AUTH_BASE_URL,
            DEFAULT_API_BASE_URL,
        )
        .await
    }

    /// Creates a client against custom auth/API base URLs (for wiremock).
    ///
    /// # Errors
    ///
    /// Returns [`RedditError::Auth`] if token exchange fails, or
    /// [`RedditError::Http`] if the HTTP client cannot be constructed.
    pub async fn with_base_urls(
        client_id: &str,
        client_secret: &str,
        user_agent: &str,
        timeout_secs: u64,
        auth_base_url: &str,
        api_base_url: &str,
    ) -> Result<Self, RedditError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .connect_timeout(Duration::from_secs(10))
            .build()?;

        let token =
            Self::fetch_token(&client, client_id, client_secret, user_agent, auth_base_url).await?;

        Ok(Self {
            client,
            token,
            user_agent: user_agent.to_owned(),
            api_base_url: api_base_url.trim_end_matches('/').to_owned(),
        })
    }

    async fn fetch_token(
        client: &Client,
        client_id: &str,
        client_secret: &str,
        user_agent: &str,
        auth_base_url: &str,
    ) -> Result<String, RedditError> {
        let url = format!("{}/api/v1/access_token", auth_base_url.trim_end_matches('/'));
        let response = client
            .post(url)
            .header("User-Agent", user_agent)
            .basic_auth(client_id, Some(client_secret))
            .form(&[("grant_type", "client_credentials")])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(RedditError::Auth {
                reason: format!("token exchange failed with status {}", response.status()),
            });
        }

        let token_resp: TokenResponse =
            response.json().await.map_err(|e| RedditError::Auth {
                reason: format!("token parse error: {e}"),
            })?;

        Ok(token_resp.access_token)
    }

    /// Fetches one page of new posts from a subreddit listing.
    ///
    /// `after` is the opaque pagination cursor from the previous page.
    ///
    /// # Errors
    ///
    /// - [`RedditError::RateLimited`] — HTTP 429; carries the upstream
    ///   `Retry-After` hint (defaulting to 60s when absent).
    /// - [`RedditError::UnexpectedStatus`] — any other non-2xx status.
    /// - [`RedditError::Http`] — network or timeout failure.
    /// - [`RedditError::Deserialize`] — response body does not parse.
    pub async fn fetch_listing(
        &self,
        subreddit: &str,
        limit: u32,
        after: Option<&str>,
    ) -> Result<ListingPage, RedditError> {
        let url = format!("{}/r/{subreddit}/new", self.api_base_url);

        let mut params: Vec<(&str, String)> = vec![
            ("limit", limit.to_string()),
            ("raw_json", "1".to_string()),
        ];
        if let Some(cursor) = after {
            params.push(("after", cursor.to_string()));
        }

        let response = self
            .client
            .get(&url)
            .header("Authorization", format!("Bearer {}", self.token))
            .header("User-Agent", &self.user_agent)
            .query(&params)
            .send()
            .await?;

        let status = response.status();

        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let retry_after_secs = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse::<u64>().ok())
                .unwrap_or(60);
            return Err(RedditError::RateLimited { retry_after_secs });
        }

        if !status.is_success() {
            return Err(RedditError::UnexpectedStatus {
                status: status.as_u16(),
                url,
            });
        }

        let body = response.text().await?;
        let listing: Listing =
            serde_json::from_str(&body).map_err(|e| RedditError::Deserialize {
                context: format!("listing page for r/{subreddit}"),
                source: e,
            })?;

        let posts = listing
            .data
            .children
            .into_iter()
            .filter_map(|post| post.data.into_raw_post())
            .collect();

        Ok(ListingPage {
            posts,
            after: listing.data.after,
        })
    }
}
