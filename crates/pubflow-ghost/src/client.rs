//! HTTP client for the Ghost-style admin posts API.

use std::time::Duration;

use reqwest::{Client, Response, StatusCode};
use serde::Deserialize;
use serde_json::json;

use crate::error::GhostError;

/// Content sent to the publishing target on create/update.
#[derive(Debug, Clone)]
pub struct PostDraft {
    pub title: String,
    pub html: String,
    pub tags: Vec<String>,
}

/// Opaque reference assigned by the publishing target on first create.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishRef {
    pub id: String,
    pub url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PostsEnvelope {
    posts: Vec<PostBody>,
}

#[derive(Debug, Deserialize)]
struct PostBody {
    id: String,
    url: Option<String>,
}

/// Client for the publishing target's admin API.
#[derive(Clone)]
pub struct GhostClient {
    client: Client,
    base_url: String,
    admin_key: String,
}

impl GhostClient {
    /// Creates a client against the given admin API root.
    ///
    /// # Errors
    ///
    /// Returns [`GhostError::Http`] if the underlying `reqwest::Client`
    /// cannot be constructed.
    pub fn new(base_url: &str, admin_key: &str, timeout_secs: u64) -> Result<Self, GhostError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .connect_timeout(Duration::from_secs(10))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_owned(),
            admin_key: admin_key.to_owned(),
        })
    }

    fn posts_url(&self, publish_ref: Option<&str>) -> String {
        match publish_ref {
            Some(id) => format!("{}/ghost/api/admin/posts/{id}/", self.base_url),
            None => format!("{}/ghost/api/admin/posts/", self.base_url),
        }
    }

    /// Creates a post and returns the target-assigned [`PublishRef`].
    ///
    /// # Errors
    ///
    /// - [`GhostError::RateLimited`] — HTTP 429.
    /// - [`GhostError::UnexpectedStatus`] — any other non-2xx status.
    /// - [`GhostError::Http`] — network or timeout failure.
    /// - [`GhostError::Deserialize`] — response body does not parse.
    pub async fn create_post(&self, draft: &PostDraft) -> Result<PublishRef, GhostError> {
        let response = self
            .client
            .post(self.posts_url(None))
            .query(&[("source", "html")])
            .header("Authorization", format!("Ghost {}", self.admin_key))
            .json(&Self::draft_body(draft))
            .send()
            .await?;

        let response = Self::check_status(response, None)?;
        Self::parse_publish_ref(response, "create post").await
    }

    /// Updates the post identified by `publish_ref`. The same ref is
    /// always reused; an update never mints a second post.
    ///
    /// # Errors
    ///
    /// Same as [`GhostClient::create_post`], plus [`GhostError::NotFound`]
    /// when the target no longer knows the ref.
    pub async fn update_post(
        &self,
        publish_ref: &str,
        draft: &PostDraft,
    ) -> Result<PublishRef, GhostError> {
        let response = self
            .client
            .put(self.posts_url(Some(publish_ref)))
            .query(&[("source", "html")])
            .header("Authorization", format!("Ghost {}", self.admin_key))
            .json(&Self::draft_body(draft))
            .send()
            .await?;

        let response = Self::check_status(response, Some(publish_ref))?;
        Self::parse_publish_ref(response, "update post").await
    }

    /// Reverts the post to an unpublished draft. A ref the target no
    /// longer knows counts as success.
    ///
    /// # Errors
    ///
    /// Same status/network errors as [`GhostClient::create_post`].
    pub async fn unpublish_post(&self, publish_ref: &str) -> Result<(), GhostError> {
        let response = self
            .client
            .put(self.posts_url(Some(publish_ref)))
            .header("Authorization", format!("Ghost {}", self.admin_key))
            .json(&json!({"posts": [{"status": "draft"}]}))
            .send()
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            tracing::debug!(publish_ref, "unpublish target already gone");
            return Ok(());
        }
        Self::check_status(response, Some(publish_ref))?;
        Ok(())
    }

    /// Permanently deletes the post. Idempotent: a 404 means the desired
    /// end state already holds.
    ///
    /// # Errors
    ///
    /// Same status/network errors as [`GhostClient::create_post`].
    pub async fn delete_post(&self, publish_ref: &str) -> Result<(), GhostError> {
        let response = self
            .client
            .delete(self.posts_url(Some(publish_ref)))
            .header("Authorization", format!("Ghost {}", self.admin_key))
            .send()
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            tracing::debug!(publish_ref, "delete target already gone");
            return Ok(());
        }
        Self::check_status(response, Some(publish_ref))?;
        Ok(())
    }

    fn draft_body(draft: &PostDraft) -> serde_json::Value {
        json!({
            "posts": [{
                "title": draft.title,
                "html": draft.html,
                "tags": draft.tags,
                "status": "published",
            }]
        })
    }

    fn check_status(
        response: Response,
        publish_ref: Option<&str>,
    ) -> Result<Response, GhostError> {
        let status = response.status();

        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after_secs = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse::<u64>().ok())
                .unwrap_or(60);
            return Err(GhostError::RateLimited { retry_after_secs });
        }

        if status == StatusCode::NOT_FOUND {
            if let Some(publish_ref) = publish_ref {
                return Err(GhostError::NotFound {
                    publish_ref: publish_ref.to_owned(),
                });
            }
        }

        if !status.is_success() {
            return Err(GhostError::UnexpectedStatus {
                status: status.as_u16(),
            });
        }

        Ok(response)
    }

    async fn parse_publish_ref(
        response: Response,
        context: &str,
    ) -> Result<PublishRef, GhostError> {
        let body = response.text().await?;
        let envelope: PostsEnvelope =
            serde_json::from_str(&body).map_err(|e| GhostError::Deserialize {
                context: context.to_owned(),
                source: e,
            })?;

        let post = envelope
            .posts
            .into_iter()
            .next()
            .ok_or_else(|| GhostError::Deserialize {
                context: context.to_owned(),
                source: serde::de::Error::custom("empty posts array"),
            })?;

        Ok(PublishRef {
            id: post.id,
            url: post.url,
        })
    }
}
