//! HTTP client for the chat-completion enrichment endpoint.

use std::time::Duration;

use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::EnrichError;

const SYSTEM_PROMPT: &str = "You summarise community posts for republication. \
Reply with a JSON object: {\"summary\": string, \"tags\": [3 to 5 short topic strings], \
\"analysis\": {\"sentiment\": string, \"audience\": string, \"key_points\": [strings]}}.";

/// Derived enrichment for one content item.
#[derive(Debug, Clone)]
pub struct Enrichment {
    pub summary: String,
    /// 3..=5 topic tags, enforced by the quality check.
    pub tags: Vec<String>,
    pub analysis: Value,
}

/// A successful enrichment plus the tokens it consumed.
#[derive(Debug, Clone)]
pub struct EnrichResult {
    pub enrichment: Enrichment,
    pub tokens_used: i64,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: Message,
}

#[derive(Debug, Deserialize)]
struct Message {
    content: String,
}

#[derive(Debug, Deserialize)]
struct Usage {
    total_tokens: i64,
}

#[derive(Debug, Deserialize)]
struct EnrichmentPayload {
    #[serde(default)]
    summary: String,
    #[serde(default)]
    tags: Vec<String>,
    #[serde(default)]
    analysis: Value,
}

/// Client for the enrichment service's chat-completion endpoint.
pub struct EnrichClient {
    client: Client,
    base_url: String,
    api_key: String,
}

impl EnrichClient {
    /// Creates a client. `base_url` points at the service root (the
    /// `/v1/chat/completions` path is appended per request), which lets
    /// tests aim at a wiremock server.
    ///
    /// # Errors
    ///
    /// Returns [`EnrichError::Http`] if the underlying `reqwest::Client`
    /// cannot be constructed.
    pub fn new(base_url: &str, api_key: &str, timeout_secs: u64) -> Result<Self, EnrichError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .connect_timeout(Duration::from_secs(10))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_owned(),
            api_key: api_key.to_owned(),
        })
    }

    /// Enriches one item with the named model.
    ///
    /// # Errors
    ///
    /// - [`EnrichError::RateLimited`] — HTTP 429 from the service.
    /// - [`EnrichError::UnexpectedStatus`] — any other non-2xx status.
    /// - [`EnrichError::Http`] — network or timeout failure.
    /// - [`EnrichError::Deserialize`] — envelope or model reply does not
    ///   parse as JSON.
    /// - [`EnrichError::Quality`] — the reply parses but violates the
    ///   summary/tag contract; carries the tokens consumed.
    pub async fn enrich(
        &self,
        title: &str,
        body: &str,
        model: &str,
    ) -> Result<EnrichResult, EnrichError> {
        let url = format!("{}/v1/chat/completions", self.base_url);
        let request = json!({
            "model": model,
            "response_format": {"type": "json_object"},
            "messages": [
                {"role": "system", "content": SYSTEM_PROMPT},
                {"role": "user", "content": format!("Title: {title}\n\n{body}")},
            ],
        });

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&request)
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
            return Err(EnrichError::RateLimited { retry_after_secs });
        }

        if !status.is_success() {
            return Err(EnrichError::UnexpectedStatus {
                status: status.as_u16(),
            });
        }

        let raw = response.text().await?;
        let chat: ChatResponse =
            serde_json::from_str(&raw).map_err(|e| EnrichError::Deserialize {
                context: format!("chat completion envelope (model {model})"),
                source: e,
            })?;

        let tokens_used = chat.usage.map_or(0, |u| u.total_tokens);

        let content = chat
            .choices
            .first()
            .map(|c| c.message.content.as_str())
            .unwrap_or_default();

        let payload: EnrichmentPayload =
            serde_json::from_str(content).map_err(|_| EnrichError::Quality {
                reason: "model reply is not the requested JSON object".to_string(),
                tokens_used,
            })?;

        validate_quality(&payload, tokens_used)?;

        Ok(EnrichResult {
            enrichment: Enrichment {
                summary: payload.summary,
                tags: payload.tags,
                analysis: payload.analysis,
            },
            tokens_used,
        })
    }
}

fn validate_quality(payload: &EnrichmentPayload, tokens_used: i64) -> Result<(), EnrichError> {
    if payload.summary.trim().is_empty() {
        return Err(EnrichError::Quality {
            reason: "empty summary".to_string(),
            tokens_used,
        });
    }

    if !(3..=5).contains(&payload.tags.len()) {
        return Err(EnrichError::Quality {
            reason: format!("expected 3..=5 tags, got {}", payload.tags.len()),
            tokens_used,
        });
    }

    Ok(())
}
