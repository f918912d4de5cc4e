//! Fire-and-forget operator notifications via an optional webhook.
//!
//! Notification delivery is best-effort: a failed or slow webhook must
//! never fail a pipeline stage, so errors are logged and swallowed. With no
//! webhook configured every notification still lands in the logs.

use std::time::Duration;

use chrono::Utc;
use reqwest::Client;
use serde_json::{json, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

impl Severity {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Critical => "critical",
        }
    }
}

#[derive(Clone)]
pub struct Notifier {
    client: Client,
    webhook_url: Option<String>,
}

impl std::fmt::Debug for Notifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Notifier")
            .field(
                "webhook_url",
                &self.webhook_url.as_ref().map(|_| "[redacted]"),
            )
            .finish_non_exhaustive()
    }
}

impl Notifier {
    /// Builds a notifier. `webhook_url = None` disables delivery.
    ///
    /// # Errors
    ///
    /// Returns [`reqwest::Error`] if the HTTP client cannot be constructed.
    pub fn new(webhook_url: Option<String>, timeout_secs: u64) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .connect_timeout(Duration::from_secs(10))
            .build()?;

        Ok(Self {
            client,
            webhook_url,
        })
    }

    /// Posts one notification. Never fails; delivery problems are logged.
    pub async fn send(&self, severity: Severity, message: &str, details: Value) {
        tracing::info!(
            severity = severity.as_str(),
            message,
            %details,
            "operator notification"
        );

        let Some(url) = &self.webhook_url else {
            return;
        };

        let body = json!({
            "service": "pubflow",
            "severity": severity.as_str(),
            "message": message,
            "details": details,
            "sent_at": Utc::now(),
        });

        match self.client.post(url).json(&body).send().await {
            Ok(response) if response.status().is_success() => {}
            Ok(response) => {
                tracing::warn!(
                    status = %response.status(),
                    "notification webhook rejected the payload"
                );
            }
            Err(e) => {
                tracing::warn!(error = %e, "notification webhook unreachable");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn disabled_notifier_is_a_quiet_noop() {
        let notifier = Notifier::new(None, 5).expect("build notifier");
        notifier
            .send(Severity::Info, "nothing to see", json!({}))
            .await;
    }

    #[test]
    fn debug_output_redacts_the_webhook_url() {
        let notifier = Notifier::new(
            Some("https://hooks.example.com/secret-token".to_string()),
            5,
        )
        .expect("build notifier");

        let debug = format!("{notifier:?}");
        assert!(!debug.contains("secret-token"));
        assert!(debug.contains("[redacted]"));
    }
}
