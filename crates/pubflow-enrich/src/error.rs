use thiserror::Error;

#[derive(Debug, Error)]
pub enum EnrichError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("rate limited by enrichment service (retry after {retry_after_secs}s)")]
    RateLimited { retry_after_secs: u64 },

    #[error("unexpected HTTP status {status} from enrichment service")]
    UnexpectedStatus { status: u16 },

    #[error("JSON deserialization error for {context}: {source}")]
    Deserialize {
        context: String,
        #[source]
        source: serde_json::Error,
    },

    /// The model replied, but the reply fails the quality contract
    /// (empty summary, or a tag count outside 3..=5). The tokens were
    /// still consumed and must be charged against the budget.
    #[error("enrichment quality failure: {reason}")]
    Quality { reason: String, tokens_used: i64 },
}
