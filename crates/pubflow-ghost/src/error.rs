use thiserror::Error;

#[derive(Debug, Error)]
pub enum GhostError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("rate limited by publishing target (retry after {retry_after_secs}s)")]
    RateLimited { retry_after_secs: u64 },

    #[error("post {publish_ref} not found at publishing target")]
    NotFound { publish_ref: String },

    #[error("unexpected HTTP status {status} from publishing target")]
    UnexpectedStatus { status: u16 },

    #[error("JSON deserialization error for {context}: {source}")]
    Deserialize {
        context: String,
        #[source]
        source: serde_json::Error,
    },
}
