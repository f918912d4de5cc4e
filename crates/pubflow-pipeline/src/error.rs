//! Pipeline error type and the classification of upstream client errors.
//!
//! Each stage observes typed errors from the clients it calls and maps them
//! onto an [`ErrorClass`] here, in one place, so the retry policy never
//! needs to know which service produced a failure.

use thiserror::Error;

use pubflow_db::DbError;
use pubflow_enrich::EnrichError;
use pubflow_ghost::GhostError;
use pubflow_reddit::RedditError;

use crate::retry::ErrorClass;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Db(#[from] DbError),

    #[error("publishing target error: {0}")]
    Ghost(#[from] GhostError),

    #[error("malformed task payload: {reason}")]
    Payload { reason: String },
}

fn classify_reqwest(err: &reqwest::Error) -> ErrorClass {
    if err.is_timeout() {
        ErrorClass::Timeout
    } else {
        ErrorClass::Transient
    }
}

/// Classifies a collection-source failure.
///
/// 5xx answers and network faults are worth retrying; a 4xx, an auth
/// rejection, or an unparseable body will not improve on retry.
#[must_use]
pub fn classify_reddit(err: &RedditError) -> ErrorClass {
    match err {
        RedditError::RateLimited { .. } => ErrorClass::RateLimited,
        RedditError::Http(e) => classify_reqwest(e),
        RedditError::UnexpectedStatus { status, .. } if *status >= 500 => ErrorClass::Transient,
        RedditError::Auth { .. }
        | RedditError::UnexpectedStatus { .. }
        | RedditError::Deserialize { .. } => ErrorClass::FatalLogic,
    }
}

/// Classifies an enrichment-service failure.
///
/// Quality failures are fatal here: the fallback model has already been
/// tried by the time the stage classifies the error.
#[must_use]
pub fn classify_enrich(err: &EnrichError) -> ErrorClass {
    match err {
        EnrichError::RateLimited { .. } => ErrorClass::RateLimited,
        EnrichError::Http(e) => classify_reqwest(e),
        EnrichError::UnexpectedStatus { status } if *status >= 500 => ErrorClass::Transient,
        EnrichError::UnexpectedStatus { .. }
        | EnrichError::Deserialize { .. }
        | EnrichError::Quality { .. } => ErrorClass::FatalLogic,
    }
}

/// Classifies a publishing-target failure.
#[must_use]
pub fn classify_ghost(err: &GhostError) -> ErrorClass {
    match err {
        GhostError::RateLimited { .. } => ErrorClass::RateLimited,
        GhostError::Http(e) => classify_reqwest(e),
        GhostError::UnexpectedStatus { status } if *status >= 500 => ErrorClass::Transient,
        GhostError::NotFound { .. }
        | GhostError::UnexpectedStatus { .. }
        | GhostError::Deserialize { .. } => ErrorClass::FatalLogic,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reddit_rate_limit_and_server_errors_are_retryable() {
        assert_eq!(
            classify_reddit(&RedditError::RateLimited {
                retry_after_secs: 30
            }),
            ErrorClass::RateLimited
        );
        assert_eq!(
            classify_reddit(&RedditError::UnexpectedStatus {
                status: 503,
                url: "https://oauth.reddit.com/r/rust/new".to_string()
            }),
            ErrorClass::Transient
        );
    }

    #[test]
    fn client_side_failures_are_fatal() {
        assert_eq!(
            classify_reddit(&RedditError::UnexpectedStatus {
                status: 403,
                url: "https://oauth.reddit.com/r/rust/new".to_string()
            }),
            ErrorClass::FatalLogic
        );
        assert_eq!(
            classify_enrich(&EnrichError::UnexpectedStatus { status: 400 }),
            ErrorClass::FatalLogic
        );
        assert_eq!(
            classify_ghost(&GhostError::NotFound {
                publish_ref: "gone".to_string()
            }),
            ErrorClass::FatalLogic
        );
    }

    #[test]
    fn enrich_quality_failures_are_fatal() {
        assert_eq!(
            classify_enrich(&EnrichError::Quality {
                reason: "empty summary".to_string(),
                tokens_used: 12
            }),
            ErrorClass::FatalLogic
        );
    }

    #[test]
    fn ghost_server_errors_are_transient() {
        assert_eq!(
            classify_ghost(&GhostError::UnexpectedStatus { status: 502 }),
            ErrorClass::Transient
        );
    }
}
