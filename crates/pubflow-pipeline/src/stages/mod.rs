//! The three pipeline stages and the context they run against.
//!
//! A stage never decides its own retry schedule: it reports what happened
//! as a [`StageOutcome`] and the orchestrator consults the retry policy.
//! Stages are written to tolerate redelivery — every external effect is
//! guarded by state persisted before it.

pub mod collect;
pub mod process;
pub mod publish;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use sqlx::PgPool;

use pubflow_core::{AppConfig, Quota};
use pubflow_db::DbError;
use pubflow_enrich::EnrichClient;
use pubflow_ghost::GhostClient;
use pubflow_reddit::TokenBucket;

use crate::budget::BudgetGate;
use crate::notify::Notifier;
use crate::retry::ErrorClass;

/// Everything a stage needs to run. Cheap to clone via the `Arc` the
/// workers share.
pub struct StageContext {
    pub config: Arc<AppConfig>,
    pub pool: PgPool,
    /// Rate limiter for the collection source; shared by all collect runs.
    pub bucket: TokenBucket,
    pub gate: BudgetGate,
    pub enrich: EnrichClient,
    pub ghost: GhostClient,
    pub notifier: Notifier,
    /// Collection-source endpoint roots; tests point these at a mock server.
    pub reddit_auth_base_url: String,
    pub reddit_api_base_url: String,
}

/// What happened when a stage ran a task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageOutcome {
    /// The stage finished; the task is done.
    Done,
    /// A retryable failure; the orchestrator decides delay or give-up.
    Retry { class: ErrorClass, message: String },
    /// A failure retrying cannot fix; the task fails now.
    Fatal { message: String },
    /// The daily budget refused admission; park the task until `resume_at`
    /// without consuming an attempt.
    Blocked {
        quota: Quota,
        resume_at: DateTime<Utc>,
    },
}

impl StageOutcome {
    /// Folds a classified upstream error into an outcome: fatal classes
    /// fail, everything else retries.
    #[must_use]
    pub fn from_class(class: ErrorClass, message: String) -> Self {
        if class == ErrorClass::FatalLogic {
            StageOutcome::Fatal { message }
        } else {
            StageOutcome::Retry { class, message }
        }
    }

    /// A failed persistence write is always worth retrying.
    #[must_use]
    pub fn from_db_error(err: &DbError) -> Self {
        StageOutcome::Retry {
            class: ErrorClass::Transient,
            message: format!("persistence failure: {err}"),
        }
    }
}
