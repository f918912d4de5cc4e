//! The Pubflow orchestration engine.
//!
//! Drives the three-stage content pipeline (collect, process, publish)
//! over the Postgres-backed task queues, and owns the cross-cutting
//! machinery around it: the daily budget gate, the pure retry policy, the
//! publish idempotency guard, the two-phase takedown workflow, and
//! operator notifications.

pub mod budget;
pub mod error;
pub mod idempotency;
pub mod notify;
pub mod retry;
pub mod stages;
pub mod takedown;
pub mod task;
pub mod worker;

pub use budget::{Admission, BudgetGate, SpendReceipt};
pub use error::{classify_enrich, classify_ghost, classify_reddit, PipelineError};
pub use idempotency::{content_fingerprint, PublishAction};
pub use notify::{Notifier, Severity};
pub use retry::{ErrorClass, RetryDecision, RetryPolicy};
pub use stages::{StageContext, StageOutcome};
pub use takedown::{execute_due_takedowns, request_takedown, TakedownReceipt};
pub use task::TaskPayload;
pub use worker::{run_worker, spawn_workers};
