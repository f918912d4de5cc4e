//! Task payloads carried through the three routed queues.
//!
//! Payloads are stored as JSON in `pipeline_tasks.payload` with a `kind`
//! tag matching the queue name. Collect and process tasks carry the quota
//! day they were admitted under; the orchestrator re-binds it when a
//! budget-blocked task is parked into the next day.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::PgPool;

use pubflow_core::Stage;
use pubflow_db::enqueue_task;

use crate::error::PipelineError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum TaskPayload {
    Collect {
        subreddit: String,
        quota_day: NaiveDate,
    },
    Process {
        source_id: String,
        quota_day: NaiveDate,
    },
    Publish {
        source_id: String,
    },
}

impl TaskPayload {
    /// The queue this payload belongs on.
    #[must_use]
    pub fn stage(&self) -> Stage {
        match self {
            TaskPayload::Collect { .. } => Stage::Collect,
            TaskPayload::Process { .. } => Stage::Process,
            TaskPayload::Publish { .. } => Stage::Publish,
        }
    }

    /// The content item this payload references, when it references one.
    #[must_use]
    pub fn source_id(&self) -> Option<&str> {
        match self {
            TaskPayload::Collect { .. } => None,
            TaskPayload::Process { source_id, .. } | TaskPayload::Publish { source_id } => {
                Some(source_id)
            }
        }
    }

    /// Re-binds the quota day on budget-gated payloads. A publish payload
    /// spends no quota and is left unchanged.
    pub fn rebind_quota_day(&mut self, day: NaiveDate) {
        match self {
            TaskPayload::Collect { quota_day, .. } | TaskPayload::Process { quota_day, .. } => {
                *quota_day = day;
            }
            TaskPayload::Publish { .. } => {}
        }
    }

    /// Parses a stored payload.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Payload`] if the JSON does not match any
    /// payload shape.
    pub fn parse(value: &Value) -> Result<Self, PipelineError> {
        serde_json::from_value(value.clone()).map_err(|e| PipelineError::Payload {
            reason: e.to_string(),
        })
    }

    /// Serialises the payload for storage.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Payload`] if serialisation fails.
    pub fn to_value(&self) -> Result<Value, PipelineError> {
        serde_json::to_value(self).map_err(|e| PipelineError::Payload {
            reason: e.to_string(),
        })
    }
}

/// Enqueues a first-attempt task for the payload's stage.
///
/// # Errors
///
/// Returns [`PipelineError`] if serialisation or the insert fails.
pub async fn enqueue(
    pool: &PgPool,
    payload: &TaskPayload,
    run_at: DateTime<Utc>,
) -> Result<i64, PipelineError> {
    let value = payload.to_value()?;
    let id = enqueue_task(pool, payload.stage().queue_name(), &value, 1, run_at).await?;

    tracing::debug!(
        task_id = id,
        queue = payload.stage().queue_name(),
        source_id = payload.source_id().unwrap_or("-"),
        "task enqueued"
    );
    Ok(id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn payloads_round_trip_through_json() {
        let payload = TaskPayload::Process {
            source_id: "t3_abc".to_string(),
            quota_day: NaiveDate::from_ymd_opt(2026, 8, 1).expect("valid date"),
        };

        let value = payload.to_value().expect("serialize");
        assert_eq!(value["kind"], "process");
        assert_eq!(value["quota_day"], "2026-08-01");
        assert_eq!(TaskPayload::parse(&value).expect("parse"), payload);
    }

    #[test]
    fn unknown_kind_is_a_payload_error() {
        let err = TaskPayload::parse(&json!({"kind": "enrich", "source_id": "x"})).unwrap_err();
        assert!(matches!(err, PipelineError::Payload { .. }));
    }

    #[test]
    fn rebind_updates_gated_payloads_only() {
        let new_day = NaiveDate::from_ymd_opt(2026, 8, 2).expect("valid date");

        let mut collect = TaskPayload::Collect {
            subreddit: "rust".to_string(),
            quota_day: NaiveDate::from_ymd_opt(2026, 8, 1).expect("valid date"),
        };
        collect.rebind_quota_day(new_day);
        assert!(matches!(
            collect,
            TaskPayload::Collect { quota_day, .. } if quota_day == new_day
        ));

        let mut publish = TaskPayload::Publish {
            source_id: "t3_abc".to_string(),
        };
        publish.rebind_quota_day(new_day);
        assert_eq!(
            publish,
            TaskPayload::Publish {
                source_id: "t3_abc".to_string()
            }
        );
    }

    #[test]
    fn payload_stage_matches_queue_routing() {
        let payload = TaskPayload::Publish {
            source_id: "t3_abc".to_string(),
        };
        assert_eq!(payload.stage(), Stage::Publish);
        assert_eq!(payload.source_id(), Some("t3_abc"));
    }
}
