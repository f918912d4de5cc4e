//! Queue workers: claim tasks, run the stage, interpret the outcome.
//!
//! One worker loop per stage. The worker owns every retry/park/fail
//! decision; stages only report what happened. Attempt numbers advance
//! solely here, so a budget park never burns an attempt.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use pubflow_core::Stage;
use pubflow_db::{
    complete_task, dequeue_task, fail_task, record_item_failure, release_task, retry_task, TaskRow,
};

use crate::notify::Severity;
use crate::retry::{RetryDecision, RetryPolicy};
use crate::stages::{self, StageContext, StageOutcome};
use crate::task::TaskPayload;

/// Spawns one worker per stage, all sharing the context and the shutdown
/// signal.
#[must_use]
pub fn spawn_workers(
    ctx: Arc<StageContext>,
    shutdown: watch::Receiver<bool>,
) -> Vec<JoinHandle<()>> {
    Stage::ALL
        .iter()
        .map(|&stage| tokio::spawn(run_worker(Arc::clone(&ctx), stage, shutdown.clone())))
        .collect()
}

/// Polls one stage's queue until the shutdown flag flips.
pub async fn run_worker(
    ctx: Arc<StageContext>,
    stage: Stage,
    mut shutdown: watch::Receiver<bool>,
) {
    let policy = RetryPolicy::for_stage(&ctx.config, stage);
    let poll_interval = Duration::from_millis(ctx.config.worker_poll_interval_ms);

    tracing::info!(stage = %stage, "worker started");

    loop {
        if *shutdown.borrow() {
            break;
        }

        match dequeue_task(&ctx.pool, stage.queue_name()).await {
            Ok(Some(task)) => handle_task(&ctx, stage, &policy, task).await,
            Ok(None) => idle(poll_interval, &mut shutdown).await,
            Err(e) => {
                tracing::error!(stage = %stage, error = %e, "dequeue failed");
                idle(poll_interval, &mut shutdown).await;
            }
        }
    }

    tracing::info!(stage = %stage, "worker stopped");
}

async fn idle(poll_interval: Duration, shutdown: &mut watch::Receiver<bool>) {
    tokio::select! {
        () = tokio::time::sleep(poll_interval) => {}
        _ = shutdown.changed() => {}
    }
}

async fn handle_task(ctx: &StageContext, stage: Stage, policy: &RetryPolicy, task: TaskRow) {
    let mut payload = match TaskPayload::parse(&task.payload) {
        Ok(payload) if payload.stage() == stage => payload,
        Ok(payload) => {
            let message = format!(
                "payload for stage {} found on the {} queue",
                payload.stage(),
                stage
            );
            give_up(ctx, &task, payload.source_id(), &message).await;
            return;
        }
        Err(e) => {
            give_up(ctx, &task, None, &e.to_string()).await;
            return;
        }
    };

    tracing::debug!(
        task_id = task.id,
        stage = %stage,
        attempt = task.attempt,
        "task claimed"
    );

    let outcome = run_stage(ctx, &payload).await;

    match outcome {
        StageOutcome::Done => {
            if let Err(e) = complete_task(&ctx.pool, task.id).await {
                tracing::error!(task_id = task.id, error = %e, "failed to mark task done");
            }
        }

        StageOutcome::Retry { class, message } => {
            let attempt = u32::try_from(task.attempt).unwrap_or(u32::MAX);
            match policy.decide(attempt, class) {
                RetryDecision::RetryAfter(delay) => {
                    let delay = with_jitter(delay);
                    tracing::warn!(
                        task_id = task.id,
                        stage = %stage,
                        attempt = task.attempt,
                        class = %class,
                        delay_secs = delay.as_secs(),
                        error = %message,
                        "task failed, retrying"
                    );
                    let run_at = Utc::now()
                        + chrono::Duration::from_std(delay)
                            .unwrap_or_else(|_| chrono::Duration::seconds(60));
                    if let Err(e) =
                        retry_task(&ctx.pool, task.id, task.attempt + 1, run_at, &message).await
                    {
                        tracing::error!(task_id = task.id, error = %e, "failed to re-enqueue task");
                    }
                }
                RetryDecision::GiveUp => {
                    give_up(ctx, &task, payload.source_id(), &message).await;
                }
            }
        }

        StageOutcome::Fatal { message } => {
            give_up(ctx, &task, payload.source_id(), &message).await;
        }

        StageOutcome::Blocked { quota, resume_at } => {
            payload.rebind_quota_day(resume_at.date_naive());
            match payload.to_value() {
                Ok(value) => {
                    tracing::info!(
                        task_id = task.id,
                        stage = %stage,
                        quota = %quota,
                        resume_at = %resume_at,
                        "task parked until the budget resets"
                    );
                    if let Err(e) = release_task(&ctx.pool, task.id, resume_at, &value).await {
                        tracing::error!(task_id = task.id, error = %e, "failed to park task");
                    }
                }
                Err(e) => {
                    give_up(ctx, &task, payload.source_id(), &e.to_string()).await;
                }
            }
        }
    }
}

async fn run_stage(ctx: &StageContext, payload: &TaskPayload) -> StageOutcome {
    match payload {
        TaskPayload::Collect {
            subreddit,
            quota_day,
        } => stages::collect::run(ctx, subreddit, *quota_day).await,
        TaskPayload::Process {
            source_id,
            quota_day,
        } => stages::process::run(ctx, source_id, *quota_day).await,
        TaskPayload::Publish { source_id } => stages::publish::run(ctx, source_id).await,
    }
}

/// Terminal failure path: fail the task, stamp the item, tell the operator.
async fn give_up(ctx: &StageContext, task: &TaskRow, source_id: Option<&str>, message: &str) {
    tracing::error!(
        task_id = task.id,
        queue = %task.queue,
        attempt = task.attempt,
        error = %message,
        "task failed terminally"
    );

    if let Err(e) = fail_task(&ctx.pool, task.id, message).await {
        tracing::error!(task_id = task.id, error = %e, "failed to mark task failed");
    }

    if let Some(source_id) = source_id {
        if let Err(e) = record_item_failure(&ctx.pool, source_id, message).await {
            tracing::error!(source_id, error = %e, "failed to record item failure");
        }
    }

    ctx.notifier
        .send(
            Severity::Critical,
            "pipeline task failed terminally",
            serde_json::json!({
                "task_id": task.id,
                "queue": task.queue,
                "attempt": task.attempt,
                "source_id": source_id,
                "error": message,
            }),
        )
        .await;
}

/// Adds up to 10% random jitter so synchronized failures fan back out.
fn with_jitter(delay: Duration) -> Duration {
    delay + delay.mul_f64(rand::random::<f64>() * 0.1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn jitter_only_ever_extends_the_delay() {
        let base = Duration::from_secs(100);
        for _ in 0..50 {
            let jittered = with_jitter(base);
            assert!(jittered >= base);
            assert!(jittered <= Duration::from_secs(110));
        }
    }
}
