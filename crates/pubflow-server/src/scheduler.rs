//! Background job scheduler.
//!
//! Initialises a [`JobScheduler`] at server startup and registers the
//! recurring jobs: the collection trigger (cron from config), the
//! takedown sweep, and the stale-task reclaim.

use std::sync::Arc;

use chrono::Utc;
use sqlx::PgPool;
use tokio_cron_scheduler::{Job, JobScheduler, JobSchedulerError};

use pubflow_core::AppConfig;
use pubflow_ghost::GhostClient;
use pubflow_pipeline::{execute_due_takedowns, task, TaskPayload};

/// Cron for the takedown sweep: every five minutes. The sweep is cheap
/// when nothing is due, and a tight cadence keeps the deletion SLA honest.
const TAKEDOWN_SWEEP_CRON: &str = "0 */5 * * * *";

/// Cron for the stale-task reclaim: once a minute.
const TASK_RECLAIM_CRON: &str = "0 * * * * *";

/// Builds and starts the background job scheduler.
///
/// Returns the running [`JobScheduler`] handle, which must be kept alive
/// for the lifetime of the process — dropping it shuts down all jobs.
///
/// # Errors
///
/// Returns [`JobSchedulerError`] if the scheduler cannot be initialised,
/// a job cannot be registered, or the scheduler fails to start.
pub async fn build_scheduler(
    pool: PgPool,
    config: Arc<AppConfig>,
    ghost: Arc<GhostClient>,
) -> Result<JobScheduler, JobSchedulerError> {
    let scheduler = JobScheduler::new().await?;

    register_collect_job(&scheduler, pool.clone(), Arc::clone(&config)).await?;
    register_takedown_sweep(&scheduler, pool.clone(), ghost).await?;
    register_task_reclaim(&scheduler, pool, config.task_lease_secs).await?;

    scheduler.start().await?;
    Ok(scheduler)
}

/// Registers the recurring collection trigger.
///
/// On each tick, enqueues one collect task per configured subreddit with
/// the quota day bound to today. Budget exhaustion is not checked here;
/// the collect stage parks itself when the gate refuses admission.
async fn register_collect_job(
    scheduler: &JobScheduler,
    pool: PgPool,
    config: Arc<AppConfig>,
) -> Result<(), JobSchedulerError> {
    let pool = Arc::new(pool);
    let cron = config.collect_cron.clone();

    let job = Job::new_async(cron.as_str(), move |_uuid, _lock| {
        let pool = Arc::clone(&pool);
        let config = Arc::clone(&config);

        Box::pin(async move {
            tracing::info!(
                subreddits = config.subreddits.len(),
                "scheduler: starting collection run"
            );
            run_collect_job(&pool, &config).await;
        })
    })?;

    scheduler.add(job).await?;
    Ok(())
}

async fn run_collect_job(pool: &PgPool, config: &AppConfig) {
    if config.subreddits.is_empty() {
        tracing::info!("scheduler: no subreddits configured; skipping");
        return;
    }

    let now = Utc::now();
    let quota_day = now.date_naive();

    for subreddit in &config.subreddits {
        let payload = TaskPayload::Collect {
            subreddit: subreddit.clone(),
            quota_day,
        };
        match task::enqueue(pool, &payload, now).await {
            Ok(id) => {
                tracing::info!(task_id = id, subreddit = %subreddit, "scheduler: collect task enqueued");
            }
            Err(e) => {
                tracing::error!(subreddit = %subreddit, error = %e, "scheduler: failed to enqueue collect task");
            }
        }
    }
}

/// Registers the takedown sweep.
///
/// Executes every due takedown: delete at the publishing target, flip the
/// item to removed, record the SLA audit. A failed deletion stays due and
/// is picked up by the next sweep.
async fn register_takedown_sweep(
    scheduler: &JobScheduler,
    pool: PgPool,
    ghost: Arc<GhostClient>,
) -> Result<(), JobSchedulerError> {
    let pool = Arc::new(pool);

    let job = Job::new_async(TAKEDOWN_SWEEP_CRON, move |_uuid, _lock| {
        let pool = Arc::clone(&pool);
        let ghost = Arc::clone(&ghost);

        Box::pin(async move {
            match execute_due_takedowns(&pool, &ghost, Utc::now()).await {
                Ok(0) => {}
                Ok(n) => tracing::info!(executed = n, "scheduler: takedown sweep executed deletions"),
                Err(e) => tracing::error!(error = %e, "scheduler: takedown sweep failed"),
            }
        })
    })?;

    scheduler.add(job).await?;
    Ok(())
}

/// Registers the stale-task reclaim.
///
/// Tasks claimed by a worker that died mid-flight stay `active` with a
/// frozen `updated_at`. Once that timestamp falls past the configured
/// lease, this job returns them to `pending` so another worker can pick
/// them up. Stages tolerate the resulting redelivery.
async fn register_task_reclaim(
    scheduler: &JobScheduler,
    pool: PgPool,
    lease_secs: u64,
) -> Result<(), JobSchedulerError> {
    let pool = Arc::new(pool);
    let lease = chrono::Duration::seconds(i64::try_from(lease_secs).unwrap_or(i64::MAX));

    let job = Job::new_async(TASK_RECLAIM_CRON, move |_uuid, _lock| {
        let pool = Arc::clone(&pool);

        Box::pin(async move {
            match pubflow_db::reclaim_stale_tasks(&pool, Utc::now() - lease).await {
                Ok(0) => {}
                Ok(n) => tracing::warn!(reclaimed = n, "scheduler: requeued tasks from dead workers"),
                Err(e) => tracing::error!(error = %e, "scheduler: stale-task reclaim failed"),
            }
        })
    })?;

    scheduler.add(job).await?;
    Ok(())
}
