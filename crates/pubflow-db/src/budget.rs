//! Database operations for `budget_counters`.
//!
//! One counter exists per `(quota, day)`; day roll-over is implicit in the
//! key, so no reset job runs at midnight. Increments are single atomic
//! statements because multiple pipeline workers spend against the same
//! quota concurrently. The warning/exhaustion marks are claimed with
//! guarded UPDATEs so each fires at most once per day regardless of how
//! many workers cross the threshold.

use chrono::NaiveDate;
use sqlx::PgPool;

use crate::DbError;
use pubflow_core::Quota;

/// Atomically adds `amount` to the counter and returns the new total.
///
/// The increment always commits, even when it pushes the total past the
/// configured limit — the spend it records has already happened. Admission
/// checks belong before the spend, via [`peek_budget`].
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the upsert fails.
pub async fn increment_budget(
    pool: &PgPool,
    quota: Quota,
    day: NaiveDate,
    amount: i64,
) -> Result<i64, DbError> {
    let total: i64 = sqlx::query_scalar(
        "INSERT INTO budget_counters (quota, day, total) \
         VALUES ($1, $2, $3) \
         ON CONFLICT (quota, day) DO UPDATE SET \
             total = budget_counters.total + EXCLUDED.total \
         RETURNING total",
    )
    .bind(quota.as_str())
    .bind(day)
    .bind(amount)
    .fetch_one(pool)
    .await?;

    Ok(total)
}

/// Reads the counter's current total; a missing row reads as zero.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn peek_budget(pool: &PgPool, quota: Quota, day: NaiveDate) -> Result<i64, DbError> {
    let total: Option<i64> =
        sqlx::query_scalar("SELECT total FROM budget_counters WHERE quota = $1 AND day = $2")
            .bind(quota.as_str())
            .bind(day)
            .fetch_optional(pool)
            .await?;

    Ok(total.unwrap_or(0))
}

/// Claims the once-per-day 80% warning for this counter.
///
/// Returns `true` only for the first caller on a given `(quota, day)`;
/// every later claim returns `false`.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the update fails.
pub async fn try_mark_warned(pool: &PgPool, quota: Quota, day: NaiveDate) -> Result<bool, DbError> {
    let claimed: Option<String> = sqlx::query_scalar(
        "UPDATE budget_counters SET warned_at = NOW() \
         WHERE quota = $1 AND day = $2 AND warned_at IS NULL \
         RETURNING quota",
    )
    .bind(quota.as_str())
    .bind(day)
    .fetch_optional(pool)
    .await?;

    Ok(claimed.is_some())
}

/// Claims the once-per-day exhaustion (hard-stop) mark for this counter.
///
/// Same claim semantics as [`try_mark_warned`], tracked separately so the
/// 100% hard stop can be signalled even when the 80% warning already fired.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the update fails.
pub async fn try_mark_exhausted(
    pool: &PgPool,
    quota: Quota,
    day: NaiveDate,
) -> Result<bool, DbError> {
    let claimed: Option<String> = sqlx::query_scalar(
        "UPDATE budget_counters SET exhausted_at = NOW() \
         WHERE quota = $1 AND day = $2 AND exhausted_at IS NULL \
         RETURNING quota",
    )
    .bind(quota.as_str())
    .bind(day)
    .fetch_optional(pool)
    .await?;

    Ok(claimed.is_some())
}
