//! The budget gate: daily admission and spend against the quota counters.
//!
//! Two quotas exist (`calls` for collection requests, `tokens` for AI
//! consumption), each keyed by UTC day. Admission happens before the
//! external call; the spend is recorded after it, and always commits even
//! when it lands past the limit — the cost already happened. Crossing 80%
//! raises a one-time warning; hitting the limit parks further work until
//! the next UTC midnight instead of failing it.

use chrono::{DateTime, NaiveDate, Utc};
use serde_json::json;
use sqlx::PgPool;

use pubflow_core::Quota;
use pubflow_db::{
    increment_budget, peek_budget, try_mark_exhausted, try_mark_warned, DbError,
};

use crate::notify::{Notifier, Severity};

/// Warning threshold as a percentage of the daily limit.
pub const WARN_THRESHOLD_PCT: i64 = 80;

/// Result of an admission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Admitted,
    /// The day's budget is spent; the task should be parked until
    /// `resume_at` without consuming an attempt.
    Blocked {
        quota: Quota,
        resume_at: DateTime<Utc>,
    },
}

/// Outcome of recording a spend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpendReceipt {
    /// Counter total after this spend.
    pub total: i64,
    /// Whether this spend claimed the day's one-time 80% warning.
    pub warned_now: bool,
}

/// When a task blocked on the counter for `day` becomes runnable again.
///
/// Normally the midnight after `day`; for a counter from a past day the
/// answer is `now`, because today's counter is a fresh key.
#[must_use]
pub fn resume_time_after(day: NaiveDate, now: DateTime<Utc>) -> DateTime<Utc> {
    let next_midnight = day
        .succ_opt()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map_or(now, |dt| dt.and_utc());

    next_midnight.max(now)
}

/// Shared admission/spend gate over the `budget_counters` table. Cheap to
/// clone.
#[derive(Debug, Clone)]
pub struct BudgetGate {
    pool: PgPool,
    calls_per_day: i64,
    tokens_per_day: i64,
    notifier: Notifier,
}

impl BudgetGate {
    #[must_use]
    pub fn new(pool: PgPool, calls_per_day: i64, tokens_per_day: i64, notifier: Notifier) -> Self {
        Self {
            pool,
            calls_per_day,
            tokens_per_day,
            notifier,
        }
    }

    #[must_use]
    pub fn limit_for(&self, quota: Quota) -> i64 {
        match quota {
            Quota::Calls => self.calls_per_day,
            Quota::Tokens => self.tokens_per_day,
        }
    }

    /// Checks whether a unit of work may proceed against `quota` on `day`.
    ///
    /// The first admission refused for a given `(quota, day)` claims the
    /// exhaustion mark and raises the hard-stop notification; later
    /// refusals are silent.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the counter cannot be read or the exhaustion
    /// mark cannot be claimed.
    pub async fn admit(&self, quota: Quota, day: NaiveDate) -> Result<Admission, DbError> {
        let limit = self.limit_for(quota);
        let total = peek_budget(&self.pool, quota, day).await?;

        if total < limit {
            return Ok(Admission::Admitted);
        }

        if try_mark_exhausted(&self.pool, quota, day).await? {
            tracing::warn!(quota = %quota, %day, total, limit, "daily budget exhausted, hard stop");
            self.notifier
                .send(
                    Severity::Critical,
                    "daily budget exhausted",
                    json!({
                        "quota": quota.as_str(),
                        "day": day,
                        "total": total,
                        "limit": limit,
                    }),
                )
                .await;
        }

        Ok(Admission::Blocked {
            quota,
            resume_at: resume_time_after(day, Utc::now()),
        })
    }

    /// Records `amount` units spent against `quota` on `day` and returns
    /// the new total.
    ///
    /// The increment is atomic and always commits. If the new total sits at
    /// or past the warning threshold, the day's one-time warning is claimed
    /// and, if this caller won the claim, notified.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the increment or the warning claim fails.
    pub async fn spend(
        &self,
        quota: Quota,
        day: NaiveDate,
        amount: i64,
    ) -> Result<SpendReceipt, DbError> {
        let limit = self.limit_for(quota);
        let total = increment_budget(&self.pool, quota, day, amount).await?;

        let mut warned_now = false;
        if limit > 0 && total * 100 >= limit * WARN_THRESHOLD_PCT {
            warned_now = try_mark_warned(&self.pool, quota, day).await?;
            if warned_now {
                tracing::warn!(
                    quota = %quota,
                    %day,
                    total,
                    limit,
                    "daily budget crossed {WARN_THRESHOLD_PCT}% of the limit"
                );
                self.notifier
                    .send(
                        Severity::Warning,
                        "daily budget warning threshold crossed",
                        json!({
                            "quota": quota.as_str(),
                            "day": day,
                            "total": total,
                            "limit": limit,
                            "threshold_pct": WARN_THRESHOLD_PCT,
                        }),
                    )
                    .await;
            }
        }

        Ok(SpendReceipt { total, warned_now })
    }
}
