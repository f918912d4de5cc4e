//! Pure retry policy: error classes in, delay-or-give-up out.
//!
//! The policy never sleeps, touches the clock, or performs I/O; the
//! orchestrator turns a [`RetryDecision`] into a queue `run_at`. Jitter is
//! also applied by the orchestrator so the policy stays deterministic and
//! testable.

use std::time::Duration;

use pubflow_core::{AppConfig, Stage};

/// Classification of a stage failure, decided at the call site that
/// observed the error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Upstream said slow down (HTTP 429). Retried on a longer base delay.
    RateLimited,
    /// Network hiccup, 5xx, or a failed persistence write.
    Transient,
    /// The request ran out of time; the upstream may or may not have seen it.
    Timeout,
    /// Bad input, auth rejection, unparseable response: retrying cannot
    /// change the result.
    FatalLogic,
}

impl ErrorClass {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorClass::RateLimited => "rate_limited",
            ErrorClass::Transient => "transient",
            ErrorClass::Timeout => "timeout",
            ErrorClass::FatalLogic => "fatal_logic",
        }
    }
}

impl std::fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the orchestrator should do with a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    RetryAfter(Duration),
    GiveUp,
}

/// Exponential backoff with per-class base delays and a per-stage attempt
/// ceiling.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    base: Duration,
    rate_limited_base: Duration,
    min_delay: Duration,
    max_delay: Duration,
    max_attempts: u32,
}

impl RetryPolicy {
    #[must_use]
    pub fn new(
        base: Duration,
        rate_limited_base: Duration,
        min_delay: Duration,
        max_delay: Duration,
        max_attempts: u32,
    ) -> Self {
        Self {
            base,
            rate_limited_base,
            min_delay,
            max_delay,
            max_attempts: max_attempts.max(1),
        }
    }

    /// Builds the policy for one stage from the shared configuration.
    #[must_use]
    pub fn for_stage(config: &AppConfig, stage: Stage) -> Self {
        let max_attempts = match stage {
            Stage::Collect => config.max_attempts_collect,
            Stage::Process => config.max_attempts_process,
            Stage::Publish => config.max_attempts_publish,
        };

        Self::new(
            Duration::from_secs(config.retry_base_secs),
            Duration::from_secs(config.retry_rate_limited_base_secs),
            Duration::from_secs(config.retry_min_secs),
            Duration::from_secs(config.retry_max_secs),
            max_attempts,
        )
    }

    /// Decides the fate of attempt `attempt` (1-indexed) that failed with
    /// `class`.
    ///
    /// Fatal-logic failures are never retried. Otherwise the delay doubles
    /// per attempt from the class's base, clamped to the configured window,
    /// until the attempt ceiling is reached.
    #[must_use]
    pub fn decide(&self, attempt: u32, class: ErrorClass) -> RetryDecision {
        if class == ErrorClass::FatalLogic {
            return RetryDecision::GiveUp;
        }
        if attempt >= self.max_attempts {
            return RetryDecision::GiveUp;
        }

        let base = match class {
            ErrorClass::RateLimited => self.rate_limited_base,
            _ => self.base,
        };

        let doublings = attempt.saturating_sub(1).min(16);
        let delay = base
            .saturating_mul(1 << doublings)
            .clamp(self.min_delay, self.max_delay);

        RetryDecision::RetryAfter(delay)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy::new(
            Duration::from_secs(5),
            Duration::from_secs(60),
            Duration::from_secs(1),
            Duration::from_secs(3600),
            max_attempts,
        )
    }

    #[test]
    fn fatal_logic_is_never_retried() {
        assert_eq!(
            policy(10).decide(1, ErrorClass::FatalLogic),
            RetryDecision::GiveUp
        );
    }

    #[test]
    fn gives_up_once_attempts_reach_the_ceiling() {
        let p = policy(3);
        assert!(matches!(
            p.decide(2, ErrorClass::Transient),
            RetryDecision::RetryAfter(_)
        ));
        assert_eq!(p.decide(3, ErrorClass::Transient), RetryDecision::GiveUp);
        assert_eq!(p.decide(7, ErrorClass::Transient), RetryDecision::GiveUp);
    }

    #[test]
    fn delays_double_per_attempt() {
        let p = policy(10);
        let delays: Vec<Duration> = (1..=4)
            .map(|attempt| match p.decide(attempt, ErrorClass::Timeout) {
                RetryDecision::RetryAfter(d) => d,
                RetryDecision::GiveUp => panic!("attempt {attempt} should retry"),
            })
            .collect();

        assert_eq!(
            delays,
            vec![
                Duration::from_secs(5),
                Duration::from_secs(10),
                Duration::from_secs(20),
                Duration::from_secs(40),
            ]
        );
    }

    #[test]
    fn rate_limited_backoff_starts_from_the_longer_base() {
        let p = policy(10);
        assert_eq!(
            p.decide(1, ErrorClass::RateLimited),
            RetryDecision::RetryAfter(Duration::from_secs(60))
        );
        assert_eq!(
            p.decide(2, ErrorClass::RateLimited),
            RetryDecision::RetryAfter(Duration::from_secs(120))
        );
    }

    #[test]
    fn delay_is_clamped_to_the_configured_window() {
        let p = RetryPolicy::new(
            Duration::from_secs(5),
            Duration::from_secs(60),
            Duration::from_secs(10),
            Duration::from_secs(30),
            10,
        );

        // Below the floor on attempt 1, above the ceiling by attempt 4.
        assert_eq!(
            p.decide(1, ErrorClass::Transient),
            RetryDecision::RetryAfter(Duration::from_secs(10))
        );
        assert_eq!(
            p.decide(4, ErrorClass::Transient),
            RetryDecision::RetryAfter(Duration::from_secs(30))
        );
    }

    #[test]
    fn huge_attempt_numbers_do_not_overflow() {
        let p = RetryPolicy::new(
            Duration::from_secs(5),
            Duration::from_secs(60),
            Duration::from_secs(1),
            Duration::MAX,
            u32::MAX,
        );
        assert!(matches!(
            p.decide(1000, ErrorClass::Transient),
            RetryDecision::RetryAfter(_)
        ));
    }
}
