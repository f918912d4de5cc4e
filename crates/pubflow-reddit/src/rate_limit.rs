//! Token-bucket admission gate for the collect stage.
//!
//! The bucket refills at a fixed rate and is consulted before every listing
//! fetch. When the upstream source answers 429, the caller feeds the
//! suggested delay back via [`TokenBucket::apply_cooldown`]; from then on
//! the larger of the bucket wait and the cooldown governs. Without a hint
//! the limiter is bucket-only — upstream metadata is never a dependency.

use std::sync::Arc;

use tokio::sync::Mutex;
use tokio::time::{Duration, Instant};

#[derive(Debug)]
struct BucketState {
    tokens: f64,
    last_refill: Instant,
    cooldown_until: Option<Instant>,
}

/// Token bucket with a caller-supplied cool-down overlay. Cheap to clone;
/// clones share one bucket.
#[derive(Debug, Clone)]
pub struct TokenBucket {
    capacity: f64,
    refill_per_sec: f64,
    state: Arc<Mutex<BucketState>>,
}

impl TokenBucket {
    /// Creates a full bucket. `refill_per_sec` is clamped to a small
    /// positive floor so a misconfigured zero rate cannot produce an
    /// unbounded wait.
    #[must_use]
    pub fn new(capacity: u32, refill_per_sec: f64) -> Self {
        Self {
            capacity: f64::from(capacity.max(1)),
            refill_per_sec: refill_per_sec.max(0.01),
            state: Arc::new(Mutex::new(BucketState {
                tokens: f64::from(capacity.max(1)),
                last_refill: Instant::now(),
                cooldown_until: None,
            })),
        }
    }

    /// Waits until a token is available and consumes it.
    ///
    /// The wait is bounded: at most the time for one token to refill plus
    /// any remaining upstream cool-down.
    pub async fn acquire(&self) {
        loop {
            let wait = {
                let mut state = self.state.lock().await;
                self.refill(&mut state);

                let wait = self.required_wait(&state);
                if wait.is_zero() {
                    state.tokens -= 1.0;
                    return;
                }
                wait
            };

            tokio::time::sleep(wait).await;
        }
    }

    /// Estimated wait until the next token would be granted, without
    /// consuming anything.
    pub async fn estimated_wait(&self) -> Duration {
        let mut state = self.state.lock().await;
        self.refill(&mut state);
        self.required_wait(&state)
    }

    /// Records an upstream backoff hint (e.g. a `Retry-After` value). The
    /// cool-down only ever extends; a shorter hint never shortens an
    /// existing one.
    pub async fn apply_cooldown(&self, duration: Duration) {
        let mut state = self.state.lock().await;
        let until = Instant::now() + duration;
        state.cooldown_until = Some(match state.cooldown_until {
            Some(existing) if existing > until => existing,
            _ => until,
        });
    }

    fn refill(&self, state: &mut BucketState) {
        let now = Instant::now();
        let elapsed = now.duration_since(state.last_refill).as_secs_f64();
        state.tokens = (state.tokens + elapsed * self.refill_per_sec).min(self.capacity);
        state.last_refill = now;
    }

    /// The larger of the bucket wait and the remaining cool-down.
    fn required_wait(&self, state: &BucketState) -> Duration {
        let bucket_wait = if state.tokens >= 1.0 {
            Duration::ZERO
        } else {
            Duration::from_secs_f64((1.0 - state.tokens) / self.refill_per_sec)
        };

        let cooldown_wait = state
            .cooldown_until
            .map(|until| until.saturating_duration_since(Instant::now()))
            .unwrap_or(Duration::ZERO);

        bucket_wait.max(cooldown_wait)
    }
}
