//! Linear backoff with jitter for connection retries.

use rand::Rng;
use std::time::Duration;

/// Retry pacing for [`ReconnectingClient`](super::ReconnectingClient).
///
/// The delay before retry `n` is `min(base_delay * n + jitter, max_delay)` with
/// `jitter` drawn uniformly from `[0, max_jitter)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    pub base_delay: Duration,
    pub max_jitter: Duration,
    pub max_delay: Duration,
    /// Give up after this many failed attempts. `None` retries forever;
    /// `Some(0)` behaves like `Some(1)`.
    pub max_attempts: Option<u32>,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_millis(1000),
            max_jitter: Duration::from_millis(500),
            max_delay: Duration::from_millis(30_000),
            max_attempts: None,
        }
    }
}

impl BackoffPolicy {
    #[must_use]
    pub fn with_max_attempts(mut self, max_attempts: Option<u32>) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Delay to wait after the given failed attempt (1-indexed).
    #[must_use]
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let jitter_ms = self.max_jitter.as_millis() as u64;
        let jitter = if jitter_ms > 0 {
            rand::thread_rng().gen_range(0..jitter_ms)
        } else {
            0
        };
        let linear = self.base_delay.saturating_mul(attempt);
        linear
            .saturating_add(Duration::from_millis(jitter))
            .min(self.max_delay)
    }

    /// Whether another attempt is allowed after `attempt` failures.
    #[must_use]
    pub fn allows_retry_after(&self, attempt: u32) -> bool {
        match self.max_attempts {
            Some(max) => attempt < max,
            None => true,
        }
    }
}
