//! Exponential backoff with jitter.

use std::time::Duration;

use rand::Rng;

/// Exponential backoff schedule: `base * 2^(attempt-1)`, capped at `max`,
/// plus up to 10% random jitter so that many instances restarting together
/// do not retry in lockstep.
#[derive(Debug, Clone, Copy)]
pub struct Backoff {
    base: Duration,
    max: Duration,
}

impl Backoff {
    pub const fn new(base: Duration, max: Duration) -> Self {
        Self { base, max }
    }

    /// Delay before retry number `attempt` (1-based). Attempt 0 is immediate.
    pub fn delay(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }

        let factor = 2u32.saturating_pow(attempt.saturating_sub(1).min(31));
        let capped = self.base.saturating_mul(factor).min(self.max);

        let jitter_ms = u64::try_from(capped.as_millis() / 10).unwrap_or(0);
        let jitter = if jitter_ms > 0 {
            Duration::from_millis(rand::thread_rng().gen_range(0..jitter_ms))
        } else {
            Duration::ZERO
        };
        capped + jitter
    }
}
