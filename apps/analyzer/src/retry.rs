use std::time::Duration;

use rand::Rng;

/// Bounded retry schedule with exponential backoff and jitter.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub multiplier: f64,
    /// Upper bound on any single computed delay.
    pub max_delay: Duration,
    /// Jitter is drawn from `[0, jitter_ratio * delay]` and added to the delay.
    pub jitter_ratio: f64,
}

impl RetryPolicy {
    /// Provider calls: 3 attempts, 1s base, x2.
    pub fn extraction() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            multiplier: 2.0,
            max_delay: Duration::from_secs(30),
            jitter_ratio: 0.25,
        }
    }

    /// Store commits: 3 attempts, 200ms base, x2.
    pub fn persistence() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(200),
            multiplier: 2.0,
            max_delay: Duration::from_secs(5),
            jitter_ratio: 0.25,
        }
    }

    /// No waiting between attempts. Used by tests.
    #[cfg(test)]
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            base_delay: Duration::ZERO,
            multiplier: 2.0,
            max_delay: Duration::ZERO,
            jitter_ratio: 0.0,
        }
    }

    /// Deterministic part of the delay before retry number `retry` (1-based):
    /// `base * multiplier^(retry - 1)`, capped at `max_delay`.
    pub fn backoff(&self, retry: u32) -> Duration {
        let exp = retry.saturating_sub(1) as i32;
        let secs = self.base_delay.as_secs_f64() * self.multiplier.powi(exp);
        Duration::from_secs_f64(secs.min(self.max_delay.as_secs_f64()))
    }

    /// Full delay before retry number `retry`, including jitter. A server-provided
    /// hint raises the floor but never past `max_delay`.
    pub fn delay_for(&self, retry: u32, hint: Option<Duration>) -> Duration {
        let mut delay = self.backoff(retry);
        if let Some(hint) = hint {
            delay = delay.max(hint.min(self.max_delay));
        }
        if self.jitter_ratio > 0.0 && !delay.is_zero() {
            let spread = delay.as_secs_f64() * self.jitter_ratio;
            delay += Duration::from_secs_f64(rand::thread_rng().gen_range(0.0..=spread));
        }
        delay
    }
}
