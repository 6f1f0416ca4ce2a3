//! Backoff schedule for node commands.
//!
//! A failed command is retried while it is transient and the attempt budget
//! lasts. The wait before retry `n` grows geometrically from `base_delay_ms`,
//! is capped at `max_delay_ms`, and is spread by `jitter` so that several
//! indexers hitting the same node do not retry in lockstep.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Total attempts per command, the first try included.
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub multiplier: f64,
    /// Fraction of the delay added or removed at random (0.0 disables).
    pub jitter: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            base_delay_ms: 500,
            max_delay_ms: 30_000,
            multiplier: 2.0,
            jitter: 0.2,
        }
    }
}

/// Outcome of [`RetryPolicy::after_failure`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backoff {
    /// Sleep, then try again.
    Wait(Duration),
    /// The attempt budget is spent.
    GiveUp,
}

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    config: RetryConfig,
}

impl RetryPolicy {
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Decide what follows the `failures`-th consecutive failure of one
    /// command.
    pub fn after_failure(&self, failures: u32) -> Backoff {
        if failures == 0 || failures >= self.config.max_attempts {
            return Backoff::GiveUp;
        }
        Backoff::Wait(self.delay(failures, clock_sample()))
    }

    /// Wait before retry number `retry` (1-based), with `sample` in
    /// `[-1.0, 1.0]` selecting the jitter.
    pub fn delay(&self, retry: u32, sample: f64) -> Duration {
        let exponent = retry.saturating_sub(1).min(i32::MAX as u32) as i32;
        let grown = self.config.base_delay_ms as f64 * self.config.multiplier.max(1.0).powi(exponent);
        let capped = grown.min(self.config.max_delay_ms as f64);
        let spread = capped * self.config.jitter.clamp(0.0, 1.0) * sample.clamp(-1.0, 1.0);
        Duration::from_millis((capped + spread).max(0.0) as u64)
    }
}

/// Sub-second clock nanos folded into `[-1.0, 1.0]`.
fn clock_sample() -> f64 {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.subsec_nanos())
        .unwrap_or(0);
    (nanos % 2001) as f64 / 1000.0 - 1.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(max_attempts: u32, jitter: f64) -> RetryPolicy {
        RetryPolicy::new(RetryConfig {
            max_attempts,
            base_delay_ms: 250,
            max_delay_ms: 1_500,
            multiplier: 3.0,
            jitter,
        })
    }

    #[test]
    fn waits_grow_until_the_cap() {
        let p = policy(10, 0.0);
        let waits: Vec<u128> = (1..=4).map(|n| p.delay(n, 0.0).as_millis()).collect();
        assert_eq!(waits, vec![250, 750, 1_500, 1_500]);
    }

    #[test]
    fn budget_counts_the_first_try() {
        let p = policy(3, 0.0);
        assert_eq!(p.after_failure(1), Backoff::Wait(Duration::from_millis(250)));
        assert_eq!(p.after_failure(2), Backoff::Wait(Duration::from_millis(750)));
        assert_eq!(p.after_failure(3), Backoff::GiveUp);
        assert_eq!(policy(1, 0.0).after_failure(1), Backoff::GiveUp, "single attempt never retries");
    }

    #[test]
    fn jitter_is_bounded_by_fraction() {
        let p = policy(5, 0.2);
        assert_eq!(p.delay(1, 1.0).as_millis(), 300);
        assert_eq!(p.delay(1, -1.0).as_millis(), 200);
        for _ in 0..50 {
            let Backoff::Wait(d) = p.after_failure(1) else {
                panic!("budget left");
            };
            assert!((200..=300).contains(&d.as_millis()), "{d:?}");
        }
    }

    #[test]
    fn shrinking_multiplier_is_treated_as_flat() {
        let p = RetryPolicy::new(RetryConfig {
            multiplier: 0.5,
            jitter: 0.0,
            ..RetryConfig::default()
        });
        assert_eq!(p.delay(3, 0.0), p.delay(1, 0.0));
    }
}
