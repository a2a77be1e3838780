//! Exponential backoff retry policies with jitter.
//!
//! One policy type serves both retry paths in herald: per-message handler
//! retries in the consumer framework and HTTP delivery retries in the
//! webhook dispatcher. The decision is a pure function of the attempt
//! number and the failure time, so callers drive it from a virtual clock
//! in tests.

use std::time::Duration;

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Retry policy configuration.
///
/// Defines how failures are retried: backoff strategy, attempt budget, and
/// delay bounds. Jitter spreads retries from independent failures so they
/// do not land on a struggling receiver at the same instant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Maximum number of attempts, including the initial one.
    pub max_attempts: u32,

    /// Base delay for backoff calculation.
    pub base_delay: Duration,

    /// Cap applied to every computed delay.
    pub max_delay: Duration,

    /// Jitter percentage (0.0 to 1.0) to add randomness.
    pub jitter_factor: f64,

    /// Strategy for calculating backoff delays.
    pub backoff_strategy: BackoffStrategy,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(300),
            jitter_factor: 0.25,
            backoff_strategy: BackoffStrategy::Exponential,
        }
    }
}

/// Strategy for calculating retry delays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackoffStrategy {
    /// Fixed delay between retries.
    Fixed,
    /// Exponential backoff: delay doubles each attempt.
    Exponential,
    /// Linear backoff: delay increases by the base amount each attempt.
    Linear,
}

/// Result of a retry decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryDecision {
    /// Retry at the specified time.
    Retry {
        /// When the next attempt should be made.
        next_attempt_at: DateTime<Utc>,
    },
    /// Do not retry; the failure is terminal.
    GiveUp {
        /// Why no further attempts will be made.
        reason: String,
    },
}

impl RetryPolicy {
    /// Decides whether attempt `attempt_number` (1-based) that failed at
    /// `failed_at` should be retried, and when.
    pub fn decide(&self, attempt_number: u32, failed_at: DateTime<Utc>) -> RetryDecision {
        if attempt_number >= self.max_attempts {
            return RetryDecision::GiveUp {
                reason: format!("maximum attempts ({}) exceeded", self.max_attempts),
            };
        }

        let delay = self.delay_for_attempt(attempt_number);
        let Ok(chrono_delay) = chrono::Duration::from_std(delay) else {
            return RetryDecision::GiveUp { reason: "retry delay out of range".to_string() };
        };

        RetryDecision::Retry { next_attempt_at: failed_at + chrono_delay }
    }

    /// Delay to wait after the given failed attempt (1-based).
    ///
    /// Applies the backoff strategy, the `max_delay` cap, and jitter.
    pub fn delay_for_attempt(&self, attempt_number: u32) -> Duration {
        let base_delay = match self.backoff_strategy {
            BackoffStrategy::Fixed => self.base_delay,
            BackoffStrategy::Linear => self.base_delay * attempt_number.saturating_sub(1).max(1),
            BackoffStrategy::Exponential => {
                let exponent = attempt_number.saturating_sub(1).min(20);
                self.base_delay * 2_u32.saturating_pow(exponent)
            },
        };

        let capped_delay = std::cmp::min(base_delay, self.max_delay);
        let jittered_delay = apply_jitter(capped_delay, self.jitter_factor);

        std::cmp::min(jittered_delay, self.max_delay)
    }

    /// Policy with no jitter, useful when deterministic timing matters.
    pub fn without_jitter(mut self) -> Self {
        self.jitter_factor = 0.0;
        self
    }
}

/// Applies jitter to a duration to prevent thundering herd effects.
///
/// Randomizes by ±`jitter_factor` percentage: with 0.25, a 10s delay
/// becomes 7.5s to 12.5s.
fn apply_jitter(duration: Duration, jitter_factor: f64) -> Duration {
    if jitter_factor <= 0.0 {
        return duration;
    }

    let clamped_jitter = jitter_factor.clamp(0.0, 1.0);

    let mut rng = rand::rng();
    let jitter_range = duration.as_secs_f64() * clamped_jitter;
    let jitter_offset = rng.random_range(-jitter_range..=jitter_range);
    let jittered_secs = duration.as_secs_f64() + jitter_offset;

    Duration::from_secs_f64(jittered_secs.max(0.0))
}
