use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Backoff strategy for step retries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackoffKind {
    /// Same delay each attempt.
    Fixed,
    /// Delay multiplies each attempt, capped at the maximum.
    Exponential,
}

impl Default for BackoffKind {
    fn default() -> Self {
        Self::Exponential
    }
}

/// Retry policy for a single step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Maximum number of retries after the first attempt.
    pub max_retries: u32,
    /// Delay before the first retry.
    pub initial_delay: Duration,
    /// Upper bound on any computed delay.
    pub max_delay: Duration,
    /// Multiplier applied per attempt under exponential backoff.
    pub multiplier: f64,
    /// Backoff strategy.
    pub backoff: BackoffKind,
    /// Whether retries are enabled at all.
    pub enabled: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(10),
            multiplier: 2.0,
            backoff: BackoffKind::Exponential,
            enabled: true,
        }
    }
}

impl RetryPolicy {
    /// Policy for steps that should retry quickly and often.
    pub fn aggressive() -> Self {
        Self {
            max_retries: 5,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(5),
            multiplier: 1.5,
            ..Default::default()
        }
    }

    /// Policy for steps whose downstream services are expensive to hammer.
    pub fn conservative() -> Self {
        Self {
            max_retries: 2,
            initial_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(20),
            multiplier: 3.0,
            ..Default::default()
        }
    }

    /// Policy that never retries.
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            enabled: false,
            ..Default::default()
        }
    }

    /// Whether attempt `attempt` (0-indexed retry count) may be retried.
    pub fn can_retry(&self, attempt: u32) -> bool {
        self.enabled && attempt < self.max_retries
    }

    /// Delay before retry attempt `attempt` (0-indexed), saturating at
    /// `max_delay`.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        match self.backoff {
            BackoffKind::Fixed => self.initial_delay,
            BackoffKind::Exponential => {
                let factor = self.multiplier.powi(attempt.min(i32::MAX as u32) as i32);
                let delay = self.initial_delay.mul_f64(factor.max(0.0));
                delay.min(self.max_delay)
            }
        }
    }
}
