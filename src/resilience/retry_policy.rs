//! # Retry Policy
//!
//! Bounded, fixed-interval retry attached to a Task step. Serving-infrastructure
//! transitions complete within a predictable window, so the pipeline uses a constant
//! interval (`backoff_rate = 1.0`) and a hard attempt bound rather than open-ended
//! exponential growth that would hide a stuck deployment.

use crate::error::ErrorCode;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Retry configuration for one Task step.
///
/// `max_attempts` counts every execution of the step, including the first one:
/// a policy with `max_attempts = 24` runs the executor at most 24 times.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    pub retryable: Vec<ErrorCode>,
    pub max_attempts: u32,
    pub interval_seconds: u64,
    #[serde(default = "default_backoff_rate")]
    pub backoff_rate: f64,
}

fn default_backoff_rate() -> f64 {
    1.0
}

/// Outcome of consulting a policy after a failed attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Run the step again after the delay
    RetryAfter(Duration),
    /// The error is retryable but the attempt bound is spent
    Exhausted,
    /// The policy does not cover this error code
    NotRetryable,
}

impl RetryPolicy {
    /// Fixed-interval policy for the given codes
    pub fn fixed(retryable: Vec<ErrorCode>, max_attempts: u32, interval: Duration) -> Self {
        Self {
            retryable,
            max_attempts,
            interval_seconds: interval.as_secs(),
            backoff_rate: 1.0,
        }
    }

    /// Fixed-interval policy for transient infrastructure errors only
    pub fn transient(max_attempts: u32, interval: Duration) -> Self {
        Self::fixed(
            vec![ErrorCode::TransientInfrastructureError],
            max_attempts,
            interval,
        )
    }

    pub fn covers(&self, code: ErrorCode) -> bool {
        self.retryable.contains(&code)
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_seconds)
    }

    /// Delay before attempt `attempts_made + 1`
    pub fn delay_after(&self, attempts_made: u32) -> Duration {
        let exponent = attempts_made.saturating_sub(1) as i32;
        let rate = if self.backoff_rate < 1.0 { 1.0 } else { self.backoff_rate };
        self.interval().mul_f64(rate.powi(exponent))
    }

    /// Decide what to do after `attempts_made` failed attempts ending in `code`
    pub fn decide(&self, code: ErrorCode, attempts_made: u32) -> RetryDecision {
        if !self.covers(code) {
            return RetryDecision::NotRetryable;
        }
        if attempts_made >= self.max_attempts {
            return RetryDecision::Exhausted;
        }
        RetryDecision::RetryAfter(self.delay_after(attempts_made))
    }
}
