//! # Poll Scheduler
//!
//! Bounded, fixed-interval polling of an external resource until it reaches a target
//! state. Each attempt observes a snapshot; a terminal failure observed mid-poll ends
//! the poll immediately instead of spending the remaining attempts. Polling blocks only
//! the calling step's future, never the runtime.

use std::fmt::Debug;
use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

/// Bound and spacing of a poll
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub max_attempts: u32,
    pub interval: Duration,
}

impl PollPolicy {
    pub fn new(max_attempts: u32, interval: Duration) -> Self {
        Self {
            max_attempts,
            interval,
        }
    }
}

/// Classification of one observed snapshot
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollVerdict {
    /// Target state reached
    Done,
    /// Still transitioning; poll again after the interval
    Continue,
    /// Terminal failure; stop polling
    Abort(String),
}

#[derive(Debug, Error)]
pub enum PollError<E> {
    #[error("Target state not reached after {attempts} attempts (last observed: {last_observed})")]
    AttemptsExhausted { attempts: u32, last_observed: String },

    #[error("Polling aborted after {attempts} attempts: {reason}")]
    Aborted { attempts: u32, reason: String },

    #[error("Status check failed: {0}")]
    Check(E),
}

/// Shared wait/poll machinery for transitional-state polling and step retries
#[derive(Debug, Default, Clone, Copy)]
pub struct PollScheduler;

impl PollScheduler {
    pub fn new() -> Self {
        Self
    }

    /// Timed wait between attempts
    pub async fn wait(&self, delay: Duration) {
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }

    /// Poll `check` until `classify` reports `Done` or `Abort`, or the attempt bound is spent.
    ///
    /// Errors returned by `check` itself end the poll immediately as `PollError::Check`;
    /// the caller decides whether they are transient.
    pub async fn poll_until<S, E, F, Fut, C>(
        &self,
        policy: PollPolicy,
        mut check: F,
        classify: C,
    ) -> Result<S, PollError<E>>
    where
        S: Debug,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<S, E>>,
        C: Fn(&S) -> PollVerdict,
    {
        let max_attempts = policy.max_attempts.max(1);
        let mut last_observed = String::from("nothing");

        for attempt in 1..=max_attempts {
            let snapshot = check().await.map_err(PollError::Check)?;

            match classify(&snapshot) {
                PollVerdict::Done => {
                    debug!(attempt = attempt, "Poll reached target state");
                    return Ok(snapshot);
                }
                PollVerdict::Abort(reason) => {
                    warn!(attempt = attempt, reason = %reason, "Poll aborted on terminal state");
                    return Err(PollError::Aborted {
                        attempts: attempt,
                        reason,
                    });
                }
                PollVerdict::Continue => {
                    last_observed = format!("{snapshot:?}");
                    debug!(
                        attempt = attempt,
                        max_attempts = max_attempts,
                        observed = %last_observed,
                        "Target still transitioning"
                    );
                }
            }

            if attempt < max_attempts {
                self.wait(policy.interval).await;
            }
        }

        Err(PollError::AttemptsExhausted {
            attempts: max_attempts,
            last_observed,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn test_poll_reaches_target_state() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let started = tokio::time::Instant::now();

        let result = PollScheduler::new()
            .poll_until(
                PollPolicy::new(10, Duration::from_secs(30)),
                || {
                    let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
                    async move { Ok::<_, String>(if n < 3 { "Updating" } else { "InService" }) }
                },
                |s| if *s == "InService" { PollVerdict::Done } else { PollVerdict::Continue },
            )
            .await
            .unwrap();

        assert_eq!(result, "InService");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(started.elapsed(), Duration::from_secs(60));
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_exhausts_attempts() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let err = PollScheduler::new()
            .poll_until(
                PollPolicy::new(4, Duration::from_secs(30)),
                || {
                    counter.fetch_add(1, Ordering::SeqCst);
                    async { Ok::<_, String>("Updating") }
                },
                |_| PollVerdict::Continue,
            )
            .await
            .unwrap_err();

        assert!(matches!(err, PollError::AttemptsExhausted { attempts: 4, .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_terminal_failure_short_circuits() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let err = PollScheduler::new()
            .poll_until(
                PollPolicy::new(24, Duration::from_secs(30)),
                || {
                    let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
                    async move { Ok::<_, String>(if n < 2 { "Updating" } else { "Failed" }) }
                },
                |s| match *s {
                    "Failed" => PollVerdict::Abort("endpoint entered Failed".to_string()),
                    "InService" => PollVerdict::Done,
                    _ => PollVerdict::Continue,
                },
            )
            .await
            .unwrap_err();

        assert!(matches!(err, PollError::Aborted { attempts: 2, .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_check_errors_propagate() {
        let err = PollScheduler::new()
            .poll_until(
                PollPolicy::new(3, Duration::from_secs(1)),
                || async { Err::<&str, _>("throttled") },
                |_| PollVerdict::Done,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, PollError::Check("throttled")));
    }
}
