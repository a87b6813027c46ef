//! # Resilience Module
//!
//! Bounded retry and polling for the promotion pipeline.
//!
//! ## Architecture
//!
//! - **Retry policies**: per-Task-step, fixed-interval, bounded by attempt count
//! - **Poll scheduler**: wait for an external resource to leave a transitional state,
//!   short-circuiting on terminal failure states
//!
//! Both purposes share one wait primitive ([`PollScheduler::wait`]) so a stuck
//! deployment and a flapping collaborator are bounded the same way.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use promoter_core::resilience::{PollPolicy, PollScheduler, PollVerdict};
//! use std::time::Duration;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let status = PollScheduler::new()
//!     .poll_until(
//!         PollPolicy::new(24, Duration::from_secs(30)),
//!         || async { Ok::<_, std::io::Error>("InService") },
//!         |s| if *s == "InService" { PollVerdict::Done } else { PollVerdict::Continue },
//!     )
//!     .await?;
//! # Ok(())
//! # }
//! ```

pub mod poll_scheduler;
pub mod retry_policy;

pub use poll_scheduler::{PollError, PollPolicy, PollScheduler, PollVerdict};
pub use retry_policy::{RetryDecision, RetryPolicy};
