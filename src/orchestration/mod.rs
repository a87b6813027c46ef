//! # Orchestration
//!
//! The workflow engine and the pieces it composes.
//!
//! ## Core Components
//!
//! - **WorkflowEngine**: drives executions step by step, suspends on callback tokens and
//!   resumes on their resolution
//! - **choice**: pure evaluation of Choice rules against the execution context
//! - **promotion_pipeline**: the fixed register → test → approve → deploy graph
//! - **CanaryHealthPolicy**: verdict on a canary after its monitoring window
//! - **PromoterSystem**: wiring of stores, collaborators, engine and background loops
//!
//! ## Usage
//!
//! ```rust,no_run
//! use promoter_core::orchestration::{promotion_pipeline, WorkflowEngine};
//! use promoter_core::config::EngineConfig;
//! use serde_json::json;
//!
//! # async fn example(engine: WorkflowEngine) -> promoter_core::error::Result<()> {
//! let pipeline = promotion_pipeline::build(&EngineConfig::default());
//! engine.register_pipeline(pipeline.clone())?;
//! let execution_id = engine
//!     .start(&pipeline, json!({"endpoint_name": "churn"}))
//!     .await?;
//! println!("{}", engine.get_status(execution_id).await?.status);
//! # Ok(())
//! # }
//! ```

pub mod bootstrap;
pub mod canary_policy;
pub mod choice;
pub mod engine;
pub mod promotion_pipeline;

pub use bootstrap::{simulated_collaborators, PromoterSystem, Stores};
pub use canary_policy::{CanaryHealthPolicy, CanaryVerdict, PassThroughPolicy};
pub use engine::{ExternalEvent, WorkflowEngine};
