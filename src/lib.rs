#![allow(clippy::doc_markdown)] // Allow technical terms like PostgreSQL, SQLx in docs
#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # Promoter Core
//!
//! Durable workflow orchestration for promoting a trained ML model into production
//! behind a human approval gate and a canary rollout.
//!
//! ## Overview
//!
//! A promotion is a long-running execution of a declarative pipeline: register the
//! candidate, score it, ask a human for approval, suspend until the answer (or the
//! token's expiry) arrives, reconcile the serving endpoint into a canary configuration,
//! poll until it settles, watch the canary, then shift all traffic to the new model.
//! Every transition is persisted so executions survive restarts while suspended.
//!
//! ## Module Organization
//!
//! - [`models`] - Executions, pipeline definitions and callback tokens
//! - [`state_machine`] - Execution lifecycle transitions
//! - [`orchestration`] - The workflow engine, Choice evaluation and the promotion pipeline
//! - [`executors`] - Task executors bound to pipeline steps
//! - [`callback`] - Single-use approval tokens and the resume outbox
//! - [`reconciler`] - Endpoint state reconciliation into canary/baseline configurations
//! - [`resilience`] - Retry policies and bounded status polling
//! - [`collaborators`] - Model registry, scoring, serving target and notifier seams
//! - [`database`] - Execution persistence (in-memory and PostgreSQL)
//! - [`web`] - Approval webhook and execution API
//! - [`config`] - Layered YAML/environment configuration
//! - [`error`] - Structured error handling
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use promoter_core::config::ConfigManager;
//! use promoter_core::orchestration::{simulated_collaborators, PromoterSystem, Stores};
//! use promoter_core::utils::{Clock, SystemClock};
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let manager = ConfigManager::load()?;
//! let config = manager.config().clone();
//! let clock: Arc<dyn Clock> = Arc::new(SystemClock);
//!
//! let stores = Stores::from_config(&config.database).await?;
//! let collaborators = simulated_collaborators(&config, Arc::clone(&clock));
//! let mut system = PromoterSystem::build(config, stores, collaborators, clock)?;
//! system.start_background();
//!
//! let context = serde_json::json!({"endpoint_name": "churn-model"});
//! let execution_id = system.engine.start(&system.pipeline, context).await?;
//! println!("started {execution_id}");
//! # Ok(())
//! # }
//! ```
//!
//! ## Testing
//!
//! ```bash
//! cargo test --lib    # Unit tests
//! cargo test          # Unit and integration tests (in-memory stores)
//! ```

pub mod callback;
pub mod collaborators;
pub mod config;
pub mod constants;
pub mod database;
pub mod error;
pub mod executors;
pub mod logging;
pub mod models;
pub mod orchestration;
pub mod reconciler;
pub mod resilience;
pub mod state_machine;
pub mod utils;
pub mod web;

pub use callback::{CallbackTokenManager, Resolution, ResumeDispatcher};
pub use config::{ConfigManager, PromoterConfig};
pub use error::{ErrorCode, PromoterError, Result};
pub use models::{Decision, Execution, PipelineDefinition, TokenOutcome};
pub use orchestration::{ExternalEvent, PromoterSystem, Stores, WorkflowEngine};
pub use state_machine::ExecutionStatus;
