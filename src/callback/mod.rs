//! # Callback Tokens
//!
//! Single-use tokens correlating a suspended execution with an external decision.
//!
//! ```text
//! request_approval ──issue──▶ TokenStore ◀──resolve── GET /respond
//!                                 │ (atomic: resolve + outbox insert)
//!                                 ▼
//!                        ResumeDispatcher ──▶ WorkflowEngine::resume
//! ```

pub mod dispatcher;
pub mod error;
pub mod manager;
pub mod pg_store;
pub mod store;

pub use dispatcher::{ResumeDispatcher, ResumeHandler};
pub use error::{TokenError, TokenResult};
pub use manager::{CallbackTokenManager, Resolution};
pub use pg_store::PgTokenStore;
pub use store::{InMemoryTokenStore, TokenStore};
