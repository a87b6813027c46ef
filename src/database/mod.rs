//! # Database Operations
//!
//! Execution persistence for the promotion orchestrator.
//!
//! ## Key Components
//!
//! - [`execution_store`] - `ExecutionStore` trait and the in-memory implementation
//! - [`pg_execution_store`] - PostgreSQL implementation using runtime-checked SQLx queries
//! - [`connection`] - Pool construction and migration bootstrap
//!
//! Callback tokens and the resume outbox live in [`crate::callback`]; they share the
//! same pool and migrations.
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use promoter_core::config::DatabaseConfig;
//! use promoter_core::database::{connect, PgExecutionStore};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let pool = connect("postgresql://localhost/promoter", &DatabaseConfig::default()).await?;
//! let store = PgExecutionStore::new(pool);
//! # Ok(())
//! # }
//! ```

pub mod connection;
pub mod error;
pub mod execution_store;
pub mod pg_execution_store;

pub use connection::{connect, health_check};
pub use error::{StoreError, StoreResult};
pub use execution_store::{ExecutionStore, InMemoryExecutionStore};
pub use pg_execution_store::PgExecutionStore;

/// Embedded migrations from the workspace `migrations/` directory.
///
/// Use in tests with `#[sqlx::test(migrator = "promoter_core::database::MIGRATOR")]`.
pub static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");
