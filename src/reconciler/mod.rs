//! # Endpoint State Reconciler
//!
//! Computes the serving target's `New`/`Busy`/`Ready` classification and prepares the
//! canary and full-cutover configurations it implies.

pub mod endpoint_state_reconciler;
pub mod plan;

pub use endpoint_state_reconciler::{EndpointStateReconciler, ReconcileError, ReconcilerSettings};
pub use plan::{ConfigRole, DeploymentPlan, EndpointState, PreparedConfig};
