//! # Web API
//!
//! HTTP surface of the promoter: the approval webhook reviewers click, submission and
//! status of executions, and a liveness probe.
//!
//! | Route | Handler |
//! |---|---|
//! | `GET /respond?token=T&action=A` | [`handlers::respond::respond`] (HTML) |
//! | `POST /v1/executions` | [`handlers::executions::submit_execution`] |
//! | `GET /v1/executions/:execution_id` | [`handlers::executions::get_execution`] |
//! | `GET /health` | [`handlers::health::basic_health`] |

pub mod errors;
pub mod handlers;
pub mod state;

pub use errors::{ApiError, ApiResult};
pub use state::AppState;

use axum::routing::{get, post};
use axum::Router;

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/respond", get(handlers::respond::respond))
        .route("/v1/executions", post(handlers::executions::submit_execution))
        .route(
            "/v1/executions/:execution_id",
            get(handlers::executions::get_execution),
        )
        .route("/health", get(handlers::health::basic_health))
        .with_state(state)
}
