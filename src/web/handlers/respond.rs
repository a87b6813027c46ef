//! # Approval Webhook
//!
//! `GET /respond?token=T&action=Approved|Rejected`, the link a reviewer clicks in the
//! approval notification. Always answers with a small HTML page. The decision is recorded
//! through the token manager; the execution itself is resumed by the resume dispatcher.

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::Html;
use serde::Deserialize;
use tracing::{error, info};

use crate::logging::log_error;
use crate::models::Decision;
use crate::web::state::AppState;

pub const ACCEPTED_TEMPLATE: &str = "Thank you. Your response ({action}) has been recorded.";
pub const NOT_ACCEPTED_MESSAGE: &str =
    "This approval request has timed out or has already been responded to.";

#[derive(Debug, Deserialize)]
pub struct RespondQuery {
    pub token: Option<String>,
    pub action: Option<String>,
}

fn page(message: &str) -> Html<String> {
    Html(format!(
        "<!DOCTYPE html><html><head><title>Model deployment approval</title></head>\
         <body><p>{message}</p></body></html>"
    ))
}

/// Approval webhook: GET /respond
pub async fn respond(
    State(state): State<AppState>,
    Query(query): Query<RespondQuery>,
) -> (StatusCode, Html<String>) {
    let Some(token) = query.token.filter(|t| !t.trim().is_empty()) else {
        return (StatusCode::BAD_REQUEST, page("Missing approval token."));
    };
    let Some(decision) = query
        .action
        .as_deref()
        .and_then(|a| a.parse::<Decision>().ok())
    else {
        return (
            StatusCode::BAD_REQUEST,
            page("Unknown action. Expected Approved or Rejected."),
        );
    };

    match state.tokens.resolve(&token, decision).await {
        Ok(resolution) if resolution.accepted => {
            info!(
                execution_id = ?resolution.execution_id,
                decision = %decision,
                "Approval response recorded"
            );
            (
                StatusCode::OK,
                page(&ACCEPTED_TEMPLATE.replace("{action}", decision.as_str())),
            )
        }
        Ok(_) => (StatusCode::OK, page(NOT_ACCEPTED_MESSAGE)),
        Err(e) => {
            error!(error = %e, "Failed to record approval response");
            log_error("web", "respond", &e.to_string(), None);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                page("Your response could not be recorded. Please try again."),
            )
        }
    }
}
