//! # Web API Request Handlers
//!
//! Contains all HTTP request handlers organized by functional area.

pub mod executions;
pub mod health;
pub mod respond;
