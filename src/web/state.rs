//! # Web API Application State

use crate::callback::CallbackTokenManager;
use crate::models::PipelineDefinition;
use crate::orchestration::WorkflowEngine;
use std::sync::Arc;

/// Shared handles for every request handler
#[derive(Debug, Clone)]
pub struct AppState {
    pub engine: Arc<WorkflowEngine>,
    pub tokens: Arc<CallbackTokenManager>,
    /// Pipeline that `POST /v1/executions` starts
    pub pipeline: Arc<PipelineDefinition>,
}

impl AppState {
    pub fn new(engine: Arc<WorkflowEngine>, pipeline: PipelineDefinition) -> Self {
        Self {
            tokens: engine.tokens(),
            engine,
            pipeline: Arc::new(pipeline),
        }
    }
}
