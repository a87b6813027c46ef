//! # Executor Registry
//!
//! Name → executor lookup used by the engine when it reaches a Task step. Pipelines are
//! checked against the registry at registration time so a missing executor is a
//! configuration error up front rather than a failure mid-execution.

use super::task_executor::TaskExecutor;
use dashmap::DashMap;
use std::sync::Arc;
use tracing::{debug, warn};

#[derive(Default)]
pub struct ExecutorRegistry {
    executors: DashMap<String, Arc<dyn TaskExecutor>>,
}

impl std::fmt::Debug for ExecutorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutorRegistry")
            .field("executors", &self.names())
            .finish()
    }
}

impl ExecutorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register under the executor's own name, replacing any previous binding
    pub fn register(&self, executor: Arc<dyn TaskExecutor>) {
        let name = executor.name().to_string();
        if self.executors.insert(name.clone(), executor).is_some() {
            warn!(executor = %name, "Replaced existing executor registration");
        } else {
            debug!(executor = %name, "Registered executor");
        }
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn TaskExecutor>> {
        self.executors.get(name).map(|entry| Arc::clone(entry.value()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.executors.contains_key(name)
    }

    /// Sorted executor names
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.executors.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.executors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.executors.is_empty()
    }
}
