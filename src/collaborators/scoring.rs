use super::error::{CollaboratorResult, InjectedFaults};
use crate::utils::{append_timestamp, Clock};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::sync::Arc;

/// Batch inference over a held-out dataset
#[async_trait]
pub trait ScoringService: Send + Sync + std::fmt::Debug {
    /// Run batch scoring and return the job descriptor
    async fn run_batch(&self, model_name: &str, dataset_uri: &str) -> CollaboratorResult<Value>;
}

/// Scoring service that completes every job immediately
#[derive(Debug)]
pub struct InMemoryScoringService {
    clock: Arc<dyn Clock>,
    jobs: Mutex<Vec<Value>>,
    faults: InjectedFaults,
}

impl InMemoryScoringService {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            jobs: Mutex::new(Vec::new()),
            faults: InjectedFaults::default(),
        }
    }

    pub fn faults(&self) -> &InjectedFaults {
        &self.faults
    }

    pub fn jobs(&self) -> Vec<Value> {
        self.jobs.lock().clone()
    }
}

#[async_trait]
impl ScoringService for InMemoryScoringService {
    async fn run_batch(&self, model_name: &str, dataset_uri: &str) -> CollaboratorResult<Value> {
        self.faults.next()?;

        let job_name = append_timestamp("scoring", self.clock.now());
        let descriptor = json!({
            "job_name": job_name,
            "model_name": model_name,
            "dataset_uri": dataset_uri,
            "output_uri": format!("{}.out", dataset_uri.trim_end_matches('/')),
            "status": "Completed",
        });
        self.jobs.lock().push(descriptor.clone());
        Ok(descriptor)
    }
}
