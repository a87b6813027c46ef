//! # Execution Store
//!
//! Durable home of every [`Execution`]. The engine writes the full record on every step
//! transition so a suspended execution can be reloaded and continued after a restart.

use super::error::{StoreError, StoreResult};
use crate::models::Execution;
use crate::state_machine::ExecutionStatus;
use async_trait::async_trait;
use dashmap::DashMap;
use uuid::Uuid;

#[async_trait]
pub trait ExecutionStore: Send + Sync + std::fmt::Debug {
    /// Insert a new execution; fails if the id already exists
    async fn create(&self, execution: &Execution) -> StoreResult<()>;

    /// Overwrite an existing execution
    async fn save(&self, execution: &Execution) -> StoreResult<()>;

    async fn load(&self, execution_id: Uuid) -> StoreResult<Option<Execution>>;

    /// Ids of executions currently parked on a callback token
    async fn suspended_ids(&self) -> StoreResult<Vec<Uuid>>;

    /// Ids of executions last persisted mid-drive
    async fn running_ids(&self) -> StoreResult<Vec<Uuid>>;
}

/// Process-local store for development and tests
#[derive(Debug, Default)]
pub struct InMemoryExecutionStore {
    executions: DashMap<Uuid, Execution>,
}

impl InMemoryExecutionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.executions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.executions.is_empty()
    }
}

#[async_trait]
impl ExecutionStore for InMemoryExecutionStore {
    async fn create(&self, execution: &Execution) -> StoreResult<()> {
        use dashmap::mapref::entry::Entry;
        match self.executions.entry(execution.execution_id) {
            Entry::Occupied(_) => Err(StoreError::DuplicateExecution(execution.execution_id)),
            Entry::Vacant(slot) => {
                slot.insert(execution.clone());
                Ok(())
            }
        }
    }

    async fn save(&self, execution: &Execution) -> StoreResult<()> {
        match self.executions.get_mut(&execution.execution_id) {
            Some(mut existing) => {
                *existing = execution.clone();
                Ok(())
            }
            None => Err(StoreError::ExecutionNotFound(execution.execution_id)),
        }
    }

    async fn load(&self, execution_id: Uuid) -> StoreResult<Option<Execution>> {
        Ok(self.executions.get(&execution_id).map(|e| e.clone()))
    }

    async fn suspended_ids(&self) -> StoreResult<Vec<Uuid>> {
        Ok(self
            .executions
            .iter()
            .filter(|entry| entry.status.is_suspended())
            .map(|entry| *entry.key())
            .collect())
    }

    async fn running_ids(&self) -> StoreResult<Vec<Uuid>> {
        Ok(self
            .executions
            .iter()
            .filter(|entry| entry.status == ExecutionStatus::Running)
            .map(|entry| *entry.key())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::json;

    #[tokio::test]
    async fn test_create_save_load() {
        let store = InMemoryExecutionStore::new();
        let mut execution = Execution::new("p", "1", "A", json!({"k": "v"}), Utc::now());

        store.create(&execution).await.unwrap();
        assert!(matches!(
            store.create(&execution).await,
            Err(StoreError::DuplicateExecution(_))
        ));
        assert_eq!(store.running_ids().await.unwrap(), vec![execution.execution_id]);

        execution.status = ExecutionStatus::Suspended;
        execution.pending_token = Some("tok".to_string());
        store.save(&execution).await.unwrap();

        let loaded = store.load(execution.execution_id).await.unwrap().unwrap();
        assert_eq!(loaded, execution);
        assert_eq!(
            store.suspended_ids().await.unwrap(),
            vec![execution.execution_id]
        );
        assert!(store.running_ids().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_save_unknown_execution_fails() {
        let store = InMemoryExecutionStore::new();
        let execution = Execution::new("p", "1", "A", json!({}), Utc::now());
        assert!(matches!(
            store.save(&execution).await,
            Err(StoreError::ExecutionNotFound(_))
        ));
        assert!(store.load(Uuid::new_v4()).await.unwrap().is_none());
    }
}
