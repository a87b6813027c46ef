use thiserror::Error;
use uuid::Uuid;

/// Persistence errors shared by the execution and token stores
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Execution already exists: {0}")]
    DuplicateExecution(Uuid),

    #[error("Execution not found: {0}")]
    ExecutionNotFound(Uuid),

    #[error("Corrupt record: {0}")]
    CorruptRecord(String),
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;
