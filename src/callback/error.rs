use crate::database::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TokenError {
    /// Deliberately silent about whether the token ever existed
    #[error("Callback token not found")]
    NotFound,

    #[error("Callback token collision after {0} attempts")]
    Collision(u32),

    #[error("Invalid token ttl: {0}")]
    InvalidTtl(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<sqlx::Error> for TokenError {
    fn from(error: sqlx::Error) -> Self {
        Self::Store(StoreError::Database(error))
    }
}

pub type TokenResult<T> = std::result::Result<T, TokenError>;
