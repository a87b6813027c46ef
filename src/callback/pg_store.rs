use super::error::{TokenError, TokenResult};
use super::store::TokenStore;
use crate::database::StoreError;
use crate::models::{CallbackToken, ResumeRequest, TokenOutcome};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

/// PostgreSQL token store; resolution and outbox insert share one transaction
#[derive(Debug, Clone)]
pub struct PgTokenStore {
    pool: PgPool,
}

#[derive(Debug, FromRow)]
struct TokenRow {
    token: String,
    execution_id: Uuid,
    created_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
    resolved_at: Option<DateTime<Utc>>,
    resolution: Option<String>,
}

impl TryFrom<TokenRow> for CallbackToken {
    type Error = TokenError;

    fn try_from(row: TokenRow) -> Result<Self, Self::Error> {
        let resolution = row
            .resolution
            .map(|r| r.parse::<TokenOutcome>())
            .transpose()
            .map_err(|e| TokenError::Store(StoreError::CorruptRecord(e)))?;
        Ok(CallbackToken {
            token: row.token,
            execution_id: row.execution_id,
            created_at: row.created_at,
            expires_at: row.expires_at,
            resolved_at: row.resolved_at,
            resolution,
        })
    }
}

#[derive(Debug, FromRow)]
struct OutboxRow {
    id: i64,
    execution_id: Uuid,
    token: String,
    outcome: String,
    enqueued_at: DateTime<Utc>,
}

impl TryFrom<OutboxRow> for ResumeRequest {
    type Error = TokenError;

    fn try_from(row: OutboxRow) -> Result<Self, Self::Error> {
        Ok(ResumeRequest {
            outbox_id: row.id,
            execution_id: row.execution_id,
            token: row.token,
            outcome: row
                .outcome
                .parse::<TokenOutcome>()
                .map_err(|e| TokenError::Store(StoreError::CorruptRecord(e)))?,
            enqueued_at: row.enqueued_at,
        })
    }
}

impl PgTokenStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TokenStore for PgTokenStore {
    async fn insert(&self, token: &CallbackToken) -> TokenResult<()> {
        let result = sqlx::query(
            r#"
            INSERT INTO promoter_callback_tokens (token, execution_id, created_at, expires_at)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (token) DO NOTHING
            "#,
        )
        .bind(&token.token)
        .bind(token.execution_id)
        .bind(token.created_at)
        .bind(token.expires_at)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(TokenError::Collision(1));
        }
        Ok(())
    }

    async fn get(&self, token: &str) -> TokenResult<Option<CallbackToken>> {
        sqlx::query_as::<_, TokenRow>(
            r#"
            SELECT token, execution_id, created_at, expires_at, resolved_at, resolution
            FROM promoter_callback_tokens
            WHERE token = $1
            "#,
        )
        .bind(token)
        .fetch_optional(&self.pool)
        .await?
        .map(CallbackToken::try_from)
        .transpose()
    }

    async fn resolve_and_enqueue(
        &self,
        token: &str,
        outcome: TokenOutcome,
        at: DateTime<Utc>,
    ) -> TokenResult<Option<CallbackToken>> {
        let mut tx = self.pool.begin().await?;

        let resolved = sqlx::query_as::<_, TokenRow>(
            r#"
            UPDATE promoter_callback_tokens
            SET resolution = $2, resolved_at = $3
            WHERE token = $1 AND resolution IS NULL
            RETURNING token, execution_id, created_at, expires_at, resolved_at, resolution
            "#,
        )
        .bind(token)
        .bind(outcome.as_str())
        .bind(at)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(row) = resolved else {
            tx.rollback().await?;
            return match self.get(token).await? {
                Some(_) => Ok(None),
                None => Err(TokenError::NotFound),
            };
        };
        let resolved = CallbackToken::try_from(row)?;

        sqlx::query(
            r#"
            INSERT INTO promoter_resume_outbox (execution_id, token, outcome, enqueued_at)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(resolved.execution_id)
        .bind(&resolved.token)
        .bind(outcome.as_str())
        .bind(at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(Some(resolved))
    }

    async fn expired_unresolved(&self, now: DateTime<Utc>) -> TokenResult<Vec<CallbackToken>> {
        sqlx::query_as::<_, TokenRow>(
            r#"
            SELECT token, execution_id, created_at, expires_at, resolved_at, resolution
            FROM promoter_callback_tokens
            WHERE resolution IS NULL AND expires_at <= $1
            ORDER BY expires_at
            "#,
        )
        .bind(now)
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(CallbackToken::try_from)
        .collect()
    }

    async fn claim_pending_resumes(
        &self,
        limit: usize,
        now: DateTime<Utc>,
        lease: Duration,
    ) -> TokenResult<Vec<ResumeRequest>> {
        let mut rows = sqlx::query_as::<_, OutboxRow>(
            r#"
            UPDATE promoter_resume_outbox
            SET claimed_until = $2
            WHERE id IN (
                SELECT id FROM promoter_resume_outbox
                WHERE claimed_until IS NULL OR claimed_until <= $1
                ORDER BY id
                LIMIT $3
                FOR UPDATE SKIP LOCKED
            )
            RETURNING id, execution_id, token, outcome, enqueued_at
            "#,
        )
        .bind(now)
        .bind(now + lease)
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await?;

        // RETURNING order is unspecified
        rows.sort_by_key(|row| row.id);
        rows.into_iter().map(ResumeRequest::try_from).collect()
    }

    async fn acknowledge_resume(&self, outbox_id: i64) -> TokenResult<()> {
        sqlx::query("DELETE FROM promoter_resume_outbox WHERE id = $1")
            .bind(outbox_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn release_resume(&self, outbox_id: i64) -> TokenResult<()> {
        sqlx::query("UPDATE promoter_resume_outbox SET claimed_until = NULL WHERE id = $1")
            .bind(outbox_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[sqlx::test]
    #[ignore = "requires DATABASE_URL"]
    async fn test_resolve_once_in_postgres(pool: PgPool) {
        let store = PgTokenStore::new(pool);
        let now = Utc::now();
        let token =
            CallbackToken::new("pg-token".into(), Uuid::new_v4(), now, chrono::Duration::days(7));
        store.insert(&token).await.unwrap();

        assert!(store
            .resolve_and_enqueue("pg-token", TokenOutcome::Approved, now)
            .await
            .unwrap()
            .is_some());
        assert!(store
            .resolve_and_enqueue("pg-token", TokenOutcome::Rejected, now)
            .await
            .unwrap()
            .is_none());

        let lease = Duration::minutes(5);
        let pending = store.claim_pending_resumes(10, now, lease).await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].outcome, TokenOutcome::Approved);
        assert!(store.claim_pending_resumes(10, now, lease).await.unwrap().is_empty());

        // Unacknowledged entries return after the lease; acknowledged ones are gone
        let reclaimed = store
            .claim_pending_resumes(10, now + lease, lease)
            .await
            .unwrap();
        assert_eq!(reclaimed, pending);
        store.acknowledge_resume(pending[0].outbox_id).await.unwrap();
        assert!(store
            .claim_pending_resumes(10, now + lease * 2, lease)
            .await
            .unwrap()
            .is_empty());
    }

    #[sqlx::test]
    #[ignore = "requires DATABASE_URL"]
    async fn test_unknown_token_in_postgres(pool: PgPool) {
        let store = PgTokenStore::new(pool);
        assert!(matches!(
            store
                .resolve_and_enqueue("missing", TokenOutcome::Approved, Utc::now())
                .await,
            Err(TokenError::NotFound)
        ));
    }
}
