//! # Token Store
//!
//! Persistence for callback tokens and the resume outbox. Marking a token resolved and
//! enqueuing its resume request happen in one critical section (in memory) or one
//! transaction (PostgreSQL), so a resolved token always has exactly one resume queued.
//!
//! Outbox entries are claimed under a lease and deleted only once acknowledged. An entry
//! whose dispatcher died mid-resume becomes claimable again when its lease runs out.

use super::error::{TokenError, TokenResult};
use crate::models::{CallbackToken, ResumeRequest, TokenOutcome};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};

#[async_trait]
pub trait TokenStore: Send + Sync + std::fmt::Debug {
    /// Insert a freshly issued token; fails with `Collision` if the value already exists
    async fn insert(&self, token: &CallbackToken) -> TokenResult<()>;

    async fn get(&self, token: &str) -> TokenResult<Option<CallbackToken>>;

    /// Atomically resolve an unresolved token and append a resume request to the outbox.
    ///
    /// Returns the resolved token when this call won, `None` when the token had already
    /// been resolved, and `NotFound` when it never existed.
    async fn resolve_and_enqueue(
        &self,
        token: &str,
        outcome: TokenOutcome,
        at: DateTime<Utc>,
    ) -> TokenResult<Option<CallbackToken>>;

    /// Unresolved tokens whose expiry is at or before `now`
    async fn expired_unresolved(&self, now: DateTime<Utc>) -> TokenResult<Vec<CallbackToken>>;

    /// Lease up to `limit` unclaimed (or lease-expired) outbox entries in enqueue order.
    ///
    /// Claimed entries stay in the outbox until acknowledged or released.
    async fn claim_pending_resumes(
        &self,
        limit: usize,
        now: DateTime<Utc>,
        lease: Duration,
    ) -> TokenResult<Vec<ResumeRequest>>;

    /// Delete an entry whose resume the engine has handled
    async fn acknowledge_resume(&self, outbox_id: i64) -> TokenResult<()>;

    /// Drop the claim on an entry whose dispatch failed so the next pass retries it
    async fn release_resume(&self, outbox_id: i64) -> TokenResult<()>;
}

#[derive(Debug)]
struct OutboxEntry {
    request: ResumeRequest,
    claimed_until: Option<DateTime<Utc>>,
}

#[derive(Debug, Default)]
struct TokenTables {
    tokens: HashMap<String, CallbackToken>,
    outbox: BTreeMap<i64, OutboxEntry>,
    next_outbox_id: i64,
}

/// Process-local token store for development and tests
#[derive(Debug, Default)]
pub struct InMemoryTokenStore {
    tables: Mutex<TokenTables>,
}

impl InMemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Outbox entries not yet acknowledged, claimed or not
    pub fn pending_resume_count(&self) -> usize {
        self.tables.lock().outbox.len()
    }
}

#[async_trait]
impl TokenStore for InMemoryTokenStore {
    async fn insert(&self, token: &CallbackToken) -> TokenResult<()> {
        let mut tables = self.tables.lock();
        if tables.tokens.contains_key(&token.token) {
            return Err(TokenError::Collision(1));
        }
        tables.tokens.insert(token.token.clone(), token.clone());
        Ok(())
    }

    async fn get(&self, token: &str) -> TokenResult<Option<CallbackToken>> {
        Ok(self.tables.lock().tokens.get(token).cloned())
    }

    async fn resolve_and_enqueue(
        &self,
        token: &str,
        outcome: TokenOutcome,
        at: DateTime<Utc>,
    ) -> TokenResult<Option<CallbackToken>> {
        let mut tables = self.tables.lock();
        let record = tables.tokens.get_mut(token).ok_or(TokenError::NotFound)?;
        if record.is_resolved() {
            return Ok(None);
        }

        record.resolution = Some(outcome);
        record.resolved_at = Some(at);
        let resolved = record.clone();

        tables.next_outbox_id += 1;
        let outbox_id = tables.next_outbox_id;
        tables.outbox.insert(
            outbox_id,
            OutboxEntry {
                request: ResumeRequest {
                    outbox_id,
                    execution_id: resolved.execution_id,
                    token: resolved.token.clone(),
                    outcome,
                    enqueued_at: at,
                },
                claimed_until: None,
            },
        );
        Ok(Some(resolved))
    }

    async fn expired_unresolved(&self, now: DateTime<Utc>) -> TokenResult<Vec<CallbackToken>> {
        Ok(self
            .tables
            .lock()
            .tokens
            .values()
            .filter(|t| !t.is_resolved() && t.is_expired_at(now))
            .cloned()
            .collect())
    }

    async fn claim_pending_resumes(
        &self,
        limit: usize,
        now: DateTime<Utc>,
        lease: Duration,
    ) -> TokenResult<Vec<ResumeRequest>> {
        let mut tables = self.tables.lock();
        Ok(tables
            .outbox
            .values_mut()
            .filter(|entry| !matches!(entry.claimed_until, Some(until) if until > now))
            .take(limit)
            .map(|entry| {
                entry.claimed_until = Some(now + lease);
                entry.request.clone()
            })
            .collect())
    }

    async fn acknowledge_resume(&self, outbox_id: i64) -> TokenResult<()> {
        self.tables.lock().outbox.remove(&outbox_id);
        Ok(())
    }

    async fn release_resume(&self, outbox_id: i64) -> TokenResult<()> {
        if let Some(entry) = self.tables.lock().outbox.get_mut(&outbox_id) {
            entry.claimed_until = None;
        }
        Ok(())
    }
}
