//! # Callback Token Manager
//!
//! Issues single-use tokens that correlate a suspended execution with an external
//! decision and resolves each token exactly once.
//!
//! ## Resolution rules
//!
//! - The first `resolve` call on a live token wins and enqueues one resume request.
//! - Every later call returns `accepted = false` and changes nothing, whatever the decision.
//! - A token past its expiry resolves to the synthetic `Expired` outcome; the caller is
//!   told `accepted = false` and the execution is resumed once so it can fail.

use super::error::{TokenError, TokenResult};
use super::store::TokenStore;
use crate::logging::{log_error, log_token_operation};
use crate::models::{CallbackToken, Decision, TokenOutcome};
use crate::utils::Clock;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tracing::{debug, info, warn};
use uuid::Uuid;

const MAX_ISSUE_ATTEMPTS: u32 = 3;

/// Result of a `resolve` call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    /// Owning execution, when the token is known
    pub execution_id: Option<Uuid>,
    /// Whether this call's decision was recorded
    pub accepted: bool,
    /// Outcome now recorded on the token, if any
    pub outcome: Option<TokenOutcome>,
}

impl Resolution {
    fn rejected(token: Option<&CallbackToken>) -> Self {
        Self {
            execution_id: token.map(|t| t.execution_id),
            accepted: false,
            outcome: token.and_then(|t| t.resolution),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CallbackTokenManager {
    store: Arc<dyn TokenStore>,
    clock: Arc<dyn Clock>,
    resume_signal: Arc<Notify>,
}

impl CallbackTokenManager {
    pub fn new(store: Arc<dyn TokenStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            clock,
            resume_signal: Arc::new(Notify::new()),
        }
    }

    pub fn store(&self) -> Arc<dyn TokenStore> {
        Arc::clone(&self.store)
    }

    /// Woken whenever a resolution enqueues a resume request
    pub fn resume_signal(&self) -> Arc<Notify> {
        Arc::clone(&self.resume_signal)
    }

    /// 64 lowercase hex characters of OS randomness
    fn generate_token() -> String {
        format!("{}{}", Uuid::new_v4().simple(), Uuid::new_v4().simple())
    }

    /// Issue a fresh token bound to `execution_id`, valid for `ttl`
    pub async fn issue(&self, execution_id: Uuid, ttl: Duration) -> TokenResult<String> {
        let ttl =
            chrono::Duration::from_std(ttl).map_err(|e| TokenError::InvalidTtl(e.to_string()))?;

        for attempt in 1..=MAX_ISSUE_ATTEMPTS {
            let record =
                CallbackToken::new(Self::generate_token(), execution_id, self.clock.now(), ttl);
            match self.store.insert(&record).await {
                Ok(()) => {
                    log_token_operation(
                        "issue",
                        Some(execution_id),
                        "issued",
                        Some(&format!("expires_at={}", record.expires_at.to_rfc3339())),
                    );
                    return Ok(record.token);
                }
                Err(TokenError::Collision(_)) => {
                    warn!(attempt = attempt, "Callback token collision, regenerating");
                }
                Err(other) => return Err(other),
            }
        }

        Err(TokenError::Collision(MAX_ISSUE_ATTEMPTS))
    }

    /// Resolve `token` with a human decision. Unknown tokens are reported as not accepted.
    pub async fn resolve(&self, token: &str, decision: Decision) -> TokenResult<Resolution> {
        let Some(record) = self.store.get(token).await? else {
            log_token_operation("resolve", None, "unknown", None);
            return Ok(Resolution::rejected(None));
        };

        if record.is_resolved() {
            log_token_operation(
                "resolve",
                Some(record.execution_id),
                "already_resolved",
                Some(decision.as_str()),
            );
            return Ok(Resolution::rejected(Some(&record)));
        }

        let now = self.clock.now();
        if record.is_expired_at(now) {
            let outcome = self.expire(&record).await?;
            return Ok(Resolution {
                execution_id: Some(record.execution_id),
                accepted: false,
                outcome,
            });
        }

        match self
            .store
            .resolve_and_enqueue(token, decision.into(), now)
            .await?
        {
            Some(resolved) => {
                self.resume_signal.notify_one();
                log_token_operation(
                    "resolve",
                    Some(resolved.execution_id),
                    "accepted",
                    Some(decision.as_str()),
                );
                Ok(Resolution {
                    execution_id: Some(resolved.execution_id),
                    accepted: true,
                    outcome: resolved.resolution,
                })
            }
            None => {
                // Lost a race with a concurrent resolution
                let current = self.store.get(token).await?;
                Ok(Resolution::rejected(current.as_ref()))
            }
        }
    }

    /// Whether `token` is past its expiry at the current clock time
    pub async fn is_expired(&self, token: &str) -> TokenResult<bool> {
        let record = self.store.get(token).await?.ok_or(TokenError::NotFound)?;
        Ok(record.is_expired_at(self.clock.now()))
    }

    pub async fn lookup(&self, token: &str) -> TokenResult<Option<CallbackToken>> {
        self.store.get(token).await
    }

    /// Resolve `token` to `Expired` if it is unresolved and past its expiry.
    ///
    /// Returns the outcome recorded on the token afterwards.
    pub async fn expire_if_due(&self, token: &str) -> TokenResult<Option<TokenOutcome>> {
        let record = self.store.get(token).await?.ok_or(TokenError::NotFound)?;
        if record.is_resolved() || !record.is_expired_at(self.clock.now()) {
            return Ok(record.resolution);
        }
        self.expire(&record).await
    }

    /// Expire every overdue unresolved token, enqueuing one resume each
    pub async fn sweep_expired(&self) -> TokenResult<usize> {
        let overdue = self.store.expired_unresolved(self.clock.now()).await?;
        let mut expired = 0;
        for record in &overdue {
            if self.expire(record).await? == Some(TokenOutcome::Expired) {
                expired += 1;
            }
        }
        if expired > 0 {
            debug!(expired = expired, "Expiry sweep resolved overdue tokens");
        }
        Ok(expired)
    }

    /// Run [`sweep_expired`](Self::sweep_expired) every `interval`, forever
    pub async fn run_expiry_sweeper(self: Arc<Self>, interval: Duration) {
        info!(interval_secs = interval.as_secs(), "⏰ Token expiry sweeper started");
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            if let Err(e) = self.sweep_expired().await {
                log_error("callback_token_manager", "sweep_expired", &e.to_string(), None);
            }
        }
    }

    async fn expire(&self, record: &CallbackToken) -> TokenResult<Option<TokenOutcome>> {
        match self
            .store
            .resolve_and_enqueue(&record.token, TokenOutcome::Expired, self.clock.now())
            .await?
        {
            Some(_) => {
                self.resume_signal.notify_one();
                log_token_operation("expire", Some(record.execution_id), "expired", None);
                Ok(Some(TokenOutcome::Expired))
            }
            None => Ok(self
                .store
                .get(&record.token)
                .await?
                .and_then(|t| t.resolution)),
        }
    }
}
