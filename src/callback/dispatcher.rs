//! # Resume Dispatcher
//!
//! Claims resume requests from the outbox and hands each one to the engine. An entry is
//! acknowledged (deleted) only after the engine has handled it. A failed dispatch
//! releases the claim for the next pass, and a dispatcher that dies mid-resume leaves
//! its claims to lapse so another pass picks them up.
//!
//! Resumes run concurrently: one execution working through a long rollout never holds
//! back the others. The engine's per-execution lock keeps each execution single-writer.

use super::error::TokenResult;
use super::store::TokenStore;
use crate::error::Result;
use crate::logging::log_error;
use crate::models::ResumeRequest;
use crate::utils::Clock;
use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

const DEFAULT_BATCH_SIZE: usize = 50;

/// Resumes handled at once by [`ResumeDispatcher::drain`]
const DRAIN_CONCURRENCY: usize = 16;

/// How long a claimed entry stays invisible to other passes before it is redelivered
pub const DEFAULT_CLAIM_LEASE: Duration = Duration::from_secs(15 * 60);

/// Receiver of resume requests (implemented by the workflow engine)
#[async_trait]
pub trait ResumeHandler: Send + Sync {
    async fn handle_resume(&self, request: &ResumeRequest) -> Result<()>;
}

pub struct ResumeDispatcher {
    store: Arc<dyn TokenStore>,
    handler: Arc<dyn ResumeHandler>,
    signal: Arc<Notify>,
    clock: Arc<dyn Clock>,
    batch_size: usize,
    lease: chrono::Duration,
}

impl std::fmt::Debug for ResumeDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResumeDispatcher")
            .field("batch_size", &self.batch_size)
            .field("lease", &self.lease)
            .finish()
    }
}

impl ResumeDispatcher {
    pub fn new(
        store: Arc<dyn TokenStore>,
        handler: Arc<dyn ResumeHandler>,
        signal: Arc<Notify>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            handler,
            signal,
            clock,
            batch_size: DEFAULT_BATCH_SIZE,
            lease: chrono::Duration::seconds(DEFAULT_CLAIM_LEASE.as_secs() as i64),
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn with_claim_lease(mut self, lease: Duration) -> Self {
        self.lease = chrono::Duration::from_std(lease).unwrap_or(self.lease);
        self
    }

    /// Claim every entry currently eligible for dispatch
    async fn claim_all(&self) -> TokenResult<Vec<ResumeRequest>> {
        let mut claimed = Vec::new();
        loop {
            let batch = self
                .store
                .claim_pending_resumes(self.batch_size, self.clock.now(), self.lease)
                .await?;
            if batch.is_empty() {
                return Ok(claimed);
            }
            claimed.extend(batch);
        }
    }

    /// Hand one request to the engine, then acknowledge or release its outbox entry.
    /// Returns whether the engine handled it.
    async fn dispatch(&self, request: &ResumeRequest) -> TokenResult<bool> {
        match self.handler.handle_resume(request).await {
            Ok(()) => {
                self.store.acknowledge_resume(request.outbox_id).await?;
                Ok(true)
            }
            Err(error) => {
                log_error(
                    "resume_dispatcher",
                    "handle_resume",
                    &error.to_string(),
                    Some(&request.execution_id.to_string()),
                );
                Ok(false)
            }
        }
    }

    /// Dispatch every queued request and wait for the engine to handle them; returns how
    /// many were handled successfully
    pub async fn drain(&self) -> TokenResult<usize> {
        let requests = self.claim_all().await?;
        let outcomes: Vec<(i64, TokenResult<bool>)> = stream::iter(requests)
            .map(|request| async move { (request.outbox_id, self.dispatch(&request).await) })
            .buffer_unordered(DRAIN_CONCURRENCY)
            .collect()
            .await;

        let mut handled = 0;
        let mut failed = Vec::new();
        for (outbox_id, outcome) in outcomes {
            match outcome? {
                true => handled += 1,
                false => failed.push(outbox_id),
            }
        }
        // Released after the pass so a failing request is not retried within it
        for outbox_id in failed {
            self.store.release_resume(outbox_id).await?;
        }

        if handled > 0 {
            debug!(handled = handled, "Resume outbox drained");
        }
        Ok(handled)
    }

    /// Claim new requests whenever a resolution signals or `interval` elapses, forever.
    ///
    /// Each request runs on its own task. Aborting this future aborts the in-flight
    /// resumes; their entries stay claimed and are redelivered once the lease lapses.
    pub async fn run(self: Arc<Self>, interval: Duration) {
        info!(interval_ms = interval.as_millis() as u64, "🔄 Resume dispatcher started");
        let mut in_flight = JoinSet::new();
        loop {
            match self.claim_all().await {
                Ok(requests) => {
                    for request in requests {
                        let dispatcher = Arc::clone(&self);
                        in_flight.spawn(async move {
                            let released = match dispatcher.dispatch(&request).await {
                                Ok(true) => return,
                                Ok(false) => {
                                    dispatcher.store.release_resume(request.outbox_id).await
                                }
                                Err(error) => Err(error),
                            };
                            if let Err(error) = released {
                                log_error(
                                    "resume_dispatcher",
                                    "settle_outbox_entry",
                                    &error.to_string(),
                                    Some(&request.execution_id.to_string()),
                                );
                            }
                        });
                    }
                }
                Err(error) => log_error("resume_dispatcher", "claim", &error.to_string(), None),
            }

            let tick = tokio::time::sleep(interval);
            tokio::pin!(tick);
            loop {
                tokio::select! {
                    _ = self.signal.notified() => break,
                    _ = &mut tick => break,
                    Some(joined) = in_flight.join_next(), if !in_flight.is_empty() => {
                        if let Err(error) = joined {
                            warn!(error = %error, "Resume task ended abnormally");
                        }
                    }
                }
            }
        }
    }
}
