//! # Promoter Bootstrap
//!
//! Wires stores, collaborators, executors and the engine into one running system, the
//! same way for the server binary and for integration tests.
//!
//! ## Key Features
//!
//! - **Store selection**: Postgres when `database.url` is set, in-memory otherwise
//! - **Simulated collaborators**: in-memory registry, scoring and serving target for
//!   environments without a real ML platform
//! - **Background loops**: resume dispatcher, token expiry sweeper and suspended-execution
//!   wake loop, stopped on shutdown
//! - **Startup recovery**: executions left `Running` by a previous process are driven on
//!   from their persisted step

use crate::callback::{
    CallbackTokenManager, InMemoryTokenStore, PgTokenStore, ResumeDispatcher, TokenStore,
};
use crate::collaborators::{
    FallbackNotifier, InMemoryModelRegistry, InMemoryScoringService, InMemoryServingTarget,
    LoggingNotifier, Notifier,
};
use crate::config::{DatabaseConfig, PromoterConfig};
use crate::database::{connect, ExecutionStore, InMemoryExecutionStore, PgExecutionStore};
use crate::error::Result;
use crate::executors::{builtin_registry, Collaborators};
use crate::models::PipelineDefinition;
use crate::orchestration::{promotion_pipeline, PassThroughPolicy, WorkflowEngine};
use crate::utils::Clock;
use crate::web::AppState;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Upper bound between outbox drains when no resolution signal arrives
pub const DISPATCH_INTERVAL: Duration = Duration::from_secs(5);

/// Persistence for executions and callback tokens
#[derive(Debug, Clone)]
pub struct Stores {
    pub executions: Arc<dyn ExecutionStore>,
    pub tokens: Arc<dyn TokenStore>,
}

impl Stores {
    pub fn in_memory() -> Self {
        Self {
            executions: Arc::new(InMemoryExecutionStore::new()),
            tokens: Arc::new(InMemoryTokenStore::new()),
        }
    }

    /// Postgres-backed stores when a URL is configured, in-memory otherwise
    pub async fn from_config(config: &DatabaseConfig) -> Result<Self> {
        match &config.url {
            Some(url) => {
                let pool = connect(url, config).await?;
                info!(max_connections = config.max_connections, "Using PostgreSQL stores");
                Ok(Self {
                    executions: Arc::new(PgExecutionStore::new(pool.clone())),
                    tokens: Arc::new(PgTokenStore::new(pool)),
                })
            }
            None => {
                warn!("No database.url configured; executions and tokens are kept in memory only");
                Ok(Self::in_memory())
            }
        }
    }
}

/// In-memory stand-ins for the external ML platform
pub fn simulated_collaborators(config: &PromoterConfig, clock: Arc<dyn Clock>) -> Collaborators {
    let notifier: Arc<dyn Notifier> = Arc::new(
        FallbackNotifier::new(Arc::new(LoggingNotifier), Arc::new(LoggingNotifier))
            .with_secondary_recipient(config.approval.fallback_recipient.clone()),
    );
    Collaborators {
        model_registry: Arc::new(InMemoryModelRegistry::new()),
        scoring: Arc::new(InMemoryScoringService::new(clock)),
        serving_target: Arc::new(InMemoryServingTarget::default()),
        notifier,
        canary_policy: Arc::new(PassThroughPolicy),
    }
}

/// A wired promoter: engine, token manager, dispatcher and the registered pipeline
pub struct PromoterSystem {
    pub config: PromoterConfig,
    pub engine: Arc<WorkflowEngine>,
    pub tokens: Arc<CallbackTokenManager>,
    pub dispatcher: Arc<ResumeDispatcher>,
    pub pipeline: PipelineDefinition,
    background: Vec<JoinHandle<()>>,
}

impl std::fmt::Debug for PromoterSystem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PromoterSystem")
            .field("pipeline", &self.pipeline.key())
            .field("background_tasks", &self.background.len())
            .finish()
    }
}

impl PromoterSystem {
    /// Build the system and register the promotion pipeline. Nothing runs until
    /// [`start_background`](Self::start_background).
    pub fn build(
        config: PromoterConfig,
        stores: Stores,
        collaborators: Collaborators,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        let tokens = Arc::new(CallbackTokenManager::new(
            Arc::clone(&stores.tokens),
            Arc::clone(&clock),
        ));
        let registry = builtin_registry(
            &config,
            &collaborators,
            Arc::clone(&tokens),
            Arc::clone(&clock),
        );
        let engine = Arc::new(WorkflowEngine::new(
            stores.executions,
            Arc::new(registry),
            Arc::clone(&tokens),
            Arc::clone(&clock),
        ));

        let pipeline = promotion_pipeline::build(&config.engine);
        engine.register_pipeline(pipeline.clone())?;

        let dispatcher = Arc::new(ResumeDispatcher::new(
            stores.tokens,
            engine.clone(),
            tokens.resume_signal(),
            clock,
        ));

        info!(pipeline = %pipeline.key(), "🚀 Promoter system assembled");
        Ok(Self {
            config,
            engine,
            tokens,
            dispatcher,
            pipeline,
            background: Vec::new(),
        })
    }

    pub fn app_state(&self) -> AppState {
        AppState::new(Arc::clone(&self.engine), self.pipeline.clone())
    }

    /// Re-drive interrupted executions, then spawn the resume dispatcher, the expiry
    /// sweeper and the wake loop
    pub fn start_background(&mut self) {
        let engine = Arc::clone(&self.engine);
        self.background.push(tokio::spawn(async move {
            match engine.recover_running().await {
                Ok(0) => {}
                Ok(recovered) => info!(recovered = recovered, "Interrupted executions recovered"),
                Err(e) => warn!(error = %e, "Could not list interrupted executions"),
            }
        }));

        let dispatcher = Arc::clone(&self.dispatcher);
        self.background
            .push(tokio::spawn(dispatcher.run(DISPATCH_INTERVAL)));

        let sweep_interval = self.config.engine.expiry_sweep_interval();
        let tokens = Arc::clone(&self.tokens);
        self.background
            .push(tokio::spawn(tokens.run_expiry_sweeper(sweep_interval)));

        let engine = Arc::clone(&self.engine);
        self.background
            .push(tokio::spawn(engine.run_wake_loop(sweep_interval)));
    }

    /// Stop background loops; suspended executions stay persisted
    pub fn shutdown(&mut self) {
        for handle in self.background.drain(..) {
            handle.abort();
        }
        info!("🛑 Promoter background tasks stopped");
    }
}

impl Drop for PromoterSystem {
    fn drop(&mut self) {
        for handle in &self.background {
            handle.abort();
        }
    }
}
