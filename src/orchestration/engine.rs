//! # Workflow Engine
//!
//! Drives executions of registered pipelines through their step graphs.
//!
//! ## Execution loop
//!
//! Each pass looks at the execution's `current_step` and acts on its kind:
//!
//! - **Task**: run the bound executor. Output is written under the step's result path and
//!   the cursor advances; a transient failure is retried in place per the step's
//!   [`RetryPolicy`](crate::resilience::RetryPolicy); a `Pending` outcome suspends the
//!   execution on a callback token.
//! - **Choice**: pick the next step from the context; no match is a `ConfigurationError`.
//! - **Wait**: sleep on the runtime, then advance.
//! - **Fail** / **Succeed**: terminal.
//!
//! Every transition is persisted before the next step runs, so a suspended execution can
//! be reloaded and resumed by another process.
//!
//! ## Concurrency
//!
//! A per-execution async mutex serializes `start`, `resume` and background drives of the
//! same execution. Executions never share state, so different executions proceed in
//! parallel.

use crate::callback::{CallbackTokenManager, ResumeHandler};
use crate::constants::causes;
use crate::database::ExecutionStore;
use crate::error::{ErrorCode, PromoterError, Result};
use crate::executors::{ExecutorRegistry, TaskInput, TaskOutcome};
use crate::logging::{log_error, log_execution_operation, log_step_operation};
use crate::models::{
    Execution, PipelineDefinition, ResumeRequest, StepDefinition, TaskStep, TokenOutcome,
};
use crate::orchestration::choice;
use crate::resilience::{PollScheduler, RetryDecision};
use crate::state_machine::execution_state_machine::apply;
use crate::state_machine::{ExecutionEvent, ExecutionStatus};
use crate::utils::Clock;
use async_trait::async_trait;
use dashmap::DashMap;
use futures::stream::{self, StreamExt};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

/// Executions woken at once by [`WorkflowEngine::wake_suspended`]
const WAKE_CONCURRENCY: usize = 16;

/// Signal delivered to a suspended execution
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExternalEvent {
    /// The token was resolved; the outcome is read back from the token store
    CallbackResolved { token: String },
    /// Re-check the pending token, expiring it if overdue
    Wake,
}

pub struct WorkflowEngine {
    store: Arc<dyn ExecutionStore>,
    executors: Arc<ExecutorRegistry>,
    tokens: Arc<CallbackTokenManager>,
    clock: Arc<dyn Clock>,
    scheduler: PollScheduler,
    definitions: DashMap<String, Arc<PipelineDefinition>>,
    locks: DashMap<Uuid, Arc<Mutex<()>>>,
}

impl std::fmt::Debug for WorkflowEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkflowEngine")
            .field("pipelines", &self.pipeline_keys())
            .field("executors", &self.executors)
            .field("active_locks", &self.locks.len())
            .finish()
    }
}

impl WorkflowEngine {
    pub fn new(
        store: Arc<dyn ExecutionStore>,
        executors: Arc<ExecutorRegistry>,
        tokens: Arc<CallbackTokenManager>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            executors,
            tokens,
            clock,
            scheduler: PollScheduler::new(),
            definitions: DashMap::new(),
            locks: DashMap::new(),
        }
    }

    pub fn tokens(&self) -> Arc<CallbackTokenManager> {
        Arc::clone(&self.tokens)
    }

    /// Validate and register a definition under `name@version`.
    ///
    /// Every Task must name a registered executor.
    pub fn register_pipeline(&self, definition: PipelineDefinition) -> Result<()> {
        definition.validate()?;

        let missing: Vec<&str> = definition
            .executors()
            .filter(|name| !self.executors.contains(name))
            .collect();
        if !missing.is_empty() {
            return Err(PromoterError::InvalidDefinition(format!(
                "{}: unknown executors {}",
                definition.key(),
                missing.join(", ")
            )));
        }

        let key = definition.key();
        info!(pipeline = %key, steps = definition.steps.len(), "Registered pipeline");
        self.definitions.insert(key, Arc::new(definition));
        Ok(())
    }

    pub fn pipeline(&self, key: &str) -> Option<Arc<PipelineDefinition>> {
        self.definitions.get(key).map(|entry| Arc::clone(entry.value()))
    }

    pub fn pipeline_keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.definitions.iter().map(|e| e.key().clone()).collect();
        keys.sort();
        keys
    }

    /// Create an execution and drive it inline until it suspends or ends
    pub async fn start(&self, definition: &PipelineDefinition, input: Value) -> Result<Uuid> {
        let definition = self.ensure_registered(definition)?;
        let execution = self.create_execution(&definition, input).await?;
        let execution_id = execution.execution_id;

        let lock = self.lock_for(execution_id);
        let _guard = lock.lock().await;
        let mut execution = execution;
        self.drive(&mut execution, &definition).await?;
        self.release_if_terminal(&execution);
        Ok(execution_id)
    }

    /// Persist a new execution and drive it on the runtime; returns once it is persisted
    pub async fn submit(
        self: &Arc<Self>,
        definition: &PipelineDefinition,
        input: Value,
    ) -> Result<Uuid> {
        let definition = self.ensure_registered(definition)?;
        let execution = self.create_execution(&definition, input).await?;
        let execution_id = execution.execution_id;

        let engine = Arc::clone(self);
        tokio::spawn(async move {
            let lock = engine.lock_for(execution_id);
            let _guard = lock.lock().await;
            // Reload under the lock; a resume may not touch it before the first drive
            let result = match engine.store.load(execution_id).await {
                Ok(Some(mut execution)) => engine
                    .drive(&mut execution, &definition)
                    .await
                    .map(|()| engine.release_if_terminal(&execution)),
                Ok(None) => Err(PromoterError::ExecutionNotFound(execution_id)),
                Err(e) => Err(e.into()),
            };
            if let Err(e) = result {
                log_error(
                    "workflow_engine",
                    "background_drive",
                    &e.to_string(),
                    Some(&execution_id.to_string()),
                );
            }
        });

        Ok(execution_id)
    }

    /// Deliver an external event to an execution.
    ///
    /// Terminal executions ignore every event. A suspended execution only reacts to its
    /// own pending token; stale tokens are ignored. Returns the status afterwards.
    #[instrument(skip(self))]
    pub async fn resume(
        &self,
        execution_id: Uuid,
        event: ExternalEvent,
    ) -> Result<ExecutionStatus> {
        let lock = self.lock_for(execution_id);
        let _guard = lock.lock().await;

        let mut execution = self
            .store
            .load(execution_id)
            .await?
            .ok_or(PromoterError::ExecutionNotFound(execution_id))?;

        if execution.is_terminal() {
            debug!(status = %execution.status, "Resume ignored for terminal execution");
            return Ok(execution.status);
        }
        let Some(pending) = execution.pending_token.clone() else {
            debug!(status = %execution.status, "Resume ignored, execution is not suspended");
            return Ok(execution.status);
        };

        let outcome = match &event {
            ExternalEvent::CallbackResolved { token } if *token != pending => {
                warn!("Ignoring resume for a token the execution is no longer waiting on");
                return Ok(execution.status);
            }
            ExternalEvent::CallbackResolved { .. } => self
                .tokens
                .lookup(&pending)
                .await?
                .and_then(|record| record.resolution),
            ExternalEvent::Wake => self.tokens.expire_if_due(&pending).await?,
        };

        let Some(outcome) = outcome else {
            debug!("Pending token not resolved yet, staying suspended");
            return Ok(execution.status);
        };

        let definition = self.definition_for(&execution)?;
        self.apply_outcome(&mut execution, &definition, &pending, outcome)
            .await?;
        self.drive(&mut execution, &definition).await?;
        self.release_if_terminal(&execution);
        Ok(execution.status)
    }

    pub async fn get_status(&self, execution_id: Uuid) -> Result<Execution> {
        self.store
            .load(execution_id)
            .await?
            .ok_or(PromoterError::ExecutionNotFound(execution_id))
    }

    /// Wake every suspended execution, expiring overdue tokens. Returns how many ended.
    pub async fn wake_suspended(&self) -> Result<usize> {
        let suspended = self.store.suspended_ids().await?;
        let statuses: Vec<Result<ExecutionStatus>> = stream::iter(suspended)
            .map(|execution_id| self.resume(execution_id, ExternalEvent::Wake))
            .buffer_unordered(WAKE_CONCURRENCY)
            .collect()
            .await;

        let mut ended = 0;
        for status in statuses {
            if status?.is_terminal() {
                ended += 1;
            }
        }
        Ok(ended)
    }

    /// Run [`wake_suspended`](Self::wake_suspended) now and then every `interval`, forever.
    ///
    /// Re-delivers resolutions whose outbox entry is still leased by a dispatcher that
    /// went away, and expires overdue tokens.
    pub async fn run_wake_loop(self: Arc<Self>, interval: Duration) {
        info!(interval_secs = interval.as_secs(), "⏰ Suspended-execution wake loop started");
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            match self.wake_suspended().await {
                Ok(ended) if ended > 0 => debug!(ended = ended, "Wake pass ended executions"),
                Ok(_) => {}
                Err(e) => log_error("workflow_engine", "wake_suspended", &e.to_string(), None),
            }
        }
    }

    /// Continue every execution persisted as `Running` from its stored `current_step`.
    ///
    /// Meant for startup: a drive interrupted by a crash or shutdown leaves the execution
    /// `Running` with nothing driving it. The step that was in flight runs again. Returns
    /// how many executions were re-driven.
    pub async fn recover_running(&self) -> Result<usize> {
        let running = self.store.running_ids().await?;
        if running.is_empty() {
            return Ok(0);
        }
        info!(count = running.len(), "Re-driving executions interrupted mid-drive");

        let results: Vec<(Uuid, Result<ExecutionStatus>)> = stream::iter(running)
            .map(|execution_id| async move { (execution_id, self.redrive(execution_id).await) })
            .buffer_unordered(WAKE_CONCURRENCY)
            .collect()
            .await;

        let mut recovered = 0;
        for (execution_id, result) in results {
            match result {
                Ok(_) => recovered += 1,
                Err(e) => log_error(
                    "workflow_engine",
                    "recover_running",
                    &e.to_string(),
                    Some(&execution_id.to_string()),
                ),
            }
        }
        Ok(recovered)
    }

    async fn redrive(&self, execution_id: Uuid) -> Result<ExecutionStatus> {
        let lock = self.lock_for(execution_id);
        let _guard = lock.lock().await;

        let mut execution = self
            .store
            .load(execution_id)
            .await?
            .ok_or(PromoterError::ExecutionNotFound(execution_id))?;
        // Someone drove it to a stop since the listing was taken
        if execution.status != ExecutionStatus::Running {
            return Ok(execution.status);
        }

        let definition = self.definition_for(&execution)?;
        log_execution_operation(
            "recover",
            execution_id,
            Some(&definition.key()),
            execution.status.as_str(),
            execution.current_step.as_deref(),
        );
        self.drive(&mut execution, &definition).await?;
        self.release_if_terminal(&execution);
        Ok(execution.status)
    }

    fn ensure_registered(
        &self,
        definition: &PipelineDefinition,
    ) -> Result<Arc<PipelineDefinition>> {
        if let Some(registered) = self.pipeline(&definition.key()) {
            return Ok(registered);
        }
        self.register_pipeline(definition.clone())?;
        self.pipeline(&definition.key())
            .ok_or_else(|| PromoterError::PipelineNotRegistered(definition.key()))
    }

    fn definition_for(&self, execution: &Execution) -> Result<Arc<PipelineDefinition>> {
        let key = execution.pipeline_key();
        self.pipeline(&key)
            .ok_or(PromoterError::PipelineNotRegistered(key))
    }

    async fn create_execution(
        &self,
        definition: &PipelineDefinition,
        input: Value,
    ) -> Result<Execution> {
        let execution = Execution::new(
            &definition.name,
            &definition.version,
            &definition.start_at,
            input,
            self.clock.now(),
        );
        self.store.create(&execution).await?;
        log_execution_operation(
            "create",
            execution.execution_id,
            Some(&definition.key()),
            execution.status.as_str(),
            None,
        );
        Ok(execution)
    }

    fn lock_for(&self, execution_id: Uuid) -> Arc<Mutex<()>> {
        Arc::clone(self.locks.entry(execution_id).or_default().value())
    }

    fn release_if_terminal(&self, execution: &Execution) {
        if execution.is_terminal() {
            self.locks.remove(&execution.execution_id);
        }
    }

    /// Apply a token outcome to the suspended Task step
    async fn apply_outcome(
        &self,
        execution: &mut Execution,
        definition: &PipelineDefinition,
        token: &str,
        outcome: TokenOutcome,
    ) -> Result<()> {
        let now = self.clock.now();
        log_execution_operation(
            "resume",
            execution.execution_id,
            Some(&definition.key()),
            outcome.as_str(),
            execution.current_step.as_deref(),
        );

        match outcome {
            TokenOutcome::Approved => {
                apply(execution, ExecutionEvent::Resume, now)?;
                let step = execution
                    .current_step
                    .as_deref()
                    .and_then(|s| definition.step(s));
                let task = match step {
                    Some(StepDefinition::Task(task)) => task.clone(),
                    _ => {
                        self.fail(
                            execution,
                            ErrorCode::ConfigurationError,
                            "suspended step is not a Task step".to_string(),
                        )
                        .await?;
                        return Ok(());
                    }
                };
                execution.write_result(
                    &task.result_path,
                    json!({
                        "decision": outcome.as_str(),
                        "token": token,
                        "resolved_at": now,
                    }),
                );
                execution.advance_to(task.next.clone(), now);
                self.store.save(execution).await?;
            }
            TokenOutcome::Rejected => {
                self.fail(
                    execution,
                    ErrorCode::ApprovalRejected,
                    causes::APPROVAL_REJECTED.to_string(),
                )
                .await?;
            }
            TokenOutcome::Expired => {
                self.fail(
                    execution,
                    ErrorCode::ApprovalExpired,
                    causes::APPROVAL_TIMED_OUT.to_string(),
                )
                .await?;
            }
        }
        Ok(())
    }

    /// Run steps until the execution suspends or reaches a terminal status
    async fn drive(
        &self,
        execution: &mut Execution,
        definition: &PipelineDefinition,
    ) -> Result<()> {
        while execution.status == ExecutionStatus::Running {
            let Some(step_name) = execution.current_step.clone() else {
                self.succeed(execution).await?;
                break;
            };
            let Some(step) = definition.step(&step_name) else {
                self.fail(
                    execution,
                    ErrorCode::ConfigurationError,
                    format!("step '{step_name}' is not defined"),
                )
                .await?;
                break;
            };

            match step {
                StepDefinition::Task(task) => self.run_task(execution, &step_name, task).await?,
                StepDefinition::Choice(choice_step) => {
                    match choice::select_next(choice_step, &execution.context) {
                        Some(next) => {
                            debug!(
                                execution_id = %execution.execution_id,
                                step = %step_name,
                                next = %next,
                                "Choice selected branch"
                            );
                            execution.advance_to(Some(next.to_string()), self.clock.now());
                            self.store.save(execution).await?;
                        }
                        None => {
                            self.fail(
                                execution,
                                ErrorCode::ConfigurationError,
                                format!("{step_name}: {}", causes::NO_CHOICE_MATCHED),
                            )
                            .await?;
                        }
                    }
                }
                StepDefinition::Wait(wait) => {
                    log_step_operation(
                        "wait",
                        execution.execution_id,
                        &step_name,
                        execution.attempt,
                        "waiting",
                        Some(&format!("seconds={}", wait.seconds)),
                    );
                    self.scheduler.wait(Duration::from_secs(wait.seconds)).await;
                    execution.advance_to(Some(wait.next.clone()), self.clock.now());
                    self.store.save(execution).await?;
                }
                StepDefinition::Fail(fail) => {
                    self.fail(execution, fail.error, fail.cause.clone()).await?;
                }
                StepDefinition::Succeed => {
                    self.succeed(execution).await?;
                }
            }
        }
        Ok(())
    }

    /// Run one Task step, retrying in place per its policy
    async fn run_task(
        &self,
        execution: &mut Execution,
        step_name: &str,
        task: &TaskStep,
    ) -> Result<()> {
        let Some(executor) = self.executors.get(&task.executor) else {
            return self
                .fail(
                    execution,
                    ErrorCode::ConfigurationError,
                    format!("{step_name}: no executor named '{}'", task.executor),
                )
                .await;
        };

        loop {
            execution.attempt += 1;
            execution.updated_at = self.clock.now();
            self.store.save(execution).await?;
            log_step_operation(
                "execute",
                execution.execution_id,
                step_name,
                execution.attempt,
                "started",
                Some(&task.executor),
            );

            let outcome = executor
                .execute(TaskInput {
                    execution_id: execution.execution_id,
                    step_name,
                    attempt: execution.attempt,
                    parameters: &task.parameters,
                    context: &execution.context,
                })
                .await;

            let error = match outcome {
                Ok(TaskOutcome::Completed(output)) => {
                    log_step_operation(
                        "execute",
                        execution.execution_id,
                        step_name,
                        execution.attempt,
                        "completed",
                        None,
                    );
                    execution.write_result(&task.result_path, output);
                    execution.advance_to(task.next.clone(), self.clock.now());
                    self.store.save(execution).await?;
                    return Ok(());
                }
                Ok(TaskOutcome::Pending { token }) => {
                    apply(execution, ExecutionEvent::Suspend { token }, self.clock.now())?;
                    self.store.save(execution).await?;
                    log_step_operation(
                        "execute",
                        execution.execution_id,
                        step_name,
                        execution.attempt,
                        "suspended",
                        None,
                    );
                    return Ok(());
                }
                Err(error) => error,
            };

            let decision = task
                .retry
                .as_ref()
                .map(|policy| policy.decide(error.code, execution.attempt))
                .unwrap_or(RetryDecision::NotRetryable);

            match decision {
                RetryDecision::RetryAfter(delay) => {
                    log_step_operation(
                        "execute",
                        execution.execution_id,
                        step_name,
                        execution.attempt,
                        "retrying",
                        Some(&format!("{error}; next attempt in {}s", delay.as_secs())),
                    );
                    self.scheduler.wait(delay).await;
                }
                RetryDecision::Exhausted => {
                    return self
                        .fail(
                            execution,
                            ErrorCode::AttemptsExhausted,
                            format!(
                                "{step_name}: gave up after {} attempts: {}",
                                execution.attempt, error.message
                            ),
                        )
                        .await;
                }
                RetryDecision::NotRetryable => {
                    return self.fail(execution, error.code, error.message).await;
                }
            }
        }
    }

    async fn succeed(&self, execution: &mut Execution) -> Result<()> {
        apply(execution, ExecutionEvent::Succeed, self.clock.now())?;
        self.store.save(execution).await?;
        log_execution_operation(
            "complete",
            execution.execution_id,
            Some(&execution.pipeline_key()),
            execution.status.as_str(),
            None,
        );
        Ok(())
    }

    async fn fail(
        &self,
        execution: &mut Execution,
        code: ErrorCode,
        cause: String,
    ) -> Result<()> {
        apply(execution, ExecutionEvent::fail_with(code, cause.clone()), self.clock.now())?;
        self.store.save(execution).await?;
        log_execution_operation(
            "complete",
            execution.execution_id,
            Some(&execution.pipeline_key()),
            execution.status.as_str(),
            Some(&format!("{code}: {cause}")),
        );
        Ok(())
    }
}

#[async_trait]
impl ResumeHandler for WorkflowEngine {
    async fn handle_resume(&self, request: &ResumeRequest) -> Result<()> {
        self.resume(
            request.execution_id,
            ExternalEvent::CallbackResolved {
                token: request.token.clone(),
            },
        )
        .await
        .map(|_| ())
    }
}
