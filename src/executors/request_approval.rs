//! # Approval Request
//!
//! Issues a callback token for the execution, tells a human reviewer how to respond and
//! parks the execution. The decision arrives later through `GET /respond` and resumes the
//! execution through the callback outbox.
//!
//! Delivery is best-effort: a notifier failure is raised as an operational alert and the
//! execution still suspends, since the token remains resolvable and expires on its own.

use super::task_executor::{StepError, TaskExecutor, TaskInput, TaskOutcome};
use crate::callback::CallbackTokenManager;
use crate::collaborators::{ApprovalNotification, Notifier};
use crate::config::ApprovalConfig;
use crate::constants::{actions, executors, pointers};
use crate::logging::log_error;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{error, info};
use uuid::Uuid;

/// Approve/reject link for `token`.
///
/// A base URL that already carries a query string is taken as the respond endpoint
/// itself and extended with `&`.
pub fn response_url(base_url: &str, token: &str, action: &str) -> String {
    if base_url.contains('?') {
        format!("{base_url}&token={token}&action={action}")
    } else {
        format!(
            "{}/respond?token={token}&action={action}",
            base_url.trim_end_matches('/')
        )
    }
}

/// Link to the execution status resource
pub fn details_url(base_url: &str, execution_id: Uuid) -> String {
    let base = base_url.split('?').next().unwrap_or(base_url);
    format!("{}/v1/executions/{execution_id}", base.trim_end_matches('/'))
}

#[derive(Debug)]
pub struct RequestApprovalExecutor {
    tokens: Arc<CallbackTokenManager>,
    notifier: Arc<dyn Notifier>,
    config: ApprovalConfig,
}

impl RequestApprovalExecutor {
    pub fn new(
        tokens: Arc<CallbackTokenManager>,
        notifier: Arc<dyn Notifier>,
        config: ApprovalConfig,
    ) -> Self {
        Self {
            tokens,
            notifier,
            config,
        }
    }

    fn notification(
        &self,
        execution_id: Uuid,
        token: &str,
        model_name: Option<&str>,
    ) -> ApprovalNotification {
        let base = &self.config.public_base_url;
        ApprovalNotification {
            execution_id,
            token: token.to_string(),
            approve_url: response_url(base, token, actions::APPROVED),
            reject_url: response_url(base, token, actions::REJECTED),
            details_url: details_url(base, execution_id),
            recipient: self.config.recipient.clone(),
            subject: self.config.subject.clone(),
            timeout_description: self.config.timeout_description.clone(),
            model_name: model_name.map(str::to_string),
        }
    }
}

#[async_trait]
impl TaskExecutor for RequestApprovalExecutor {
    fn name(&self) -> &str {
        executors::REQUEST_APPROVAL
    }

    async fn execute(&self, input: TaskInput<'_>) -> Result<TaskOutcome, StepError> {
        let token = self
            .tokens
            .issue(input.execution_id, self.config.token_ttl())
            .await
            .map_err(|e| StepError::transient(format!("failed to issue approval token: {e}")))?;

        let model_name = input
            .read(pointers::REGISTERED_MODEL_NAME)
            .and_then(|v| v.as_str());
        let notification = self.notification(input.execution_id, &token, model_name);

        match self.notifier.deliver(&notification).await {
            Ok(()) => info!(
                execution_id = %input.execution_id,
                channel = %self.notifier.channel(),
                recipient = %notification.recipient,
                "Approval request delivered"
            ),
            Err(e) => {
                error!(
                    alert = true,
                    execution_id = %input.execution_id,
                    channel = %self.notifier.channel(),
                    error = %e,
                    "Approval notification could not be delivered"
                );
                log_error(
                    "request_approval",
                    "deliver",
                    &e.to_string(),
                    Some(&input.execution_id.to_string()),
                );
            }
        }

        Ok(TaskOutcome::Pending { token })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::callback::InMemoryTokenStore;
    use crate::collaborators::{CollaboratorError, RecordingNotifier};
    use crate::utils::SystemClock;
    use serde_json::{json, Value};

    #[test]
    fn test_response_url_separator() {
        assert_eq!(
            response_url("https://approvals.example.com/", "abc", "Approved"),
            "https://approvals.example.com/respond?token=abc&action=Approved"
        );
        assert_eq!(
            response_url("https://gw.example.com/prod/respond?stage=prod", "abc", "Rejected"),
            "https://gw.example.com/prod/respond?stage=prod&token=abc&action=Rejected"
        );
    }

    #[test]
    fn test_details_url() {
        let id = Uuid::nil();
        assert_eq!(
            details_url("https://approvals.example.com", id),
            format!("https://approvals.example.com/v1/executions/{id}")
        );
    }

    fn executor(
        notifier: Arc<RecordingNotifier>,
    ) -> (RequestApprovalExecutor, Arc<CallbackTokenManager>) {
        let tokens = Arc::new(CallbackTokenManager::new(
            Arc::new(InMemoryTokenStore::new()),
            Arc::new(SystemClock),
        ));
        let executor =
            RequestApprovalExecutor::new(tokens.clone(), notifier, ApprovalConfig::default());
        (executor, tokens)
    }

    async fn run(executor: &RequestApprovalExecutor, execution_id: Uuid) -> TaskOutcome {
        let context = json!({"model_registration": {"model_name": "pipeline-1"}});
        let parameters = Value::Null;
        executor
            .execute(TaskInput {
                execution_id,
                step_name: "RequestApproval",
                attempt: 1,
                parameters: &parameters,
                context: &context,
            })
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_issues_token_and_notifies() {
        let notifier = Arc::new(RecordingNotifier::new("email"));
        let (executor, tokens) = executor(notifier.clone());
        let execution_id = Uuid::new_v4();

        let TaskOutcome::Pending { token } = run(&executor, execution_id).await else {
            panic!("expected suspension");
        };
        assert_eq!(token.len(), 64);

        let record = tokens.lookup(&token).await.unwrap().unwrap();
        assert_eq!(record.execution_id, execution_id);

        let sent = notifier.last().unwrap();
        assert!(sent.approve_url.ends_with(&format!("token={token}&action=Approved")));
        assert_eq!(sent.model_name.as_deref(), Some("pipeline-1"));
    }

    #[tokio::test]
    async fn test_delivery_failure_still_suspends() {
        let notifier = Arc::new(RecordingNotifier::new("email"));
        notifier
            .faults()
            .push(CollaboratorError::transient("email", "smtp down"), 1);
        let (executor, _) = executor(notifier.clone());

        let outcome = run(&executor, Uuid::new_v4()).await;
        assert!(matches!(outcome, TaskOutcome::Pending { .. }));
        assert!(notifier.delivered().is_empty());
    }
}
