//! Approval notifications. Delivery is best-effort: a failure is surfaced as an
//! operational alert by the caller and never fails the execution.

use super::error::{CollaboratorResult, InjectedFaults};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalNotification {
    pub execution_id: Uuid,
    pub token: String,
    pub approve_url: String,
    pub reject_url: String,
    pub details_url: String,
    pub recipient: String,
    pub subject: String,
    pub timeout_description: String,
    pub model_name: Option<String>,
}

impl ApprovalNotification {
    /// Plain-text body used by text channels
    pub fn text_body(&self) -> String {
        let model = self.model_name.as_deref().unwrap_or("A new model");
        format!(
            "Hello,\n\n{model} has been tested and is ready for deployment.\n\n\
             Please approve to trigger phased deployment, or reject the change within {}, \
             or the model will be auto-rejected.\n\n\
             Approve -> {}\n\nReject -> {}\n\n\
             To view the current status of this workflow, visit: {}\n",
            self.timeout_description, self.approve_url, self.reject_url, self.details_url
        )
    }
}

#[async_trait]
pub trait Notifier: Send + Sync + std::fmt::Debug {
    async fn deliver(&self, notification: &ApprovalNotification) -> CollaboratorResult<()>;

    /// Channel name for logs
    fn channel(&self) -> &str;
}

/// Writes the notification to the log; used when no real transport is wired
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingNotifier;

#[async_trait]
impl Notifier for LoggingNotifier {
    async fn deliver(&self, notification: &ApprovalNotification) -> CollaboratorResult<()> {
        info!(
            execution_id = %notification.execution_id,
            recipient = %notification.recipient,
            subject = %notification.subject,
            approve_url = %notification.approve_url,
            reject_url = %notification.reject_url,
            "📧 Approval notification"
        );
        Ok(())
    }

    fn channel(&self) -> &str {
        "log"
    }
}

/// Keeps every delivered notification in memory
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    name: String,
    delivered: Mutex<Vec<ApprovalNotification>>,
    faults: InjectedFaults,
}

impl RecordingNotifier {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn faults(&self) -> &InjectedFaults {
        &self.faults
    }

    pub fn delivered(&self) -> Vec<ApprovalNotification> {
        self.delivered.lock().clone()
    }

    pub fn last(&self) -> Option<ApprovalNotification> {
        self.delivered.lock().last().cloned()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn deliver(&self, notification: &ApprovalNotification) -> CollaboratorResult<()> {
        self.faults.next()?;
        self.delivered.lock().push(notification.clone());
        Ok(())
    }

    fn channel(&self) -> &str {
        &self.name
    }
}

/// Try the primary channel, then the secondary; if both fail, report the primary error
#[derive(Debug, Clone)]
pub struct FallbackNotifier {
    primary: Arc<dyn Notifier>,
    secondary: Arc<dyn Notifier>,
    secondary_recipient: Option<String>,
}

impl FallbackNotifier {
    pub fn new(primary: Arc<dyn Notifier>, secondary: Arc<dyn Notifier>) -> Self {
        Self {
            primary,
            secondary,
            secondary_recipient: None,
        }
    }

    /// Address the fallback message to a different recipient
    pub fn with_secondary_recipient(mut self, recipient: Option<String>) -> Self {
        self.secondary_recipient = recipient;
        self
    }
}

#[async_trait]
impl Notifier for FallbackNotifier {
    async fn deliver(&self, notification: &ApprovalNotification) -> CollaboratorResult<()> {
        let primary_error = match self.primary.deliver(notification).await {
            Ok(()) => return Ok(()),
            Err(error) => error,
        };

        warn!(
            execution_id = %notification.execution_id,
            primary = %self.primary.channel(),
            secondary = %self.secondary.channel(),
            error = %primary_error,
            "Primary notification channel failed, falling back"
        );

        let mut fallback = notification.clone();
        if let Some(recipient) = &self.secondary_recipient {
            fallback.recipient = recipient.clone();
        }
        match self.secondary.deliver(&fallback).await {
            Ok(()) => Ok(()),
            Err(_) => Err(primary_error),
        }
    }

    fn channel(&self) -> &str {
        self.primary.channel()
    }
}
