//! # Pipeline Definitions
//!
//! Immutable step graphs, registered once per `(name, version)`. Each step is a tagged
//! variant with an explicit successor so the engine matches on step kind exhaustively.
//! There is no fan-out: every non-terminal step names exactly one successor (a Choice
//! names one per rule, but selects exactly one).

use crate::error::{ErrorCode, PromoterError, Result};
use crate::resilience::RetryPolicy;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// A named, versioned step graph
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineDefinition {
    pub name: String,
    pub version: String,
    pub start_at: String,
    pub steps: HashMap<String, StepDefinition>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum StepDefinition {
    Task(TaskStep),
    Choice(ChoiceStep),
    Wait(WaitStep),
    Fail(FailStep),
    Succeed,
}

/// Invoke an executor and write its output under `/<result_path>`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskStep {
    pub executor: String,
    #[serde(default)]
    pub parameters: Value,
    pub result_path: String,
    #[serde(default)]
    pub retry: Option<RetryPolicy>,
    /// `None` ends the execution successfully
    #[serde(default)]
    pub next: Option<String>,
}

/// Ordered predicates over the context; first match wins
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChoiceStep {
    pub rules: Vec<ChoiceRule>,
    #[serde(default)]
    pub default: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChoiceRule {
    pub condition: Condition,
    pub next: String,
}

/// Predicate over JSON pointers into the execution context
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Condition {
    StringEquals { path: String, value: String },
    BooleanEquals { path: String, value: bool },
    NumericEquals { path: String, value: f64 },
    IsPresent { path: String, present: bool },
    And(Vec<Condition>),
    Or(Vec<Condition>),
    Not(Box<Condition>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WaitStep {
    pub seconds: u64,
    pub next: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailStep {
    pub error: ErrorCode,
    pub cause: String,
}

impl StepDefinition {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Task(_) => "Task",
            Self::Choice(_) => "Choice",
            Self::Wait(_) => "Wait",
            Self::Fail(_) => "Fail",
            Self::Succeed => "Succeed",
        }
    }

    /// Every step name this step can transition to
    pub fn successors(&self) -> Vec<&str> {
        match self {
            Self::Task(task) => task.next.as_deref().into_iter().collect(),
            Self::Choice(choice) => choice
                .rules
                .iter()
                .map(|rule| rule.next.as_str())
                .chain(choice.default.as_deref())
                .collect(),
            Self::Wait(wait) => vec![wait.next.as_str()],
            Self::Fail(_) | Self::Succeed => Vec::new(),
        }
    }
}

impl PipelineDefinition {
    pub fn new(
        name: impl Into<String>,
        version: impl Into<String>,
        start_at: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            start_at: start_at.into(),
            steps: HashMap::new(),
        }
    }

    /// Builder-style step insertion
    pub fn with_step(mut self, name: impl Into<String>, step: StepDefinition) -> Self {
        self.steps.insert(name.into(), step);
        self
    }

    pub fn key(&self) -> String {
        format!("{}@{}", self.name, self.version)
    }

    pub fn step(&self, name: &str) -> Option<&StepDefinition> {
        self.steps.get(name)
    }

    /// Names of every executor bound by a Task step
    pub fn executors(&self) -> impl Iterator<Item = &str> {
        self.steps.values().filter_map(|step| match step {
            StepDefinition::Task(task) => Some(task.executor.as_str()),
            _ => None,
        })
    }

    /// Structural validation: the start step and every successor exist, and no Choice is empty
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(PromoterError::InvalidDefinition(
                "pipeline name must not be empty".to_string(),
            ));
        }
        if !self.steps.contains_key(&self.start_at) {
            return Err(PromoterError::InvalidDefinition(format!(
                "{}: start step '{}' is not defined",
                self.key(),
                self.start_at
            )));
        }

        for (name, step) in &self.steps {
            if let StepDefinition::Choice(choice) = step {
                if choice.rules.is_empty() && choice.default.is_none() {
                    return Err(PromoterError::InvalidDefinition(format!(
                        "{}: choice step '{name}' has no rules and no default",
                        self.key()
                    )));
                }
            }
            if let StepDefinition::Task(task) = step {
                if let Some(retry) = &task.retry {
                    if retry.max_attempts == 0 {
                        return Err(PromoterError::InvalidDefinition(format!(
                            "{}: task step '{name}' has a retry policy with zero attempts",
                            self.key()
                        )));
                    }
                }
            }
            for successor in step.successors() {
                if !self.steps.contains_key(successor) {
                    return Err(PromoterError::InvalidDefinition(format!(
                        "{}: step '{name}' transitions to undefined step '{successor}'",
                        self.key()
                    )));
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn task(executor: &str, next: Option<&str>) -> StepDefinition {
        StepDefinition::Task(TaskStep {
            executor: executor.to_string(),
            parameters: Value::Null,
            result_path: executor.to_string(),
            retry: None,
            next: next.map(str::to_string),
        })
    }

    #[test]
    fn test_valid_definition() {
        let definition = PipelineDefinition::new("p", "1", "A")
            .with_step("A", task("a", Some("B")))
            .with_step("B", StepDefinition::Succeed);
        assert!(definition.validate().is_ok());
        assert_eq!(definition.executors().collect::<Vec<_>>(), vec!["a"]);
    }

    #[test]
    fn test_missing_start_step() {
        let definition = PipelineDefinition::new("p", "1", "Nope").with_step("A", task("a", None));
        assert!(matches!(
            definition.validate(),
            Err(PromoterError::InvalidDefinition(_))
        ));
    }

    #[test]
    fn test_dangling_successor() {
        let definition =
            PipelineDefinition::new("p", "1", "A").with_step("A", task("a", Some("Ghost")));
        let err = definition.validate().unwrap_err();
        assert!(err.to_string().contains("Ghost"));
    }

    #[test]
    fn test_empty_choice_rejected() {
        let definition = PipelineDefinition::new("p", "1", "C").with_step(
            "C",
            StepDefinition::Choice(ChoiceStep {
                rules: vec![],
                default: None,
            }),
        );
        assert!(definition.validate().is_err());
    }

    #[test]
    fn test_step_serde_is_tagged() {
        let step: StepDefinition = serde_json::from_value(json!({
            "type": "Fail",
            "error": "ConcurrentRolloutInProgress",
            "cause": "busy"
        }))
        .unwrap();
        assert_eq!(step.kind(), "Fail");

        let choice: StepDefinition = serde_json::from_value(json!({
            "type": "Choice",
            "rules": [{
                "condition": {"StringEquals": {"path": "/deployment/status", "value": "New"}},
                "next": "Create"
            }]
        }))
        .unwrap();
        assert_eq!(choice.successors(), vec!["Create"]);
    }
}
