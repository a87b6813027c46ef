//! Choice step evaluation.
//!
//! Rules are tried in order; the first whose condition holds names the next step.
//! Evaluation reads only the context document, so the same `(rules, context)` always
//! selects the same branch.

use crate::models::{ChoiceStep, Condition};
use serde_json::Value;

/// Whether `condition` holds against `context`. Paths that are absent or of the wrong
/// type make the comparison false.
pub fn evaluate(condition: &Condition, context: &Value) -> bool {
    match condition {
        Condition::StringEquals { path, value } => context
            .pointer(path)
            .and_then(Value::as_str)
            .is_some_and(|actual| actual == value),
        Condition::BooleanEquals { path, value } => context
            .pointer(path)
            .and_then(Value::as_bool)
            .is_some_and(|actual| actual == *value),
        Condition::NumericEquals { path, value } => context
            .pointer(path)
            .and_then(Value::as_f64)
            .is_some_and(|actual| actual == *value),
        Condition::IsPresent { path, present } => {
            let found = context.pointer(path).is_some_and(|v| !v.is_null());
            found == *present
        }
        Condition::And(conditions) => conditions.iter().all(|c| evaluate(c, context)),
        Condition::Or(conditions) => conditions.iter().any(|c| evaluate(c, context)),
        Condition::Not(inner) => !evaluate(inner, context),
    }
}

/// Next step for a Choice, falling back to its default; `None` when nothing matches
pub fn select_next<'a>(choice: &'a ChoiceStep, context: &Value) -> Option<&'a str> {
    choice
        .rules
        .iter()
        .find(|rule| evaluate(&rule.condition, context))
        .map(|rule| rule.next.as_str())
        .or(choice.default.as_deref())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ChoiceRule;
    use serde_json::json;

    fn status_is(value: &str) -> Condition {
        Condition::StringEquals {
            path: "/deployment/status".into(),
            value: value.into(),
        }
    }

    fn deployment_choice(default: Option<&str>) -> ChoiceStep {
        ChoiceStep {
            rules: vec![
                ChoiceRule {
                    condition: status_is("New"),
                    next: "CreateEndpoint".into(),
                },
                ChoiceRule {
                    condition: status_is("Ready"),
                    next: "DeployCanary".into(),
                },
            ],
            default: default.map(str::to_string),
        }
    }

    #[test]
    fn test_first_matching_rule_wins() {
        let choice = deployment_choice(None);
        let context = json!({"deployment": {"status": "Ready"}});
        assert_eq!(select_next(&choice, &context), Some("DeployCanary"));
    }

    #[test]
    fn test_default_and_no_match() {
        let context = json!({"deployment": {"status": "Busy"}});
        assert_eq!(select_next(&deployment_choice(None), &context), None);
        assert_eq!(
            select_next(&deployment_choice(Some("RolloutInProgress")), &context),
            Some("RolloutInProgress")
        );
    }

    #[test]
    fn test_typed_comparisons() {
        let context = json!({"a": {"flag": true, "count": 3, "name": "x", "none": null}});

        assert!(evaluate(
            &Condition::BooleanEquals { path: "/a/flag".into(), value: true },
            &context
        ));
        assert!(evaluate(
            &Condition::NumericEquals { path: "/a/count".into(), value: 3.0 },
            &context
        ));
        // Type mismatch is false, not an error
        assert!(!evaluate(
            &Condition::StringEquals { path: "/a/count".into(), value: "3".into() },
            &context
        ));
        assert!(evaluate(
            &Condition::IsPresent { path: "/a/missing".into(), present: false },
            &context
        ));
        assert!(evaluate(
            &Condition::IsPresent { path: "/a/none".into(), present: false },
            &context
        ));
    }

    #[test]
    fn test_combinators() {
        let context = json!({"s": "Ready", "n": 1});
        let ready = Condition::StringEquals { path: "/s".into(), value: "Ready".into() };
        let one = Condition::NumericEquals { path: "/n".into(), value: 1.0 };

        assert!(evaluate(&Condition::And(vec![ready.clone(), one.clone()]), &context));
        assert!(evaluate(
            &Condition::Or(vec![Condition::Not(Box::new(ready.clone())), one]),
            &context
        ));
        assert!(!evaluate(&Condition::Not(Box::new(ready)), &context));
        assert!(evaluate(&Condition::And(vec![]), &context));
        assert!(!evaluate(&Condition::Or(vec![]), &context));
    }
}
