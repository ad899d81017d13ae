//! Status conditions for the KustomizationSet resource.

use chrono::Utc;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Condition type signalling that all generated resources converged.
pub const READY_CONDITION: &str = "Ready";

/// Reason recorded on a successful pass.
pub const RECONCILIATION_SUCCEEDED_REASON: &str = "ReconciliationSucceeded";

const MAX_CONDITION_MESSAGE_LENGTH: usize = 20_000;

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    #[serde(rename = "type")]
    pub type_: String,
    /// "True", "False" or "Unknown".
    pub status: String,
    pub reason: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_transition_time: Option<String>,
}

impl Condition {
    pub fn ready(reason: &str, message: &str) -> Self {
        Condition {
            type_: READY_CONDITION.to_string(),
            status: "True".to_string(),
            reason: reason.to_string(),
            message: limit_message(message),
            last_transition_time: Some(Utc::now().to_rfc3339()),
        }
    }
}

/// Replace the condition of the same type, keeping the previous transition
/// time when the status value did not change.
pub fn set_condition(conditions: &mut Vec<Condition>, mut new: Condition) {
    if let Some(existing) = conditions.iter_mut().find(|c| c.type_ == new.type_) {
        if existing.status == new.status {
            new.last_transition_time = existing.last_transition_time.clone();
        }
        *existing = new;
        return;
    }
    conditions.push(new);
}

/// Chop a string and add an ellipsis to indicate that it's been chopped.
pub fn limit_message(s: &str) -> String {
    if s.len() <= MAX_CONDITION_MESSAGE_LENGTH {
        return s.to_string();
    }
    let mut end = MAX_CONDITION_MESSAGE_LENGTH - 3;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &s[..end])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_messages_pass_through() {
        assert_eq!(limit_message("3 kustomizations created"), "3 kustomizations created");
    }

    #[test]
    fn long_messages_are_truncated_with_ellipsis() {
        let long = "x".repeat(MAX_CONDITION_MESSAGE_LENGTH + 100);
        let got = limit_message(&long);
        assert_eq!(got.len(), MAX_CONDITION_MESSAGE_LENGTH);
        assert!(got.ends_with("..."));
    }

    #[test]
    fn set_condition_replaces_by_type() {
        let mut conditions = Vec::new();
        set_condition(&mut conditions, Condition::ready("Reason", "1 kustomizations created"));
        let first_ts = conditions[0].last_transition_time.clone();

        set_condition(&mut conditions, Condition::ready("Reason", "2 kustomizations created"));
        assert_eq!(conditions.len(), 1);
        assert_eq!(conditions[0].message, "2 kustomizations created");
        // status did not change, so the transition time is preserved
        assert_eq!(conditions[0].last_transition_time, first_ts);
    }
}
