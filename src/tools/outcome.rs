//! The `{safe, reason, action}` envelope every built-in tool returns.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// What the caller should do after a rejection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SafetyAction {
    /// Steer the child to a different topic.
    Redirect,
    /// Ask the child to try something else.
    AskAlternative,
    /// Offer the curated video search instead.
    UseSafeVideoSearch,
}

/// Result of a safety-gated tool call. A rejection is a normal outcome,
/// not an error.
#[derive(Debug, Clone, PartialEq)]
pub enum ToolOutcome {
    Safe(Map<String, Value>),
    Unsafe {
        reason: String,
        action: Option<SafetyAction>,
    },
}

impl ToolOutcome {
    /// An approved payload. Non-object payloads are wrapped under `result`.
    pub fn safe(payload: Value) -> Self {
        match payload {
            Value::Object(map) => Self::Safe(map),
            other => {
                let mut map = Map::new();
                map.insert("result".to_string(), other);
                Self::Safe(map)
            }
        }
    }

    pub fn reject(reason: impl Into<String>, action: SafetyAction) -> Self {
        Self::Unsafe {
            reason: reason.into(),
            action: Some(action),
        }
    }

    pub fn reject_plain(reason: impl Into<String>) -> Self {
        Self::Unsafe {
            reason: reason.into(),
            action: None,
        }
    }

    /// Rejection used whenever the policy allowlist is empty.
    pub fn allowlist_required() -> Self {
        Self::reject(
            "Allowlist required (provide --domains)",
            SafetyAction::AskAlternative,
        )
    }

    pub fn is_safe(&self) -> bool {
        matches!(self, Self::Safe(_))
    }

    pub fn reason(&self) -> Option<&str> {
        match self {
            Self::Safe(_) => None,
            Self::Unsafe { reason, .. } => Some(reason),
        }
    }

    pub fn into_value(self) -> Value {
        match self {
            Self::Safe(mut map) => {
                map.insert("safe".to_string(), Value::Bool(true));
                Value::Object(map)
            }
            Self::Unsafe { reason, action } => {
                let mut map = Map::new();
                map.insert("safe".to_string(), Value::Bool(false));
                map.insert("reason".to_string(), Value::String(reason));
                if let Some(action) = action
                    && let Ok(action) = serde_json::to_value(action)
                {
                    map.insert("action".to_string(), action);
                }
                Value::Object(map)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_rejection_shape() {
        let value = ToolOutcome::allowlist_required().into_value();
        assert_eq!(
            value,
            serde_json::json!({
                "safe": false,
                "reason": "Allowlist required (provide --domains)",
                "action": "ASK_ALTERNATIVE"
            })
        );
    }

    #[test]
    fn test_plain_rejection_has_no_action() {
        let value = ToolOutcome::reject_plain("Domain not allowed: x.com").into_value();
        assert!(value.get("action").is_none());
        assert_eq!(value["safe"], false);
    }

    #[test]
    fn test_safe_payload_gets_flag() {
        let value = ToolOutcome::safe(serde_json::json!({"answer": "Rain falls"})).into_value();
        assert_eq!(value["safe"], true);
        assert_eq!(value["answer"], "Rain falls");

        let wrapped = ToolOutcome::safe(serde_json::json!("text")).into_value();
        assert_eq!(wrapped["result"], "text");
    }

    #[test]
    fn test_action_wire_names() {
        assert_eq!(
            serde_json::to_value(SafetyAction::UseSafeVideoSearch).unwrap(),
            "USE_SAFE_VIDEO_SEARCH"
        );
        assert_eq!(serde_json::to_value(SafetyAction::Redirect).unwrap(), "REDIRECT");
    }
}
