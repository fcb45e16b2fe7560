//! Trigger recognition.

use serde_json::Value;

/// Text form of an observed status value.
///
/// Strings pass through, `null` is absent, anything else is rendered as JSON.
pub fn observed_text(data: &Value) -> Option<String> {
    match data {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

/// True when `observed` equals `trigger`, ignoring case.
pub fn is_trigger(observed: Option<&str>, trigger: &str) -> bool {
    observed.is_some_and(|value| value.to_lowercase() == trigger.to_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_trigger_case_insensitive() {
        assert!(is_trigger(Some("waiting"), "waiting"));
        assert!(is_trigger(Some("Waiting"), "waiting"));
        assert!(is_trigger(Some("WAITING"), "waiting"));
    }

    #[test]
    fn test_non_trigger_values() {
        assert!(!is_trigger(Some("idle"), "waiting"));
        assert!(!is_trigger(Some(""), "waiting"));
        assert!(!is_trigger(None, "waiting"));
        assert!(!is_trigger(Some("task_done"), "waiting"));
        assert!(!is_trigger(Some("waiting for car"), "waiting"));
    }

    #[test]
    fn test_observed_text() {
        assert_eq!(observed_text(&json!("Waiting")), Some("Waiting".to_string()));
        assert_eq!(observed_text(&Value::Null), None);
        assert_eq!(observed_text(&json!(3)), Some("3".to_string()));
        assert_eq!(
            observed_text(&json!({"state": "waiting"})),
            Some(r#"{"state":"waiting"}"#.to_string())
        );
    }
}
