//! Shrinking tool arguments and results before they reach `tracing`.
//!
//! Credential-looking keys are masked and inline `data:` URIs (gallery
//! images) are replaced with their length so debug logs stay readable.

use serde_json::{Map, Value};

const REDACTED: &str = "[REDACTED]";
const SENSITIVE_SUBSTRINGS: &[&str] = &["token", "secret", "password", "credential", "auth", "api_key", "apikey"];
const ELIDE_OVER: usize = 256;

fn is_sensitive_key(key: &str) -> bool {
    let lower = key.to_ascii_lowercase();
    SENSITIVE_SUBSTRINGS.iter().any(|s| lower.contains(s))
}

fn scrub(value: &mut Value) {
    match value {
        Value::Object(map) => scrub_object(map),
        Value::Array(items) => items.iter_mut().for_each(scrub),
        Value::String(s) if s.starts_with("data:") && s.len() > ELIDE_OVER => {
            *s = format!("[data uri, {} bytes]", s.len());
        }
        _ => {}
    }
}

fn scrub_object(map: &mut Map<String, Value>) {
    for (key, val) in map {
        if is_sensitive_key(key) {
            *val = Value::String(REDACTED.to_string());
        } else {
            scrub(val);
        }
    }
}

/// Copy of `value` safe to emit in logs.
pub fn redact_for_log(value: &Value) -> Value {
    let mut cloned = value.clone();
    scrub(&mut cloned);
    cloned
}

#[cfg(test)]
mod tests {
    use super::redact_for_log;

    #[test]
    fn masks_credential_keys() {
        let input = serde_json::json!({
            "query": "rain",
            "apiKey": "k-123",
            "nested": [{"authToken": "123"}, {"query": "ok"}]
        });
        let out = redact_for_log(&input);
        assert_eq!(out["apiKey"], "[REDACTED]");
        assert_eq!(out["nested"][0]["authToken"], "[REDACTED]");
        assert_eq!(out["nested"][1]["query"], "ok");
        assert_eq!(out["query"], "rain");
    }

    #[test]
    fn elides_large_data_uris() {
        let uri = format!("data:image/png;base64,{}", "A".repeat(1000));
        let input = serde_json::json!({"images": [{"src": uri}], "small": "data:,hi"});
        let out = redact_for_log(&input);
        assert!(out["images"][0]["src"].as_str().unwrap().starts_with("[data uri,"));
        assert_eq!(out["small"], "data:,hi");
    }
}
