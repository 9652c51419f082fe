//! Argument sanitization.
//!
//! Applied before audit logging and before a call reaches the worker pool:
//! workers never see raw secrets from agent input unless the key name
//! clears the filter.

use palisade_core::ToolArgs;
use regex::Regex;
use serde_json::Value;
use std::sync::LazyLock;

/// Replacement for values under sensitive-looking keys.
pub const REDACTED: &str = "[REDACTED]";

/// String values longer than this are truncated with an `…` suffix.
const MAX_VALUE_CHARS: usize = 200;

static SENSITIVE_KEY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)password|pass|secret|token|api[_-]?key|cvv|card|ssn|credit")
        .expect("sensitive-key pattern is valid")
});

/// Redact sensitive values and truncate oversized strings.
///
/// Pure function: the input map is not modified.
#[must_use]
pub fn sanitize(args: &ToolArgs) -> ToolArgs {
    args.iter()
        .map(|(key, value)| {
            if SENSITIVE_KEY.is_match(key) {
                return (key.clone(), Value::String(REDACTED.to_string()));
            }
            let value = match value {
                Value::String(s) if s.chars().count() > MAX_VALUE_CHARS => {
                    let truncated: String = s.chars().take(MAX_VALUE_CHARS).collect();
                    Value::String(format!("{truncated}…"))
                },
                other => other.clone(),
            };
            (key.clone(), value)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn args_of(value: serde_json::Value) -> ToolArgs {
        match value {
            serde_json::Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    #[test]
    fn test_sensitive_keys_redacted() {
        let args = args_of(json!({
            "password": "hunter2",
            "api_key": "sk-123",
            "api-key": "sk-456",
            "Token": "abc",
            "CREDIT_card": "4111",
            "text": "hello"
        }));
        let clean = sanitize(&args);
        for key in ["password", "api_key", "api-key", "Token", "CREDIT_card"] {
            assert_eq!(clean[key], json!(REDACTED), "key {key} must be redacted");
        }
        assert_eq!(clean["text"], json!("hello"));
    }

    #[test]
    fn test_substring_match_redacts() {
        // The filter is a substring match: "user_password_hash" still hits.
        let args = args_of(json!({"user_password_hash": "x"}));
        assert_eq!(sanitize(&args)["user_password_hash"], json!(REDACTED));
    }

    #[test]
    fn test_long_values_truncated_with_ellipsis() {
        let args = args_of(json!({"data": "x".repeat(500)}));
        let clean = sanitize(&args);
        let s = clean["data"].as_str().unwrap();
        assert_eq!(s.chars().count(), MAX_VALUE_CHARS + 1);
        assert!(s.ends_with('…'));
    }

    #[test]
    fn test_short_values_untouched() {
        let args = args_of(json!({"text": "short", "n": 3, "flag": true}));
        let clean = sanitize(&args);
        assert_eq!(clean["text"], json!("short"));
        assert_eq!(clean["n"], json!(3));
        assert_eq!(clean["flag"], json!(true));
    }

    #[test]
    fn test_non_string_under_sensitive_key_still_redacted() {
        let args = args_of(json!({"secret": {"nested": "value"}}));
        assert_eq!(sanitize(&args)["secret"], json!(REDACTED));
    }

    #[test]
    fn test_input_not_mutated() {
        let args = args_of(json!({"token": "abc123"}));
        let _ = sanitize(&args);
        assert_eq!(args["token"], json!("abc123"));
    }
}
