//! Request envelope validation.
//!
//! The envelope schema is compiled once per supervisor; failures surface as
//! a stable 8-character error token so callers can correlate with gateway
//! logs without the response leaking schema internals.

use serde_json::{json, Value};
use std::path::Path;

use crate::error::{GatewayError, GatewayResult};

/// Compiled JSON-schema validator for the `{tool, args, session_id}`
/// request envelope.
pub struct EnvelopeValidator {
    validator: jsonschema::Validator,
}

impl EnvelopeValidator {
    /// The built-in envelope schema.
    #[must_use]
    pub fn default_schema() -> Value {
        json!({
            "$schema": "https://json-schema.org/draft/2020-12/schema",
            "type": "object",
            "required": ["tool"],
            "properties": {
                "tool": {"type": "string", "minLength": 1},
                "args": {"type": "object"},
                "session_id": {"type": "string"}
            },
            "additionalProperties": false
        })
    }

    /// Validator over the built-in schema.
    #[must_use]
    pub fn new() -> Self {
        Self {
            validator: jsonschema::validator_for(&Self::default_schema())
                .expect("embedded envelope schema is valid"),
        }
    }

    /// Validator over a schema file (deployments that extend the envelope).
    pub fn from_file(path: impl AsRef<Path>) -> GatewayResult<Self> {
        let raw = std::fs::read_to_string(path)?;
        let schema: Value = serde_json::from_str(&raw)?;
        let validator = jsonschema::validator_for(&schema)
            .map_err(|err| GatewayError::Adapter(format!("invalid envelope schema: {err}")))?;
        Ok(Self { validator })
    }

    /// Validate an envelope, returning the collected failure messages.
    pub fn validate(&self, envelope: &Value) -> Result<(), Vec<String>> {
        let errors: Vec<String> = self
            .validator
            .iter_errors(envelope)
            .map(|err| err.to_string())
            .collect();
        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

impl Default for EnvelopeValidator {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for EnvelopeValidator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EnvelopeValidator").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_envelopes() {
        let validator = EnvelopeValidator::new();
        for envelope in [
            json!({"tool": "echo"}),
            json!({"tool": "echo", "args": {}}),
            json!({"tool": "echo", "args": {"text": "hi"}, "session_id": "s1"}),
        ] {
            assert!(validator.validate(&envelope).is_ok(), "{envelope}");
        }
    }

    #[test]
    fn test_missing_tool_rejected() {
        let validator = EnvelopeValidator::new();
        assert!(validator.validate(&json!({"args": {}})).is_err());
    }

    #[test]
    fn test_wrong_types_rejected() {
        let validator = EnvelopeValidator::new();
        assert!(validator.validate(&json!({"tool": 42})).is_err());
        assert!(validator.validate(&json!({"tool": ""})).is_err());
        assert!(validator
            .validate(&json!({"tool": "echo", "args": []}))
            .is_err());
    }

    #[test]
    fn test_unknown_keys_rejected() {
        let validator = EnvelopeValidator::new();
        assert!(validator
            .validate(&json!({"not_a_tool_key": "bad"}))
            .is_err());
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("envelope.json");
        std::fs::write(&path, EnvelopeValidator::default_schema().to_string()).unwrap();

        let validator = EnvelopeValidator::from_file(&path).unwrap();
        assert!(validator.validate(&json!({"tool": "echo"})).is_ok());
    }
}
