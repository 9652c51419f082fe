//! IPC wire format, shared by the pool and the worker binary.
//!
//! One JSON object per line in both directions:
//!
//! - Request: `{"id": "<uuid>", "action": "<name>", "params": {...}}`
//! - Success: `{"id": "<uuid>", "result": {...}}`
//! - Error:   `{"id": "<uuid>", "error": "<message>"}`
//!
//! The request id must round-trip; a mismatched id means the worker has
//! desynchronized and gets restarted.

use serde::{Deserialize, Serialize};

/// Hard cap on one serialized request or response line, enforced on both
/// sides of the pipe.
pub const MAX_REQUEST_BYTES: usize = 256 * 1024;

/// A request line sent to a worker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerRequest {
    /// Correlation id; echoed back by the worker.
    pub id: String,
    /// Action name (e.g. `noop`, `echo`, `shell`).
    pub action: String,
    /// Action parameters.
    #[serde(default)]
    pub params: serde_json::Value,
}

impl WorkerRequest {
    /// Build a request with a fresh correlation id.
    #[must_use]
    pub fn new(action: impl Into<String>, params: serde_json::Value) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            action: action.into(),
            params,
        }
    }
}

/// A response line from a worker.
///
/// Exactly one of `result`/`error` is set by a conforming worker; a line
/// with neither is treated as an opaque success payload by the pool.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorkerResponse {
    /// Correlation id echoed from the request (may be absent on early
    /// failures, e.g. oversized input).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Success payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    /// Error message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl WorkerResponse {
    /// A success response.
    #[must_use]
    pub fn ok(id: impl Into<String>, result: serde_json::Value) -> Self {
        Self {
            id: Some(id.into()),
            result: Some(result),
            error: None,
        }
    }

    /// An error response.
    #[must_use]
    pub fn err(id: Option<String>, message: impl Into<String>) -> Self {
        Self {
            id,
            result: None,
            error: Some(message.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_wire_shape() {
        let request = WorkerRequest::new("echo", json!({"msg": "hi"}));
        let value = serde_json::to_value(&request).unwrap();
        assert!(value["id"].is_string());
        assert_eq!(value["action"], "echo");
        assert_eq!(value["params"]["msg"], "hi");
    }

    #[test]
    fn test_fresh_id_per_request() {
        let a = WorkerRequest::new("noop", json!({}));
        let b = WorkerRequest::new("noop", json!({}));
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn test_response_success_shape() {
        let line = serde_json::to_string(&WorkerResponse::ok("abc", json!({"n": 1}))).unwrap();
        assert!(!line.contains("error"));

        let back: WorkerResponse = serde_json::from_str(&line).unwrap();
        assert_eq!(back.id.as_deref(), Some("abc"));
        assert_eq!(back.result.unwrap()["n"], 1);
    }

    #[test]
    fn test_response_error_without_id_parses() {
        let back: WorkerResponse =
            serde_json::from_str(r#"{"error": "input too large"}"#).unwrap();
        assert!(back.id.is_none());
        assert_eq!(back.error.as_deref(), Some("input too large"));
    }
}
