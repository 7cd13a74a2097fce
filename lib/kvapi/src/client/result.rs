//! Normalized response envelope.

use http::HeaderMap;
use serde_json::{Value, json};

/// HTTP status attached to a result that reached the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseStatus {
    /// Numeric status code.
    pub code: u16,
    /// Canonical reason phrase, empty when unknown.
    pub message: String,
}

/// The uniform result every API call resolves to.
///
/// API-level failures, transport failures and cancellations all come back
/// through this shape, so callers have a single `success` check. `status` is
/// `None` when the request never reached the server (transport failure or
/// cancellation).
#[derive(Debug, Clone)]
pub struct ApiResult {
    /// Parsed JSON body, or a synthetic `{"success": bool}` for empty and
    /// non-JSON responses.
    pub response: Value,
    /// Response headers; empty when the request never reached the server.
    pub headers: HeaderMap,
    /// HTTP status, when a response was received.
    pub status: Option<ResponseStatus>,
}

impl ApiResult {
    /// Marker result for a request cancelled by a before-hook.
    pub(crate) fn cancelled() -> Self {
        Self {
            response: json!({ "success": false, "cancelled": true }),
            headers: HeaderMap::new(),
            status: None,
        }
    }

    /// Normalizes a transport-level failure into the result shape.
    pub(crate) fn transport_failure(error: &reqwest::Error) -> Self {
        Self {
            response: json!({ "success": false, "error": error.to_string() }),
            headers: HeaderMap::new(),
            status: None,
        }
    }

    /// Whether the API reported success (truthy `success` field).
    pub fn is_success(&self) -> bool {
        self.response.get("success").is_some_and(is_truthy)
    }

    /// Whether this result is the cancelled-by-hook marker.
    pub fn is_cancelled(&self) -> bool {
        self.response.get("cancelled").is_some_and(is_truthy)
    }

    /// The API error code, when the body carries a string `error` field.
    pub fn error_code(&self) -> Option<&str> {
        self.response.get("error").and_then(Value::as_str)
    }
}

/// JavaScript-style truthiness, as the provider's `success` flag expects.
pub(crate) fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(flag) => *flag,
        Value::Number(number) => number.as_f64().is_some_and(|float| float != 0.0),
        Value::String(text) => !text.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}
