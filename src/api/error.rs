use std::collections::BTreeMap;

use serde_json::Value;
use thiserror::Error;

/// Errors produced by the transport and request-coalescing layers.
///
/// `Clone` is required because a single in-flight request may be shared by
/// many waiters; every waiter receives its own copy of the outcome.
#[derive(Error, Debug, Clone)]
pub enum ApiError {
    /// The request was deliberately aborted. Not a failure: callers must
    /// swallow this instead of surfacing it to the user.
    #[error("request cancelled")]
    Cancelled,

    #[error("network unreachable: {0}")]
    Network(String),

    #[error("HTTP {status}")]
    Http { status: u16, data: Value },

    /// HTTP error whose body carries a field-error map, e.g.
    /// `{"errors": {"plate": "already registered"}}`.
    #[error("validation failed ({status})")]
    Validation {
        status: u16,
        fields: BTreeMap<String, String>,
    },

    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

/// Maximum length for raw (non-JSON) error response bodies kept in errors
const MAX_ERROR_BODY_LENGTH: usize = 500;

impl ApiError {
    /// Truncate a response body to avoid carrying excessive data around
    fn truncate_body(body: &str) -> String {
        if body.len() <= MAX_ERROR_BODY_LENGTH {
            body.to_string()
        } else {
            format!(
                "{}... (truncated, {} total bytes)",
                &body[..MAX_ERROR_BODY_LENGTH],
                body.len()
            )
        }
    }

    /// Classify a non-2xx response. The body is parsed as JSON so callers can
    /// inspect structured validation errors; non-JSON bodies are kept as a
    /// truncated string.
    pub fn from_status(status: u16, body: &str) -> Self {
        let data: Value = serde_json::from_str(body)
            .unwrap_or_else(|_| Value::String(Self::truncate_body(body)));

        if let Some(fields) = Self::field_errors(&data) {
            return ApiError::Validation { status, fields };
        }

        ApiError::Http { status, data }
    }

    /// Extract a `{"errors": {field: message}}` map if the body carries one.
    fn field_errors(data: &Value) -> Option<BTreeMap<String, String>> {
        let errors = data.get("errors")?.as_object()?;
        if errors.is_empty() {
            return None;
        }
        let mut fields = BTreeMap::new();
        for (name, message) in errors {
            fields.insert(
                name.clone(),
                message
                    .as_str()
                    .map(str::to_string)
                    .unwrap_or_else(|| message.to_string()),
            );
        }
        Some(fields)
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, ApiError::Cancelled)
    }

    /// Check an `anyhow` chain for the cancellation marker. Data-access
    /// functions wrap `ApiError` in `anyhow::Error`, so the polling layer
    /// needs to look through the chain before deciding to log.
    pub fn is_cancellation(err: &anyhow::Error) -> bool {
        err.chain()
            .any(|cause| matches!(cause.downcast_ref::<ApiError>(), Some(e) if e.is_cancelled()))
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            ApiError::InvalidResponse(err.to_string())
        } else {
            // Connection refused, DNS failure, closed socket: all surface as
            // the connection-level bucket, distinct from HTTP-status errors.
            ApiError::Network(err.to_string())
        }
    }
}
