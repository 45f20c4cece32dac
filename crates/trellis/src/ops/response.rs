//! Result envelope returned for every operation.

use crate::error::{Error, ErrorKind};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A request as it arrives from the agent layer.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ToolRequest {
    /// Operation name, e.g. `get_ready`.
    pub operation: String,
    /// Operation-specific parameters.
    #[serde(default)]
    pub params: Value,
}

/// Failure details.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ToolError {
    /// Taxonomy kind callers branch on.
    pub kind: ErrorKind,
    /// Human-readable, actionable message.
    pub message: String,
}

/// Uniform result of an operation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolResponse {
    /// Whether the operation succeeded.
    pub success: bool,
    /// Result payload; also present on a denied sync to carry its report.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    /// Failure details.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ToolError>,
}

impl ToolResponse {
    /// A successful result.
    #[must_use]
    pub fn ok(data: Value) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    /// A failed result without payload.
    #[must_use]
    pub fn failure(error: &Error) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(ToolError {
                kind: error.kind(),
                message: error.to_string(),
            }),
        }
    }

    /// A failed result that still carries a payload.
    #[must_use]
    pub fn failure_with_data(error: &Error, data: Value) -> Self {
        Self {
            data: Some(data),
            ..Self::failure(error)
        }
    }

    /// The error kind, if the operation failed.
    #[must_use]
    pub fn error_kind(&self) -> Option<ErrorKind> {
        self.error.as_ref().map(|e| e.kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn failure_serializes_kind_and_message() {
        let response = ToolResponse::failure(&Error::Permission("Run: gh auth login".into()));
        let value = serde_json::to_value(&response).unwrap();
        assert_eq!(
            value,
            json!({
                "success": false,
                "error": {"kind": "permission_error", "message": "Run: gh auth login"}
            })
        );
    }

    #[test]
    fn success_omits_error() {
        let value = serde_json::to_value(ToolResponse::ok(json!({"count": 0}))).unwrap();
        assert_eq!(value, json!({"success": true, "data": {"count": 0}}));
    }
}
