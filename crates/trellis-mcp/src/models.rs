//! MCP request and response models.
//!
//! Issue payloads are not modelled here: `issue_manager` passes the core's
//! [`trellis::ToolResponse`] envelope through unchanged.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Parameters for the `set_context` tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct SetContextParams {
    /// Absolute path of the project root (the directory containing `.trellis/`).
    pub workspace_root: String,
}

/// Parameters for the `issue_manager` tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct IssueManagerParams {
    /// One of: create, list, get, update, close, `get_ready`, `get_blocked`,
    /// `add_dep`, `remove_dep`, `get_sessions`, `sync_to_github`.
    pub operation: String,

    /// Operation parameters. Mutating operations require `session_id`.
    #[serde(default)]
    pub params: serde_json::Value,

    /// Workspace to use instead of the current context.
    #[serde(default)]
    pub workspace_root: Option<String>,
}

/// Parameters for the `end_session` tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct EndSessionParams {
    /// The session that ended.
    pub session_id: String,

    /// Workspace to use instead of the current context.
    #[serde(default)]
    pub workspace_root: Option<String>,
}

/// Response from the `set_context` tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct SetContextResponse {
    /// The workspace root that was set.
    pub workspace_root: String,

    /// The `.trellis/` directory of the workspace.
    pub data_dir: String,

    /// Status message.
    pub message: String,
}

/// Response from the `where_am_i` tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct WhereAmIResponse {
    /// The current workspace root, if set.
    pub workspace_root: Option<String>,

    /// Whether a context is currently set.
    pub context_set: bool,
}

/// Response from the `end_session` tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct EndSessionResponse {
    /// The session that ended.
    pub session_id: String,

    /// In-progress issues marked as interrupted.
    pub marked: Vec<String>,

    /// Number of issues marked.
    pub marked_count: usize,
}

/// Parameters for the `rebuild` tool.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct RebuildParams {
    /// Workspace to use instead of the current context.
    #[serde(default)]
    pub workspace_root: Option<String>,
}

/// Response from the `rebuild` tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct RebuildResponse {
    /// Events replayed from the log.
    pub events: usize,

    /// Issues written back.
    pub issues: usize,

    /// Dependency edges written back.
    pub dependencies: usize,

    /// Events or lines that could not be applied.
    pub warnings: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_issue_manager_params_default_to_empty() {
        let params: IssueManagerParams =
            serde_json::from_value(json!({"operation": "get_ready"})).unwrap();
        assert!(params.params.is_null());
        assert!(params.workspace_root.is_none());
    }

    #[test]
    fn test_issue_manager_schema_requires_operation() {
        let schema = serde_json::to_value(schemars::schema_for!(IssueManagerParams)).unwrap();
        assert_eq!(schema["required"], json!(["operation"]));
    }
}
