//! MCP server implementation.
//!
//! This module contains the main server setup using rmcp.

use crate::context::Context;
use crate::error::Error;
use crate::models::{EndSessionParams, IssueManagerParams, RebuildParams, SetContextParams};
use crate::tools::Tools;
use rmcp::handler::server::router::tool::ToolRouter;
use rmcp::handler::server::wrapper::Parameters;
use rmcp::model::{
    CallToolResult, Content, Implementation, ProtocolVersion, ServerCapabilities, ServerInfo,
};
use rmcp::transport::stdio;
use rmcp::{
    handler::server::ServerHandler, tool, tool_handler, tool_router, ErrorData as McpError,
    ServiceExt,
};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};

/// The trellis MCP server.
///
/// Provides MCP protocol handling over stdio transport.
#[derive(Clone)]
pub struct TrellisMcpServer {
    /// Shared context for workspace management.
    context: Arc<RwLock<Context>>,
    /// Tool implementations.
    tools: Arc<Tools>,
    /// Tool router for MCP dispatch.
    tool_router: ToolRouter<Self>,
}

#[tool_router]
impl TrellisMcpServer {
    /// Set the workspace context for subsequent operations.
    #[tool(
        description = "Set the project root directory for all subsequent operations. Call this first before using other tools."
    )]
    async fn set_context(
        &self,
        Parameters(params): Parameters<SetContextParams>,
    ) -> std::result::Result<CallToolResult, McpError> {
        match self.tools.set_context(&params.workspace_root).await {
            Ok(response) => Ok(CallToolResult::success(vec![Content::json(response)?])),
            Err(e) => Err(McpError::internal_error(e.to_string(), None)),
        }
    }

    /// Get current workspace context information.
    #[tool(description = "Show the current project root. Useful for debugging.")]
    async fn where_am_i(&self) -> std::result::Result<CallToolResult, McpError> {
        match self.tools.where_am_i().await {
            Ok(response) => Ok(CallToolResult::success(vec![Content::json(response)?])),
            Err(e) => Err(McpError::internal_error(e.to_string(), None)),
        }
    }

    /// Run one issue manager operation.
    #[tool(
        description = "Manage dependency-aware issues. operation is one of create, list, get, update, close, get_ready, get_blocked, add_dep, remove_dep, get_sessions, sync_to_github; params holds its arguments. Every mutating operation needs params.session_id. Returns {success, data, error: {kind, message}}."
    )]
    async fn issue_manager(
        &self,
        Parameters(params): Parameters<IssueManagerParams>,
    ) -> std::result::Result<CallToolResult, McpError> {
        let response = self
            .tools
            .issue_manager(
                params.operation,
                params.params,
                params.workspace_root.as_deref(),
            )
            .await
            .map_err(|e| McpError::internal_error(e.to_string(), None))?;

        let content = vec![Content::json(&response)?];
        if response.success {
            Ok(CallToolResult::success(content))
        } else {
            Ok(CallToolResult::error(content))
        }
    }

    /// Mark in-progress work of an ended session as interrupted.
    #[tool(
        description = "Record that an agent session ended. In-progress issues it touched get a session_ended event so the next session knows the work was interrupted."
    )]
    async fn end_session(
        &self,
        Parameters(params): Parameters<EndSessionParams>,
    ) -> std::result::Result<CallToolResult, McpError> {
        match self
            .tools
            .end_session(&params.session_id, params.workspace_root.as_deref())
            .await
        {
            Ok(response) => Ok(CallToolResult::success(vec![Content::json(response)?])),
            Err(e) => Err(McpError::internal_error(e.to_string(), None)),
        }
    }

    /// Regenerate the project files from the event log.
    #[tool(
        description = "Repair the issue and dependency files by replaying the event log. Use after a crash or when an issue that was just written cannot be found."
    )]
    async fn rebuild(
        &self,
        Parameters(params): Parameters<RebuildParams>,
    ) -> std::result::Result<CallToolResult, McpError> {
        match self.tools.rebuild(params.workspace_root.as_deref()).await {
            Ok(response) => Ok(CallToolResult::success(vec![Content::json(response)?])),
            Err(e) => Err(McpError::internal_error(e.to_string(), None)),
        }
    }
}

impl TrellisMcpServer {
    /// Create a new trellis MCP server.
    #[must_use]
    pub fn new() -> Self {
        let context = Arc::new(RwLock::new(Context::new()));
        let tools = Arc::new(Tools::new(Arc::clone(&context)));

        Self {
            context,
            tools,
            tool_router: Self::tool_router(),
        }
    }

    /// Get a reference to the context.
    #[must_use]
    pub fn context(&self) -> &Arc<RwLock<Context>> {
        &self.context
    }

    /// Use the project containing `start`, if there is one.
    pub async fn discover_workspace(&self, start: &Path) {
        match self.context.write().await.discover_and_set_workspace(start).await {
            Ok(info) => info!(workspace = %info.workspace_root.display(), "Discovered project"),
            Err(e) => debug!(error = %e, "No project discovered; waiting for set_context"),
        }
    }

    /// Serve over stdio until the client disconnects.
    ///
    /// # Errors
    ///
    /// Returns `Error::Mcp` if the transport fails to initialize or the
    /// service task aborts.
    pub async fn run(self) -> crate::error::Result<()> {
        let service = self
            .serve(stdio())
            .await
            .map_err(|e| Error::Mcp(e.to_string()))?;
        let reason = service
            .waiting()
            .await
            .map_err(|e| Error::Mcp(e.to_string()))?;
        info!(?reason, "MCP service stopped");
        Ok(())
    }
}

impl Default for TrellisMcpServer {
    fn default() -> Self {
        Self::new()
    }
}

#[tool_handler]
impl ServerHandler for TrellisMcpServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::V_2024_11_05,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation {
                name: "trellis-mcp".into(),
                version: env!("CARGO_PKG_VERSION").into(),
                title: None,
                icons: None,
                website_url: None,
            },
            instructions: Some(
                "Trellis issue manager. Call set_context with the project root first, then use issue_manager; call get_ready to pick the next task."
                    .into(),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rmcp::handler::server::ServerHandler;

    #[test]
    fn test_server_creation() {
        let server = TrellisMcpServer::new();
        assert!(server.context().try_read().is_ok());
    }

    #[test]
    fn test_server_info() {
        let server = TrellisMcpServer::new();
        let info = server.get_info();
        assert_eq!(info.server_info.name, "trellis-mcp");
        assert!(!info.server_info.version.is_empty());
        assert!(info.instructions.is_some());
    }

    #[test]
    fn test_tool_router_has_all_tools() {
        let server = TrellisMcpServer::new();
        let tools = server.tool_router.list_all();
        let mut tool_names: Vec<&str> = tools.iter().map(|t| &*t.name).collect();
        tool_names.sort_unstable();

        assert_eq!(
            tool_names,
            vec!["end_session", "issue_manager", "rebuild", "set_context", "where_am_i"]
        );
    }

    #[tokio::test]
    async fn test_discover_workspace_without_project_leaves_context_unset() {
        let temp = tempfile::TempDir::new().unwrap();
        let server = TrellisMcpServer::new();

        server.discover_workspace(temp.path()).await;

        assert!(server.context().read().await.current_workspace().is_none());
    }
}
