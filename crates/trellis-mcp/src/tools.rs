//! MCP tool implementations.
//!
//! Each tool resolves the target workspace, then hands off to the core
//! dispatcher. No issue semantics live here.

use crate::context::Context;
use crate::error::Result;
use crate::models::{EndSessionResponse, RebuildResponse, SetContextResponse, WhereAmIResponse};
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::info;
use trellis::{ToolRequest, ToolResponse};

/// Tool implementations for the trellis MCP server.
pub struct Tools {
    context: Arc<RwLock<Context>>,
}

impl Tools {
    /// Create a new Tools instance with the given context.
    pub fn new(context: Arc<RwLock<Context>>) -> Self {
        Self { context }
    }

    /// Set the workspace context.
    ///
    /// # Errors
    ///
    /// Returns an error if the workspace path is invalid or has no `.trellis/` directory.
    pub async fn set_context(&self, workspace_root: &str) -> Result<SetContextResponse> {
        let mut context = self.context.write().await;
        let info = context.set_workspace(Path::new(workspace_root)).await?;

        Ok(SetContextResponse {
            workspace_root: info.workspace_root.display().to_string(),
            data_dir: info.data_dir.display().to_string(),
            message: "Context set successfully".to_string(),
        })
    }

    /// Get current workspace information.
    ///
    /// # Errors
    ///
    /// This function does not currently return errors but returns `Result` for API consistency.
    pub async fn where_am_i(&self) -> Result<WhereAmIResponse> {
        let context = self.context.read().await;
        let workspace_root = context
            .current_workspace()
            .map(|ws| ws.display().to_string());

        Ok(WhereAmIResponse {
            context_set: workspace_root.is_some(),
            workspace_root,
        })
    }

    /// Run one operation of the issue manager.
    ///
    /// Operation failures come back inside the envelope, not as `Err`.
    ///
    /// # Errors
    ///
    /// Returns an error only if no workspace can be resolved.
    pub async fn issue_manager(
        &self,
        operation: String,
        params: Value,
        workspace_root: Option<&str>,
    ) -> Result<ToolResponse> {
        let dispatcher = {
            let context = self.context.read().await;
            context.dispatcher_for(workspace_root.map(Path::new))?
        };

        Ok(dispatcher.execute(ToolRequest { operation, params }).await)
    }

    /// Record that a session ended.
    ///
    /// # Errors
    ///
    /// Returns an error if no workspace can be resolved, the session id is
    /// blank or the store cannot be written.
    pub async fn end_session(
        &self,
        session_id: &str,
        workspace_root: Option<&str>,
    ) -> Result<EndSessionResponse> {
        let dispatcher = {
            let context = self.context.read().await;
            context.dispatcher_for(workspace_root.map(Path::new))?
        };

        let marked = dispatcher.end_session(session_id).await?;
        info!(session_id, marked = marked.len(), "Session ended");

        Ok(EndSessionResponse {
            session_id: session_id.to_string(),
            marked_count: marked.len(),
            marked: marked.into_iter().map(|id| id.to_string()).collect(),
        })
    }

    /// Regenerate the project files from the event log.
    ///
    /// # Errors
    ///
    /// Returns an error if no workspace can be resolved, the write lock is
    /// held elsewhere or the files cannot be written.
    pub async fn rebuild(&self, workspace_root: Option<&str>) -> Result<RebuildResponse> {
        let dispatcher = {
            let context = self.context.read().await;
            context.dispatcher_for(workspace_root.map(Path::new))?
        };

        let report = dispatcher.rebuild().await?;

        Ok(RebuildResponse {
            events: report.events,
            issues: report.issues,
            dependencies: report.dependencies,
            warnings: report.warnings.iter().map(ToString::to_string).collect(),
        })
    }
}
