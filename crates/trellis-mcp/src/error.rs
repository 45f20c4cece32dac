//! Error types for the trellis MCP server.

use thiserror::Error;

/// Errors that can occur in the trellis MCP server.
///
/// Failures of an issue operation itself are not errors at this level: they
/// travel inside the [`trellis::ToolResponse`] envelope.
#[derive(Debug, Error)]
pub enum Error {
    /// No workspace context has been set.
    #[error("No workspace context set. Call set_context first.")]
    NoContext,

    /// The specified workspace was not found or path is invalid.
    #[error("Workspace not found: {path}")]
    WorkspaceNotFound {
        /// The path that was not found.
        path: String,
        /// The underlying IO error, if any.
        #[source]
        source: Option<std::io::Error>,
    },

    /// Workspace exists but was not initialized via `set_context`.
    #[error("Workspace not initialized: {0}. Call set_context first.")]
    WorkspaceNotInitialized(String),

    /// Failed to discover a trellis project.
    #[error("No .trellis directory found in {0} or parent directories")]
    NoTrellisDirectory(String),

    /// An error from the trellis core.
    #[error(transparent)]
    Trellis(#[from] trellis::Error),

    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// MCP protocol error.
    #[error("MCP error: {0}")]
    Mcp(String),
}

/// Result type for trellis MCP operations.
pub type Result<T> = std::result::Result<T, Error>;
