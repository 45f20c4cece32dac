//! MCP server for the trellis issue manager.
//!
//! This crate exposes the trellis operation contract to AI assistants over
//! the Model Context Protocol (stdio transport). It holds no issue logic: every
//! request is forwarded to [`trellis::Dispatcher`].
//!
//! # Tools
//!
//! ## Context Management
//! - `set_context` - Set the project root for all operations
//! - `where_am_i` - Show current project root
//!
//! ## Issues
//! - `issue_manager` - Run one operation (`create`, `get_ready`, `sync_to_github`, ...)
//!   and return its `{success, data, error}` envelope
//!
//! ## Sessions
//! - `end_session` - Mark in-progress work of an ended session as interrupted
//!
//! ## Maintenance
//! - `rebuild` - Regenerate the project files from the event log

pub mod context;
pub mod error;
pub mod models;
pub mod server;
pub mod tools;

pub use error::{Error, Result};
pub use server::TrellisMcpServer;
