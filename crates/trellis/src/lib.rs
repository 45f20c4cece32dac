//! Trellis - a dependency-aware issue manager for agent sessions.
//!
//! Issues, dependency edges and an append-only event log live as JSONL files
//! under `.trellis/` in the project root. Every mutation runs under an
//! advisory project lock, so several agent sessions can share one project.
//!
//! The crate is organized around the operation contract in [`ops`]: a closed
//! set of operations, each answered with a uniform success/data/error
//! envelope.
//!
//! ```no_run
//! use std::sync::Arc;
//! use trellis::ops::{Dispatcher, ToolRequest};
//! use trellis::store::JsonlStore;
//! use trellis::sync::GhCli;
//!
//! # async fn demo() -> trellis::error::Result<()> {
//! let store = JsonlStore::open(std::path::Path::new(".")).await?;
//! let tracker = GhCli::new(&store.config().sync);
//! let dispatcher = Dispatcher::new(Arc::new(store), Arc::new(tracker));
//!
//! let response = dispatcher
//!     .execute(ToolRequest {
//!         operation: "get_ready".into(),
//!         params: serde_json::json!({ "limit": 5 }),
//!     })
//!     .await;
//! assert!(response.success);
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]

pub mod config;
pub mod domain;
pub mod error;
pub mod graph;
pub mod id_generation;
pub mod lock;
pub mod ops;
pub mod scheduler;
pub mod sessions;
pub mod store;
pub mod sync;
pub mod workspace;

pub use domain::{Issue, IssueId, IssueStatus, SessionId};
pub use error::{Error, ErrorKind, Result};
pub use ops::{Dispatcher, Operation, OperationKind, ToolRequest, ToolResponse};
pub use store::{IssueStore, JsonlStore};
