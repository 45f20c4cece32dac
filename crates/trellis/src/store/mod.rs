//! Durable issue store.
//!
//! The store owns three JSONL files per project: the materialized issue
//! records, the materialized dependency edges, and the append-only event log.
//! The event log is authoritative; the other two are a projection that
//! [`IssueStore::rebuild`] can regenerate from it.
//!
//! # Write discipline
//!
//! Every mutation runs as one read-modify-write under the project lock:
//!
//! 1. acquire the advisory lock (bounded wait, `concurrency_error` on timeout)
//! 2. load the latest durable state
//! 3. apply a pure mutation that yields the new state and its events
//! 4. append the events in a single durable write
//! 5. atomically rewrite whichever materialized files changed
//! 6. release the lock
//!
//! A crash between steps 4 and 5 leaves the event log ahead of the
//! projection, which a rebuild repairs. Reads never take the lock.

mod jsonl;
mod mutation;
mod replay;
mod state;

pub use jsonl::JsonlStore;
pub use state::ProjectState;

use crate::domain::{Event, Issue, IssueFilter, IssueId, IssueUpdate, NewIssue, SessionId};
use crate::error::Result;
use crate::scheduler;
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::fmt;
use std::path::PathBuf;

/// Core storage trait for the issue manager.
///
/// Implementations must be `Send + Sync`; mutations take `&self` because
/// serialization happens through the project lock rather than `&mut`.
///
/// Issues returned from any method carry their *effective* status (see
/// [`scheduler::effective_status`]).
#[async_trait]
pub trait IssueStore: Send + Sync {
    // ========== Mutations ==========

    /// Create a new issue, with `created` and `dep_added` events committed together.
    ///
    /// # Errors
    ///
    /// Returns `Error::Validation` for an empty title or bad priority and
    /// `Error::IssueNotFound` if an initial dependency doesn't exist.
    async fn create(&self, issue: NewIssue, session_id: &SessionId) -> Result<Issue>;

    /// Apply a partial update, enforcing the status transition rules.
    ///
    /// An update that changes nothing appends no event.
    ///
    /// # Errors
    ///
    /// Returns `Error::IssueNotFound` for unknown ids and `Error::Validation`
    /// for illegal transitions or field values.
    async fn update(
        &self,
        id: &IssueId,
        update: IssueUpdate,
        session_id: &SessionId,
    ) -> Result<Issue>;

    /// Close an issue. Closing a closed issue returns it unchanged.
    ///
    /// # Errors
    ///
    /// Returns `Error::Validation` if `reason` is missing for an open issue.
    async fn close(
        &self,
        id: &IssueId,
        reason: Option<&str>,
        session_id: &SessionId,
    ) -> Result<Issue>;

    /// Add the edge `issue_id -> depends_on_id`. Returns false if it already existed.
    ///
    /// # Errors
    ///
    /// Returns `Error::CircularDependency` if the edge would close a cycle.
    async fn add_dependency(
        &self,
        issue_id: &IssueId,
        depends_on_id: &IssueId,
        session_id: &SessionId,
    ) -> Result<bool>;

    /// Remove the edge `issue_id -> depends_on_id`. Returns false if it was absent.
    ///
    /// # Errors
    ///
    /// Returns `Error::IssueNotFound` if either issue doesn't exist.
    async fn remove_dependency(
        &self,
        issue_id: &IssueId,
        depends_on_id: &IssueId,
        session_id: &SessionId,
    ) -> Result<bool>;

    /// Merge external-tracker bookkeeping into an issue's metadata.
    ///
    /// Allowed on closed issues. Appends a `synced` event.
    async fn record_sync(
        &self,
        id: &IssueId,
        stamp: Map<String, Value>,
        session_id: &SessionId,
    ) -> Result<Issue>;

    /// Append a `session_ended` event if the issue is in progress, was touched
    /// by `session_id`, and has not already been marked for that session.
    ///
    /// Returns whether an event was appended.
    async fn record_session_ended(&self, id: &IssueId, session_id: &SessionId) -> Result<bool>;

    /// Regenerate the materialized files from the event log.
    async fn rebuild(&self) -> Result<RebuildReport>;

    // ========== Reads ==========

    /// The latest durable state. Does not take the write lock.
    async fn snapshot(&self) -> Result<ProjectState>;

    /// Every event in log order.
    async fn events(&self) -> Result<Vec<Event>>;

    /// Events of one issue in log order.
    async fn events_for(&self, id: &IssueId) -> Result<Vec<Event>> {
        let mut events = self.events().await?;
        events.retain(|event| event.issue_id == *id);
        Ok(events)
    }

    /// Get one issue.
    ///
    /// # Errors
    ///
    /// Returns `Error::IssueNotFound` if the id is unknown.
    async fn get(&self, id: &IssueId) -> Result<Issue> {
        let state = self.snapshot().await?;
        let issue = state.require(id)?;
        Ok(scheduler::with_effective_status(&state, issue))
    }

    /// List issues in insertion order.
    async fn list(&self, filter: &IssueFilter) -> Result<Vec<Issue>> {
        let state = self.snapshot().await?;
        Ok(scheduler::list(&state, filter))
    }
}

/// A non-fatal problem found while loading or replaying project files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadWarning {
    /// A JSONL line could not be parsed and was skipped.
    MalformedLine {
        /// File containing the line.
        file: PathBuf,
        /// 1-based line number.
        line_number: usize,
        /// Parser message.
        error: String,
    },

    /// A second record with an already-loaded id was skipped.
    DuplicateIssue {
        /// The repeated id.
        id: IssueId,
    },

    /// An edge referencing an unknown issue was skipped.
    OrphanedDependency {
        /// Dependent side.
        from: IssueId,
        /// Dependency side.
        to: IssueId,
    },

    /// An edge that would close a cycle (or point at itself) was skipped.
    CircularDependency {
        /// Dependent side.
        from: IssueId,
        /// Dependency side.
        to: IssueId,
    },

    /// An event could not be applied during replay.
    InvalidEvent {
        /// The event's id.
        event_id: uuid::Uuid,
        /// Why it was ignored.
        reason: String,
    },
}

impl fmt::Display for LoadWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MalformedLine {
                file,
                line_number,
                error,
            } => write!(f, "{}:{line_number}: skipped malformed line: {error}", file.display()),
            Self::DuplicateIssue { id } => write!(f, "skipped duplicate record for {id}"),
            Self::OrphanedDependency { from, to } => {
                write!(f, "skipped dependency {from} -> {to}: unknown issue")
            }
            Self::CircularDependency { from, to } => {
                write!(f, "skipped dependency {from} -> {to}: would create a cycle")
            }
            Self::InvalidEvent { event_id, reason } => {
                write!(f, "ignored event {event_id}: {reason}")
            }
        }
    }
}

/// Outcome of [`IssueStore::rebuild`].
#[derive(Debug, Clone, Default)]
pub struct RebuildReport {
    /// Events replayed.
    pub events: usize,
    /// Issues written to the materialized file.
    pub issues: usize,
    /// Edges written to the materialized file.
    pub dependencies: usize,
    /// Events or lines that could not be applied.
    pub warnings: Vec<LoadWarning>,
}
