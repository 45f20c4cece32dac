//! Typed parameters for each operation.
//!
//! Unknown fields are rejected so a misspelled parameter surfaces as a
//! validation error instead of being silently ignored.

use crate::domain::{IssueFilter, IssueId, IssueStatus, PriorityInput};
use crate::error::Result;
use serde::{Deserialize, Deserializer};
use serde_json::{Map, Value};

/// `create`
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateParams {
    /// Issue title.
    pub title: String,
    /// Issue description.
    #[serde(default)]
    pub description: String,
    /// Classification tag; defaults to "task".
    #[serde(default, alias = "type")]
    pub issue_type: Option<String>,
    /// Level 0-4 or a priority name; defaults to normal.
    #[serde(default)]
    pub priority: Option<PriorityInput>,
    /// Assignee.
    #[serde(default)]
    pub assignee: Option<String>,
    /// Initial metadata.
    #[serde(default)]
    pub metadata: Map<String, Value>,
    /// Issues the new issue depends on.
    #[serde(default, alias = "depends_on")]
    pub deps: Vec<IssueId>,
    /// Session performing the change.
    pub session_id: String,
}

/// `list`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ListParams {
    /// Match on effective status.
    #[serde(default)]
    pub status: Option<IssueStatus>,
    /// Match on priority.
    #[serde(default)]
    pub priority: Option<PriorityInput>,
    /// Match on assignee.
    #[serde(default)]
    pub assignee: Option<String>,
    /// Maximum number of results.
    #[serde(default)]
    pub limit: Option<usize>,
}

impl ListParams {
    /// Convert to a store filter.
    ///
    /// # Errors
    ///
    /// Returns a validation error for an unknown priority.
    pub fn filter(&self) -> Result<IssueFilter> {
        Ok(IssueFilter {
            status: self.status,
            priority: self.priority.as_ref().map(PriorityInput::resolve).transpose()?,
            assignee: self.assignee.clone(),
            limit: self.limit,
        })
    }
}

/// `get_ready` and `get_blocked`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct QueueParams {
    /// Maximum number of results, applied last.
    #[serde(default)]
    pub limit: Option<usize>,
    /// Match on assignee.
    #[serde(default)]
    pub assignee: Option<String>,
    /// Match on priority.
    #[serde(default)]
    pub priority: Option<PriorityInput>,
}

impl QueueParams {
    /// Convert to a store filter.
    ///
    /// # Errors
    ///
    /// Returns a validation error for an unknown priority.
    pub fn filter(&self) -> Result<IssueFilter> {
        Ok(IssueFilter {
            status: None,
            priority: self.priority.as_ref().map(PriorityInput::resolve).transpose()?,
            assignee: self.assignee.clone(),
            limit: self.limit,
        })
    }
}

/// `get` and `get_sessions`
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct IssueRef {
    /// The issue.
    pub issue_id: IssueId,
}

/// `update`
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdateParams {
    /// The issue.
    pub issue_id: IssueId,
    /// New title.
    #[serde(default)]
    pub title: Option<String>,
    /// New description.
    #[serde(default)]
    pub description: Option<String>,
    /// New classification tag.
    #[serde(default, alias = "type")]
    pub issue_type: Option<String>,
    /// New status; `in-progress` is accepted.
    #[serde(default)]
    pub status: Option<IssueStatus>,
    /// New priority.
    #[serde(default)]
    pub priority: Option<PriorityInput>,
    /// New assignee; `null` clears it.
    #[serde(default, deserialize_with = "present")]
    pub assignee: Option<Option<String>>,
    /// Manual block note.
    #[serde(default)]
    pub blocking_notes: Option<String>,
    /// Keys to merge into metadata; `null` values remove keys.
    #[serde(default)]
    pub metadata: Option<Map<String, Value>>,
    /// Session performing the change.
    pub session_id: String,
}

/// `close`
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CloseParams {
    /// The issue.
    pub issue_id: IssueId,
    /// Why it is being closed; required unless already closed.
    #[serde(default)]
    pub reason: Option<String>,
    /// Session performing the change.
    pub session_id: String,
}

/// `add_dep` and `remove_dep`
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DepParams {
    /// The dependent issue.
    pub issue_id: IssueId,
    /// The issue it waits on.
    pub depends_on_id: IssueId,
    /// Session performing the change.
    pub session_id: String,
}

/// `sync_to_github`
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SyncParams {
    /// `owner/name`; falls back to the configured default.
    #[serde(default)]
    pub repo: Option<String>,
    /// Also push closed issues.
    #[serde(default)]
    pub include_closed: bool,
    /// Session recorded on stamp-back events.
    pub session_id: String,
}

/// Distinguish an explicit `null` (clear) from an absent field (keep).
fn present<'de, D, T>(deserializer: D) -> std::result::Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}
