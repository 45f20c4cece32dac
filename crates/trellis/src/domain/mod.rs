//! Domain types for the issue manager.
//!
//! This module contains the records persisted by the store (issues,
//! dependency edges and events) and the inputs accepted by its mutations.

mod event;

pub use event::{Event, EventType};

use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Lowest (most urgent) priority level.
pub const MIN_PRIORITY: u8 = 0;

/// Highest (least urgent) priority level.
pub const MAX_PRIORITY: u8 = 4;

/// Priority assigned when a caller does not choose one.
pub const DEFAULT_PRIORITY: u8 = 2;

/// Issue type assigned when a caller does not choose one.
pub const DEFAULT_ISSUE_TYPE: &str = "task";

/// Maximum title length in characters.
pub const MAX_TITLE_LENGTH: usize = 500;

/// Metadata key holding the remote issue number once synced.
pub const GITHUB_ISSUE_NUMBER_KEY: &str = "github_issue_number";

/// Metadata key holding the remote issue URL once synced.
pub const GITHUB_URL_KEY: &str = "github_url";

/// Metadata key holding the repository an issue was synced to.
pub const GITHUB_REPO_KEY: &str = "github_repo";

/// Metadata key holding the time an issue was synced.
pub const SYNCED_AT_KEY: &str = "synced_at";

/// Metadata key used for the `area:*` label.
pub const AREA_KEY: &str = "area";

/// Unique identifier for an issue
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IssueId(String);

impl IssueId {
    /// Create a new issue ID
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the ID as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for IssueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for IssueId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for IssueId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Caller-supplied identifier of one bounded unit of agent work.
///
/// Recorded verbatim on every event a mutation appends.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    /// Validate and wrap a session id.
    ///
    /// # Errors
    ///
    /// Returns a validation error if the id is empty or only whitespace.
    pub fn parse(id: impl Into<String>) -> Result<Self> {
        let id = id.into();
        if id.trim().is_empty() {
            return Err(Error::validation(
                "session_id is required for every mutating operation and cannot be empty.",
            ));
        }
        Ok(Self(id))
    }

    /// Borrow the session id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Status of an issue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueStatus {
    /// Issue is open and may be worked on once its dependencies close
    Open,

    /// Issue is currently being worked on
    #[serde(alias = "in-progress")]
    InProgress,

    /// Issue is blocked, manually or by an unclosed dependency
    Blocked,

    /// Issue has been completed; terminal
    Closed,
}

impl IssueStatus {
    /// Returns the wire name of the status.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::InProgress => "in_progress",
            Self::Blocked => "blocked",
            Self::Closed => "closed",
        }
    }
}

impl fmt::Display for IssueStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returns the human name of a priority level.
#[must_use]
pub fn priority_name(priority: u8) -> &'static str {
    match priority {
        0 => "critical",
        1 => "high",
        2 => "normal",
        3 => "low",
        _ => "deferred",
    }
}

/// A priority as supplied by a caller: a level or a name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PriorityInput {
    /// Numeric level, 0 (critical) to 4 (deferred).
    Level(i64),
    /// One of `critical`, `high`, `medium`, `normal`, `low`, `deferred`.
    Name(String),
}

impl PriorityInput {
    /// Resolve to a level in `0..=4`.
    ///
    /// # Errors
    ///
    /// Returns a validation error for out-of-range levels and unknown names.
    pub fn resolve(&self) -> Result<u8> {
        match self {
            Self::Level(level) => u8::try_from(*level)
                .ok()
                .filter(|p| *p <= MAX_PRIORITY)
                .ok_or_else(|| {
                    Error::validation(format!(
                        "Invalid priority {level}. Use 0-4 or one of: critical, high, normal, low, deferred."
                    ))
                }),
            Self::Name(name) => match name.trim().to_ascii_lowercase().as_str() {
                "critical" => Ok(0),
                "high" => Ok(1),
                "medium" | "normal" => Ok(2),
                "low" => Ok(3),
                "deferred" => Ok(4),
                other => other.parse::<i64>().map_or_else(
                    |_| {
                        Err(Error::validation(format!(
                            "Invalid priority '{name}'. Use 0-4 or one of: critical, high, normal, low, deferred."
                        )))
                    },
                    |level| Self::Level(level).resolve(),
                ),
            },
        }
    }
}

/// Represents an issue in the tracking system
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Issue {
    /// Unique identifier for the issue
    pub id: IssueId,

    /// Issue title
    pub title: String,

    /// Issue description
    #[serde(default)]
    pub description: String,

    /// Free-form classification, e.g. "task" or "bug"
    #[serde(default = "default_issue_type")]
    pub issue_type: String,

    /// Current status
    pub status: IssueStatus,

    /// Priority level (0 = critical, 4 = deferred)
    pub priority: u8,

    /// Assignee (optional)
    #[serde(default)]
    pub assignee: Option<String>,

    /// Why the issue was manually blocked
    #[serde(default)]
    pub blocking_notes: Option<String>,

    /// Arbitrary key/value data, including sync bookkeeping
    #[serde(default)]
    pub metadata: Map<String, Value>,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,

    /// Last update timestamp
    pub updated_at: DateTime<Utc>,

    /// Closed timestamp
    #[serde(default)]
    pub closed_at: Option<DateTime<Utc>>,

    /// Why the issue was closed
    #[serde(default)]
    pub resolution: Option<String>,
}

fn default_issue_type() -> String {
    DEFAULT_ISSUE_TYPE.to_string()
}

impl Issue {
    /// Whether the stored status is `closed`.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.status == IssueStatus::Closed
    }

    /// Whether the issue was explicitly set to `blocked`.
    #[must_use]
    pub fn is_manually_blocked(&self) -> bool {
        self.status == IssueStatus::Blocked
    }

    /// The remote issue number stamped by a previous sync, if any.
    #[must_use]
    pub fn github_issue_number(&self) -> Option<u64> {
        self.metadata
            .get(GITHUB_ISSUE_NUMBER_KEY)
            .and_then(Value::as_u64)
    }

    /// The `area` metadata value, if it is a non-empty string.
    #[must_use]
    pub fn area(&self) -> Option<&str> {
        self.metadata
            .get(AREA_KEY)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|a| !a.is_empty())
    }
}

/// Directed dependency edge: `issue_id` cannot be ready until `depends_on_id` closes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyRecord {
    /// The dependent issue.
    pub issue_id: IssueId,

    /// The issue it waits on.
    pub depends_on_id: IssueId,

    /// When the edge was added
    pub created_at: DateTime<Utc>,
}

/// Data for creating a new issue
#[derive(Debug, Clone, Default)]
pub struct NewIssue {
    /// Issue title
    pub title: String,

    /// Issue description
    pub description: String,

    /// Issue type; defaults to "task" when empty
    pub issue_type: String,

    /// Priority level (0-4)
    pub priority: u8,

    /// Assignee (optional)
    pub assignee: Option<String>,

    /// Initial metadata
    pub metadata: Map<String, Value>,

    /// Issues the new issue depends on
    pub dependencies: Vec<IssueId>,
}

impl NewIssue {
    /// Shorthand for an issue with a title and default everything else.
    pub fn titled(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            priority: DEFAULT_PRIORITY,
            ..Self::default()
        }
    }

    /// Check field-level constraints.
    ///
    /// # Errors
    ///
    /// Returns a validation error for an empty or over-long title or an
    /// out-of-range priority.
    pub fn validate(&self) -> Result<()> {
        validate_title(&self.title)?;
        validate_priority(self.priority)
    }
}

/// Data for updating an existing issue.
///
/// `None` leaves a field unchanged.
#[derive(Debug, Clone, Default)]
pub struct IssueUpdate {
    /// New title
    pub title: Option<String>,

    /// New description
    pub description: Option<String>,

    /// New issue type
    pub issue_type: Option<String>,

    /// New status
    pub status: Option<IssueStatus>,

    /// New priority
    pub priority: Option<u8>,

    /// New assignee (`Some(None)` clears it)
    pub assignee: Option<Option<String>>,

    /// Note explaining a manual block; required when moving to `blocked`
    pub blocking_notes: Option<String>,

    /// Keys to merge into metadata; a `null` value removes the key
    pub metadata: Option<Map<String, Value>>,
}

impl IssueUpdate {
    /// Whether the update touches fields other than metadata.
    #[must_use]
    pub fn touches_fields(&self) -> bool {
        self.title.is_some()
            || self.description.is_some()
            || self.issue_type.is_some()
            || self.status.is_some()
            || self.priority.is_some()
            || self.assignee.is_some()
            || self.blocking_notes.is_some()
    }
}

/// Filter for querying issues
#[derive(Debug, Clone, Default)]
pub struct IssueFilter {
    /// Filter by (effective) status
    pub status: Option<IssueStatus>,

    /// Filter by priority
    pub priority: Option<u8>,

    /// Filter by assignee
    pub assignee: Option<String>,

    /// Limit number of results
    pub limit: Option<usize>,
}

impl IssueFilter {
    /// Whether `issue` passes the assignee and priority filters.
    ///
    /// Status is checked by callers because it depends on graph state.
    #[must_use]
    pub fn matches_fields(&self, issue: &Issue) -> bool {
        if let Some(priority) = self.priority {
            if issue.priority != priority {
                return false;
            }
        }
        if let Some(assignee) = &self.assignee {
            if issue.assignee.as_deref() != Some(assignee.as_str()) {
                return false;
            }
        }
        true
    }
}

pub(crate) fn validate_title(title: &str) -> Result<()> {
    let trimmed = title.trim();
    if trimmed.is_empty() {
        return Err(Error::validation("Title cannot be empty."));
    }
    if trimmed.chars().count() > MAX_TITLE_LENGTH {
        return Err(Error::validation(format!(
            "Title cannot exceed {MAX_TITLE_LENGTH} characters."
        )));
    }
    Ok(())
}

pub(crate) fn validate_priority(priority: u8) -> Result<()> {
    if priority > MAX_PRIORITY {
        return Err(Error::validation(format!(
            "Invalid priority {priority}. Use 0-4 or one of: critical, high, normal, low, deferred."
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case::level(PriorityInput::Level(0), 0)]
    #[case::max_level(PriorityInput::Level(4), 4)]
    #[case::critical(PriorityInput::Name("critical".into()), 0)]
    #[case::high_mixed_case(PriorityInput::Name("High".into()), 1)]
    #[case::medium(PriorityInput::Name("medium".into()), 2)]
    #[case::normal(PriorityInput::Name("normal".into()), 2)]
    #[case::low(PriorityInput::Name("low".into()), 3)]
    #[case::deferred(PriorityInput::Name("deferred".into()), 4)]
    #[case::numeric_string(PriorityInput::Name("3".into()), 3)]
    fn priority_input_resolves(#[case] input: PriorityInput, #[case] expected: u8) {
        assert_eq!(input.resolve().unwrap(), expected);
    }

    #[rstest]
    #[case::negative(PriorityInput::Level(-1))]
    #[case::too_high(PriorityInput::Level(5))]
    #[case::unknown_name(PriorityInput::Name("urgent".into()))]
    fn priority_input_rejects(#[case] input: PriorityInput) {
        assert!(matches!(input.resolve(), Err(Error::Validation(_))));
    }

    #[test]
    fn priority_input_deserializes_numbers_and_names() {
        let level: PriorityInput = serde_json::from_str("1").unwrap();
        let name: PriorityInput = serde_json::from_str("\"low\"").unwrap();
        assert_eq!(level.resolve().unwrap(), 1);
        assert_eq!(name.resolve().unwrap(), 3);
    }

    #[rstest]
    #[case::snake("\"in_progress\"", IssueStatus::InProgress)]
    #[case::kebab_alias("\"in-progress\"", IssueStatus::InProgress)]
    #[case::blocked("\"blocked\"", IssueStatus::Blocked)]
    fn status_deserializes(#[case] json: &str, #[case] expected: IssueStatus) {
        let status: IssueStatus = serde_json::from_str(json).unwrap();
        assert_eq!(status, expected);
    }

    #[test]
    fn status_serializes_snake_case() {
        assert_eq!(
            serde_json::to_string(&IssueStatus::InProgress).unwrap(),
            "\"in_progress\""
        );
    }

    #[rstest]
    #[case::empty("")]
    #[case::whitespace("   ")]
    fn empty_titles_rejected(#[case] title: &str) {
        assert!(NewIssue::titled(title).validate().is_err());
    }

    #[test]
    fn over_long_title_rejected() {
        let title = "x".repeat(MAX_TITLE_LENGTH + 1);
        assert!(NewIssue::titled(title).validate().is_err());
    }

    #[test]
    fn blank_session_id_rejected() {
        assert!(SessionId::parse("  ").is_err());
        assert_eq!(SessionId::parse("s-1").unwrap().as_str(), "s-1");
    }

    #[test]
    fn issue_id_serializes_as_plain_string() {
        let json = serde_json::to_string(&IssueId::new("proj-abc")).unwrap();
        assert_eq!(json, "\"proj-abc\"");
    }

    #[test]
    fn legacy_issue_record_fills_defaults() {
        let json = r#"{
            "id": "proj-1",
            "title": "Old",
            "status": "open",
            "priority": 2,
            "created_at": "2025-01-01T00:00:00Z",
            "updated_at": "2025-01-01T00:00:00Z"
        }"#;
        let issue: Issue = serde_json::from_str(json).unwrap();
        assert_eq!(issue.issue_type, DEFAULT_ISSUE_TYPE);
        assert!(issue.metadata.is_empty());
        assert_eq!(issue.github_issue_number(), None);
    }
}
