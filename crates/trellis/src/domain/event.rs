//! Append-only event records.

use super::{Issue, IssueId, SessionId};
use crate::error::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::fmt;
use uuid::Uuid;

/// Kind of change an [`Event`] records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    /// Issue created; payload `{issue}`.
    Created,
    /// Fields changed; payload `{changes: {field: {old, new}}}`.
    Updated,
    /// Issue closed; payload `{reason}`.
    Closed,
    /// Dependency added; payload `{depends_on_id}`.
    DepAdded,
    /// Dependency removed; payload `{depends_on_id}`.
    DepRemoved,
    /// A session ended while the issue was in progress; payload `{reason}`.
    SessionEnded,
    /// Issue pushed to the external tracker; payload `{metadata}`.
    Synced,
}

impl EventType {
    /// Returns the wire name of the event type.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Updated => "updated",
            Self::Closed => "closed",
            Self::DepAdded => "dep_added",
            Self::DepRemoved => "dep_removed",
            Self::SessionEnded => "session_ended",
            Self::Synced => "synced",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Immutable record of one change to one issue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Random v4 UUID.
    pub event_id: Uuid,

    /// The issue the event belongs to.
    pub issue_id: IssueId,

    /// The session that performed the change.
    pub session_id: SessionId,

    /// What happened.
    pub event_type: EventType,

    /// When it happened.
    pub timestamp: DateTime<Utc>,

    /// Event-type-specific details.
    pub payload: Value,
}

impl Event {
    fn new(
        issue_id: IssueId,
        session_id: &SessionId,
        event_type: EventType,
        timestamp: DateTime<Utc>,
        payload: Value,
    ) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            issue_id,
            session_id: session_id.clone(),
            event_type,
            timestamp,
            payload,
        }
    }

    /// A `created` event carrying the full initial record.
    ///
    /// # Errors
    ///
    /// Returns an error if the issue cannot be serialized.
    pub fn created(issue: &Issue, session_id: &SessionId) -> Result<Self> {
        let payload = json!({ "issue": serde_json::to_value(issue)? });
        Ok(Self::new(
            issue.id.clone(),
            session_id,
            EventType::Created,
            issue.created_at,
            payload,
        ))
    }

    /// An `updated` event; `changes` maps field names to `{old, new}`.
    #[must_use]
    pub fn updated(
        issue_id: IssueId,
        session_id: &SessionId,
        at: DateTime<Utc>,
        changes: Map<String, Value>,
    ) -> Self {
        Self::new(
            issue_id,
            session_id,
            EventType::Updated,
            at,
            json!({ "changes": changes }),
        )
    }

    /// A `closed` event.
    #[must_use]
    pub fn closed(issue_id: IssueId, session_id: &SessionId, at: DateTime<Utc>, reason: &str) -> Self {
        Self::new(
            issue_id,
            session_id,
            EventType::Closed,
            at,
            json!({ "reason": reason }),
        )
    }

    /// A `dep_added` or `dep_removed` event.
    #[must_use]
    pub fn dependency(
        event_type: EventType,
        issue_id: IssueId,
        depends_on_id: &IssueId,
        session_id: &SessionId,
        at: DateTime<Utc>,
    ) -> Self {
        Self::new(
            issue_id,
            session_id,
            event_type,
            at,
            json!({ "depends_on_id": depends_on_id.as_str() }),
        )
    }

    /// A `session_ended` event.
    #[must_use]
    pub fn session_ended(issue_id: IssueId, session_id: &SessionId, at: DateTime<Utc>) -> Self {
        Self::new(
            issue_id,
            session_id,
            EventType::SessionEnded,
            at,
            json!({ "reason": "session terminated" }),
        )
    }

    /// A `synced` event recording the metadata keys stamped back.
    #[must_use]
    pub fn synced(
        issue_id: IssueId,
        session_id: &SessionId,
        at: DateTime<Utc>,
        metadata: Map<String, Value>,
    ) -> Self {
        Self::new(
            issue_id,
            session_id,
            EventType::Synced,
            at,
            json!({ "metadata": metadata }),
        )
    }

    /// The `depends_on_id` of a dependency event.
    #[must_use]
    pub fn depends_on_id(&self) -> Option<IssueId> {
        self.payload
            .get("depends_on_id")
            .and_then(Value::as_str)
            .map(IssueId::from)
    }

    /// The `reason` of a `closed` or `session_ended` event.
    #[must_use]
    pub fn reason(&self) -> Option<&str> {
        self.payload.get("reason").and_then(Value::as_str)
    }
}
