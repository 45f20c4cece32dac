//! Session history reconstructed from the event log.
//!
//! A session is not stored anywhere; it is the set of events that carry the
//! same `session_id`.

use crate::domain::{Event, EventType, IssueId, IssueStatus, SessionId};
use crate::error::Result;
use crate::store::IssueStore;
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};
use tracing::{debug, info};

/// Per-issue session history.
#[derive(Debug, Clone, Serialize)]
pub struct SessionHistory {
    /// The issue the history belongs to.
    pub issue_id: IssueId,
    /// Distinct sessions in order of first appearance.
    pub linked_sessions: Vec<SessionId>,
    /// Number of distinct sessions.
    pub session_count: usize,
    /// Events of each session, in log order.
    pub events_by_session: BTreeMap<String, Vec<Event>>,
    /// One-line summary to help a new session pick the work up.
    pub hint: String,
}

impl SessionHistory {
    /// Group an issue's events (in log order) by session.
    #[must_use]
    pub fn from_events(issue_id: IssueId, events: Vec<Event>) -> Self {
        let mut linked_sessions: Vec<SessionId> = Vec::new();
        let mut events_by_session: BTreeMap<String, Vec<Event>> = BTreeMap::new();

        for event in events {
            if !linked_sessions.contains(&event.session_id) {
                linked_sessions.push(event.session_id.clone());
            }
            events_by_session
                .entry(event.session_id.as_str().to_string())
                .or_default()
                .push(event);
        }

        let hint = resume_hint(&issue_id, &linked_sessions, &events_by_session);
        Self {
            issue_id,
            session_count: linked_sessions.len(),
            linked_sessions,
            events_by_session,
            hint,
        }
    }
}

fn resume_hint(
    issue_id: &IssueId,
    linked_sessions: &[SessionId],
    events_by_session: &BTreeMap<String, Vec<Event>>,
) -> String {
    let Some(latest) = linked_sessions.last() else {
        return format!("No recorded activity for {issue_id}.");
    };

    let interrupted = events_by_session
        .get(latest.as_str())
        .and_then(|events| events.last())
        .is_some_and(|event| event.event_type == EventType::SessionEnded);

    if interrupted {
        format!(
            "Work on {issue_id} was interrupted when session {latest} ended; review its events before resuming."
        )
    } else {
        format!(
            "{} session(s) touched {issue_id}; the most recent was {latest}.",
            linked_sessions.len()
        )
    }
}

/// Session history of one issue.
///
/// # Errors
///
/// Returns `Error::IssueNotFound` if the issue doesn't exist.
pub async fn get_sessions(store: &dyn IssueStore, issue_id: &IssueId) -> Result<SessionHistory> {
    store.snapshot().await?.require(issue_id)?;
    let events = store.events_for(issue_id).await?;
    debug!(%issue_id, events = events.len(), "Loaded session history");
    Ok(SessionHistory::from_events(issue_id.clone(), events))
}

/// Record that `session_id` ended.
///
/// Every issue whose stored status is `in_progress` and whose history
/// contains `session_id` gains a `session_ended` event, unless it already has
/// one from the same session. Candidates are found with a lock-free scan and
/// each append re-checks eligibility under the project lock.
///
/// Returns the ids that were marked, in insertion order.
///
/// # Errors
///
/// Returns the first store error; issues marked before it stay marked.
pub async fn session_ended(store: &dyn IssueStore, session_id: &SessionId) -> Result<Vec<IssueId>> {
    let state = store.snapshot().await?;
    let events = store.events().await?;

    let touched: HashSet<&IssueId> = events
        .iter()
        .filter(|event| event.session_id == *session_id)
        .map(|event| &event.issue_id)
        .collect();

    let mut marked = Vec::new();
    for issue in state.issues() {
        if issue.status != IssueStatus::InProgress || !touched.contains(&issue.id) {
            continue;
        }
        if store.record_session_ended(&issue.id, session_id).await? {
            marked.push(issue.id.clone());
        }
    }

    info!(session_id = %session_id, marked = marked.len(), "Processed session end");
    Ok(marked)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn session(id: &str) -> SessionId {
        SessionId::parse(id).unwrap()
    }

    #[test]
    fn sessions_are_listed_in_first_occurrence_order() {
        let id = IssueId::new("p-1");
        let events = vec![
            Event::closed(id.clone(), &session("s2"), Utc::now(), "x"),
            Event::closed(id.clone(), &session("s1"), Utc::now(), "x"),
            Event::closed(id.clone(), &session("s2"), Utc::now(), "x"),
            Event::closed(id.clone(), &session("s3"), Utc::now(), "x"),
        ];

        let history = SessionHistory::from_events(id, events);
        assert_eq!(
            history.linked_sessions,
            vec![session("s2"), session("s1"), session("s3")]
        );
        assert_eq!(history.session_count, 3);
        assert_eq!(history.events_by_session["s2"].len(), 2);
        assert!(history.hint.contains("s3"));
    }

    #[test]
    fn hint_flags_interrupted_work() {
        let id = IssueId::new("p-1");
        let events = vec![
            Event::closed(id.clone(), &session("s1"), Utc::now(), "x"),
            Event::session_ended(id.clone(), &session("s1"), Utc::now()),
        ];
        let history = SessionHistory::from_events(id, events);
        assert!(history.hint.contains("interrupted"));
    }
}
