//! Rebuild a [`ProjectState`] from the event log.

use super::mutation::{apply_changes, apply_close, apply_sync};
use super::{LoadWarning, ProjectState};
use crate::domain::{DependencyRecord, Event, EventType, Issue};
use crate::graph;
use serde_json::Value;
use tracing::warn;

/// Fold `events` in log order into a fresh state.
///
/// Events that cannot be applied (unknown issue, would-be cycle, malformed
/// payload) are skipped and reported; replay never aborts.
pub(crate) fn replay(events: &[Event]) -> (ProjectState, Vec<LoadWarning>) {
    let mut state = ProjectState::new();
    let mut warnings = Vec::new();

    for event in events {
        if let Err(reason) = apply_event(&mut state, event) {
            warn!(event_id = %event.event_id, issue_id = %event.issue_id, %reason, "Skipping event during replay");
            warnings.push(LoadWarning::InvalidEvent {
                event_id: event.event_id,
                reason,
            });
        }
    }

    (state, warnings)
}

fn apply_event(state: &mut ProjectState, event: &Event) -> Result<(), String> {
    match event.event_type {
        EventType::Created => {
            let record = event
                .payload
                .get("issue")
                .cloned()
                .ok_or("created event has no issue")?;
            let issue: Issue = serde_json::from_value(record).map_err(|e| e.to_string())?;
            if issue.id != event.issue_id {
                return Err(format!("payload issue {} does not match event", issue.id));
            }
            if state.contains(&issue.id) {
                return Err(format!("issue {} was already created", issue.id));
            }
            state.insert_issue(issue);
        }
        EventType::Updated => {
            let changes = event
                .payload
                .get("changes")
                .and_then(Value::as_object)
                .ok_or("updated event has no changes")?;
            let issue = state.issue_mut(&event.issue_id).map_err(|e| e.to_string())?;
            apply_changes(issue, changes, event.timestamp).map_err(|e| e.to_string())?;
        }
        EventType::Closed => {
            let reason = event.reason().unwrap_or_default().to_string();
            let issue = state.issue_mut(&event.issue_id).map_err(|e| e.to_string())?;
            apply_close(issue, &reason, event.timestamp);
        }
        EventType::DepAdded => {
            let target = event.depends_on_id().ok_or("dependency event has no target")?;
            graph::check_new_dependency(state, &event.issue_id, &target)
                .map_err(|e| e.to_string())?;
            state.add_edge(DependencyRecord {
                issue_id: event.issue_id.clone(),
                depends_on_id: target,
                created_at: event.timestamp,
            });
        }
        EventType::DepRemoved => {
            let target = event.depends_on_id().ok_or("dependency event has no target")?;
            state.remove_edge(&event.issue_id, &target);
        }
        EventType::Synced => {
            let stamp = event
                .payload
                .get("metadata")
                .and_then(Value::as_object)
                .ok_or("synced event has no metadata")?;
            let issue = state.issue_mut(&event.issue_id).map_err(|e| e.to_string())?;
            apply_sync(issue, stamp, event.timestamp);
        }
        EventType::SessionEnded => {}
    }
    Ok(())
}
