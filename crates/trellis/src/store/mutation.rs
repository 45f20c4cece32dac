//! Pure mutations over a [`ProjectState`].
//!
//! Each function validates against the state it is given, applies the change
//! in place and returns the events that describe it. Nothing here touches the
//! filesystem; on error the state is left as it was.

use super::ProjectState;
use crate::domain::{
    validate_priority, validate_title, DependencyRecord, Event, EventType, Issue, IssueId,
    IssueStatus, IssueUpdate, NewIssue, SessionId, DEFAULT_ISSUE_TYPE, GITHUB_URL_KEY,
};
use crate::error::{Error, Result, StorageError};
use crate::graph;
use crate::id_generation::IdGenerator;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{json, Map, Value};

/// Which materialized files a mutation changed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct Touched {
    pub issues: bool,
    pub dependencies: bool,
}

/// Result of a mutation: its value, the events to append and what to rewrite.
#[derive(Debug)]
pub(crate) struct Applied<T> {
    pub value: T,
    pub events: Vec<Event>,
    pub touched: Touched,
}

impl<T> Applied<T> {
    fn unchanged(value: T) -> Self {
        Self {
            value,
            events: Vec::new(),
            touched: Touched::default(),
        }
    }
}

pub(crate) fn create(
    state: &mut ProjectState,
    ids: &mut IdGenerator,
    new: NewIssue,
    session_id: &SessionId,
    now: DateTime<Utc>,
) -> Result<Applied<IssueId>> {
    new.validate()?;

    let mut dependencies: Vec<IssueId> = Vec::with_capacity(new.dependencies.len());
    for dep in new.dependencies {
        state.require(&dep)?;
        if !dependencies.contains(&dep) {
            dependencies.push(dep);
        }
    }

    let title = new.title.trim().to_string();
    let id = ids
        .generate(&title, |candidate| state.contains(&IssueId::from(candidate)))
        .map(IssueId::from)
        .map_err(|e| StorageError::IdGeneration(e.to_string()))?;

    let issue_type = match new.issue_type.trim() {
        "" => DEFAULT_ISSUE_TYPE.to_string(),
        other => other.to_string(),
    };

    let issue = Issue {
        id: id.clone(),
        title,
        description: new.description,
        issue_type,
        status: IssueStatus::Open,
        priority: new.priority,
        assignee: normalize_assignee(new.assignee),
        blocking_notes: None,
        metadata: new.metadata,
        created_at: now,
        updated_at: now,
        closed_at: None,
        resolution: None,
    };

    let mut events = vec![Event::created(&issue, session_id)?];
    state.insert_issue(issue);

    for dep in &dependencies {
        state.add_edge(DependencyRecord {
            issue_id: id.clone(),
            depends_on_id: dep.clone(),
            created_at: now,
        });
        events.push(Event::dependency(
            EventType::DepAdded,
            id.clone(),
            dep,
            session_id,
            now,
        ));
    }

    Ok(Applied {
        value: id,
        events,
        touched: Touched {
            issues: true,
            dependencies: !dependencies.is_empty(),
        },
    })
}

pub(crate) fn update(
    state: &mut ProjectState,
    id: &IssueId,
    update: IssueUpdate,
    session_id: &SessionId,
    now: DateTime<Utc>,
) -> Result<Applied<IssueId>> {
    let changes = {
        let issue = state.require(id)?;
        if issue.is_closed() && update.touches_fields() {
            return Err(Error::validation(format!(
                "Issue {id} is closed; only metadata can change. Closed issues cannot be reopened, create a new issue instead."
            )));
        }
        collect_changes(issue, &update)?
    };

    if changes.is_empty() {
        return Ok(Applied::unchanged(id.clone()));
    }

    apply_changes(state.issue_mut(id)?, &changes, now)?;

    Ok(Applied {
        value: id.clone(),
        events: vec![Event::updated(id.clone(), session_id, now, changes)],
        touched: Touched {
            issues: true,
            dependencies: false,
        },
    })
}

/// Validate `update` against `issue` and describe it as `{field: {old, new}}`.
fn collect_changes(issue: &Issue, update: &IssueUpdate) -> Result<Map<String, Value>> {
    let id = &issue.id;
    let mut changes = Map::new();

    if let Some(title) = &update.title {
        validate_title(title)?;
        record_change(&mut changes, "title", issue.title.as_str(), title.trim())?;
    }

    if let Some(description) = &update.description {
        record_change(
            &mut changes,
            "description",
            issue.description.as_str(),
            description.as_str(),
        )?;
    }

    if let Some(issue_type) = &update.issue_type {
        let issue_type = issue_type.trim();
        if issue_type.is_empty() {
            return Err(Error::validation("Issue type cannot be empty."));
        }
        record_change(&mut changes, "issue_type", issue.issue_type.as_str(), issue_type)?;
    }

    if let Some(priority) = update.priority {
        validate_priority(priority)?;
        record_change(&mut changes, "priority", &issue.priority, &priority)?;
    }

    if let Some(assignee) = &update.assignee {
        let assignee = normalize_assignee(assignee.clone());
        record_change(
            &mut changes,
            "assignee",
            &issue.assignee.as_deref(),
            &assignee.as_deref(),
        )?;
    }

    let notes = match &update.blocking_notes {
        Some(notes) => {
            let trimmed = notes.trim();
            if trimmed.is_empty() {
                return Err(Error::validation("blocking_notes cannot be empty."));
            }
            Some(trimmed)
        }
        None => None,
    };

    match update.status {
        Some(target) if target != issue.status => {
            status_change(issue, target, notes, &mut changes)?;
        }
        _ => {
            if let Some(notes) = notes {
                if issue.status != IssueStatus::Blocked {
                    return Err(Error::validation(format!(
                        "blocking_notes only apply to blocked issues; set status to blocked on {id} together with the note."
                    )));
                }
                record_change(
                    &mut changes,
                    "blocking_notes",
                    &issue.blocking_notes.as_deref(),
                    &Some(notes),
                )?;
            }
        }
    }

    if let Some(patch) = &update.metadata {
        let mut merged = issue.metadata.clone();
        for (key, value) in patch {
            if value.is_null() {
                merged.remove(key);
            } else {
                merged.insert(key.clone(), value.clone());
            }
        }
        record_change(&mut changes, "metadata", &issue.metadata, &merged)?;
    }

    Ok(changes)
}

fn status_change(
    issue: &Issue,
    target: IssueStatus,
    notes: Option<&str>,
    changes: &mut Map<String, Value>,
) -> Result<()> {
    use IssueStatus::{Blocked, Closed, InProgress, Open};

    let id = &issue.id;
    match (issue.status, target) {
        (_, Closed) => {
            return Err(Error::validation(format!(
                "Use close to close issue {id}; closing requires a reason."
            )));
        }
        (Open, InProgress) | (InProgress, Open) => {
            if notes.is_some() {
                return Err(Error::validation(format!(
                    "blocking_notes only apply when setting {id} to blocked."
                )));
            }
        }
        (Open | InProgress, Blocked) => {
            let Some(notes) = notes else {
                return Err(Error::validation(format!(
                    "Setting {id} to blocked requires blocking_notes explaining what it waits on."
                )));
            };
            record_change(
                changes,
                "blocking_notes",
                &issue.blocking_notes.as_deref(),
                &Some(notes),
            )?;
        }
        (Blocked, Open) => {
            if notes.is_some() {
                return Err(Error::validation(format!(
                    "blocking_notes cannot be set while unblocking {id}."
                )));
            }
            record_change(
                changes,
                "blocking_notes",
                &issue.blocking_notes.as_deref(),
                &None::<&str>,
            )?;
        }
        (Blocked, InProgress) => {
            return Err(Error::validation(format!(
                "Issue {id} is blocked; set its status to open to unblock it before starting work."
            )));
        }
        (from, to) => {
            return Err(Error::validation(format!(
                "Issue {id} cannot move from {from} to {to}."
            )));
        }
    }

    record_change(changes, "status", &issue.status, &target)
}

fn record_change<T>(changes: &mut Map<String, Value>, field: &str, old: &T, new: &T) -> Result<()>
where
    T: Serialize + PartialEq + ?Sized,
{
    if old != new {
        changes.insert(
            field.to_string(),
            json!({ "old": serde_json::to_value(old)?, "new": serde_json::to_value(new)? }),
        );
    }
    Ok(())
}

fn normalize_assignee(assignee: Option<String>) -> Option<String> {
    assignee
        .map(|a| a.trim().to_string())
        .filter(|a| !a.is_empty())
}

/// Write the `new` side of each change onto `issue`.
///
/// Shared with event replay so live mutations and rebuilds agree.
pub(crate) fn apply_changes(
    issue: &mut Issue,
    changes: &Map<String, Value>,
    at: DateTime<Utc>,
) -> Result<()> {
    let mut record = serde_json::to_value(&*issue)?;
    if let Value::Object(fields) = &mut record {
        for (field, change) in changes {
            if matches!(field.as_str(), "id" | "created_at") {
                return Err(Error::validation(format!("Field {field} cannot be changed.")));
            }
            let new = change.get("new").cloned().unwrap_or(Value::Null);
            fields.insert(field.clone(), new);
        }
    }
    let mut updated: Issue = serde_json::from_value(record)?;
    updated.updated_at = at;
    *issue = updated;
    Ok(())
}

pub(crate) fn close(
    state: &mut ProjectState,
    id: &IssueId,
    reason: Option<&str>,
    session_id: &SessionId,
    now: DateTime<Utc>,
) -> Result<Applied<IssueId>> {
    if state.require(id)?.is_closed() {
        return Ok(Applied::unchanged(id.clone()));
    }

    let reason = reason
        .map(str::trim)
        .filter(|r| !r.is_empty())
        .ok_or_else(|| {
            Error::validation(format!(
                "A non-empty reason is required to close issue {id}."
            ))
        })?;

    apply_close(state.issue_mut(id)?, reason, now);

    Ok(Applied {
        value: id.clone(),
        events: vec![Event::closed(id.clone(), session_id, now, reason)],
        touched: Touched {
            issues: true,
            dependencies: false,
        },
    })
}

pub(crate) fn apply_close(issue: &mut Issue, reason: &str, at: DateTime<Utc>) {
    issue.status = IssueStatus::Closed;
    issue.blocking_notes = None;
    issue.resolution = Some(reason.to_string());
    issue.closed_at = Some(at);
    issue.updated_at = at;
}

pub(crate) fn add_dependency(
    state: &mut ProjectState,
    issue_id: &IssueId,
    depends_on_id: &IssueId,
    session_id: &SessionId,
    now: DateTime<Utc>,
) -> Result<Applied<bool>> {
    graph::check_new_dependency(state, issue_id, depends_on_id)?;

    if state.has_edge(issue_id, depends_on_id) {
        return Ok(Applied::unchanged(false));
    }

    if state.require(issue_id)?.is_closed() {
        return Err(Error::validation(format!(
            "Issue {issue_id} is closed and cannot gain dependencies."
        )));
    }

    state.add_edge(DependencyRecord {
        issue_id: issue_id.clone(),
        depends_on_id: depends_on_id.clone(),
        created_at: now,
    });

    Ok(Applied {
        value: true,
        events: vec![Event::dependency(
            EventType::DepAdded,
            issue_id.clone(),
            depends_on_id,
            session_id,
            now,
        )],
        touched: Touched {
            issues: false,
            dependencies: true,
        },
    })
}

pub(crate) fn remove_dependency(
    state: &mut ProjectState,
    issue_id: &IssueId,
    depends_on_id: &IssueId,
    session_id: &SessionId,
    now: DateTime<Utc>,
) -> Result<Applied<bool>> {
    state.require(issue_id)?;
    state.require(depends_on_id)?;

    if !state.remove_edge(issue_id, depends_on_id) {
        return Ok(Applied::unchanged(false));
    }

    Ok(Applied {
        value: true,
        events: vec![Event::dependency(
            EventType::DepRemoved,
            issue_id.clone(),
            depends_on_id,
            session_id,
            now,
        )],
        touched: Touched {
            issues: false,
            dependencies: true,
        },
    })
}

pub(crate) fn stamp_sync(
    state: &mut ProjectState,
    id: &IssueId,
    stamp: Map<String, Value>,
    session_id: &SessionId,
    now: DateTime<Utc>,
) -> Result<Applied<IssueId>> {
    let issue = state.issue_mut(id)?;
    if let Some(existing) = issue.github_issue_number() {
        let created = stamp
            .get(GITHUB_URL_KEY)
            .and_then(Value::as_str)
            .unwrap_or("the new remote issue");
        return Err(Error::ExternalService {
            issue_id: id.clone(),
            message: format!(
                "{id} is already linked to remote issue #{existing}; {created} was not recorded locally and duplicates it"
            ),
        });
    }
    apply_sync(issue, &stamp, now);

    Ok(Applied {
        value: id.clone(),
        events: vec![Event::synced(id.clone(), session_id, now, stamp)],
        touched: Touched {
            issues: true,
            dependencies: false,
        },
    })
}

pub(crate) fn apply_sync(issue: &mut Issue, stamp: &Map<String, Value>, at: DateTime<Utc>) {
    for (key, value) in stamp {
        issue.metadata.insert(key.clone(), value.clone());
    }
    issue.updated_at = at;
}

/// Mark `id` as interrupted by the end of `session_id`.
///
/// `history` is the issue's event history in log order.
pub(crate) fn session_ended(
    state: &ProjectState,
    history: &[Event],
    id: &IssueId,
    session_id: &SessionId,
    now: DateTime<Utc>,
) -> Result<Applied<bool>> {
    let issue = state.require(id)?;

    let touched_by_session = history.iter().any(|e| e.session_id == *session_id);
    let already_marked = history
        .iter()
        .any(|e| e.event_type == EventType::SessionEnded && e.session_id == *session_id);

    if issue.status != IssueStatus::InProgress || !touched_by_session || already_marked {
        return Ok(Applied::unchanged(false));
    }

    Ok(Applied {
        value: true,
        events: vec![Event::session_ended(id.clone(), session_id, now)],
        touched: Touched::default(),
    })
}
