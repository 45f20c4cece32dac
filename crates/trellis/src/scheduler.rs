//! Read-side projections: effective status, ready work and blocked work.
//!
//! Everything here is a pure function of a [`ProjectState`], recomputed from
//! scratch on each call. At the scale of one project (hundreds of issues) a
//! full scan is cheap and can never drift from the stored data.
//!
//! # Effective status
//!
//! The stored status only records what callers set. Reads report:
//!
//! - `closed` if the issue is closed
//! - `blocked` if it was manually blocked, or any dependency is not closed
//! - the stored status otherwise
//!
//! Manual blocks persist until an explicit unblock; graph-derived blocking is
//! never stored and clears as soon as the last blocker closes.

use crate::domain::{Issue, IssueFilter, IssueId, IssueStatus};
use crate::graph;
use crate::store::ProjectState;
use serde::Serialize;

/// A blocked issue together with what blocks it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BlockedIssue {
    /// The issue, with effective status `blocked`.
    pub issue: Issue,
    /// Non-closed dependencies, in insertion order.
    pub blocked_by: Vec<IssueId>,
    /// Manual block note, if the issue was blocked explicitly.
    pub blocking_notes: Option<String>,
}

/// Status reported to callers for `issue`.
#[must_use]
pub fn effective_status(state: &ProjectState, issue: &Issue) -> IssueStatus {
    resolve_status(issue, graph::is_graph_blocked(state, &issue.id))
}

fn resolve_status(issue: &Issue, graph_blocked: bool) -> IssueStatus {
    if issue.is_closed() {
        IssueStatus::Closed
    } else if issue.is_manually_blocked() || graph_blocked {
        IssueStatus::Blocked
    } else {
        issue.status
    }
}

/// Clone `issue` with its status replaced by the effective status.
#[must_use]
pub fn with_effective_status(state: &ProjectState, issue: &Issue) -> Issue {
    let mut view = issue.clone();
    view.status = effective_status(state, issue);
    view
}

/// All issues in insertion order, filtered, then truncated.
///
/// A status filter matches the effective status.
#[must_use]
pub fn list(state: &ProjectState, filter: &IssueFilter) -> Vec<Issue> {
    let graph_blocked = graph::graph_blocked_issues(state);
    let matching = state
        .issues()
        .iter()
        .filter(|issue| filter.matches_fields(issue))
        .map(|issue| {
            let mut view = issue.clone();
            view.status = resolve_status(issue, graph_blocked.contains(&issue.id));
            view
        })
        .filter(|issue| filter.status.is_none_or(|status| issue.status == status));

    match filter.limit {
        Some(limit) => matching.take(limit).collect(),
        None => matching.collect(),
    }
}

/// Issues that can be worked on now.
///
/// An issue is ready when its stored status is `open` and every dependency is
/// closed. Results are ordered by priority (0 first), then creation time,
/// then id; `limit` applies after ordering. The status field of `filter` is
/// ignored.
#[must_use]
pub fn ready(state: &ProjectState, filter: &IssueFilter) -> Vec<Issue> {
    let mut ready: Vec<Issue> = state
        .issues()
        .iter()
        .filter(|issue| issue.status == IssueStatus::Open)
        .filter(|issue| filter.matches_fields(issue))
        .filter(|issue| !graph::is_graph_blocked(state, &issue.id))
        .cloned()
        .collect();

    ready.sort_by(|a, b| {
        a.priority
            .cmp(&b.priority)
            .then(a.created_at.cmp(&b.created_at))
            .then(a.id.cmp(&b.id))
    });

    if let Some(limit) = filter.limit {
        ready.truncate(limit);
    }
    ready
}

/// Non-closed issues that are manually blocked or wait on an open dependency.
///
/// Results follow insertion order; `limit` truncates. The status field of
/// `filter` is ignored.
#[must_use]
pub fn blocked(state: &ProjectState, filter: &IssueFilter) -> Vec<BlockedIssue> {
    let matching = state
        .issues()
        .iter()
        .filter(|issue| !issue.is_closed())
        .filter(|issue| filter.matches_fields(issue))
        .filter_map(|issue| {
            let blocked_by = graph::open_blockers(state, &issue.id);
            if blocked_by.is_empty() && !issue.is_manually_blocked() {
                return None;
            }
            let mut view = issue.clone();
            view.status = IssueStatus::Blocked;
            Some(BlockedIssue {
                blocking_notes: issue.blocking_notes.clone(),
                issue: view,
                blocked_by,
            })
        });

    match filter.limit {
        Some(limit) => matching.take(limit).collect(),
        None => matching.collect(),
    }
}
