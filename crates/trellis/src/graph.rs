//! Dependency graph queries over a [`ProjectState`].
//!
//! Edges point from **dependent -> dependency**, so outgoing edges of a node
//! are the issues it waits on and incoming edges are the issues waiting on it.
//! An issue is graph-blocked while any outgoing edge targets a non-closed
//! issue.

use crate::domain::{Issue, IssueId};
use crate::error::{Error, Result};
use crate::store::ProjectState;
use petgraph::visit::EdgeRef;
use petgraph::Direction;
use std::collections::HashSet;

/// Validate a prospective edge `issue_id -> depends_on_id`.
///
/// # Errors
///
/// - `Error::IssueNotFound` if either issue doesn't exist
/// - `Error::Validation` for a self-dependency
/// - `Error::CircularDependency` if `issue_id` is reachable from `depends_on_id`
pub fn check_new_dependency(
    state: &ProjectState,
    issue_id: &IssueId,
    depends_on_id: &IssueId,
) -> Result<()> {
    state.require(issue_id)?;
    state.require(depends_on_id)?;

    if issue_id == depends_on_id {
        return Err(Error::validation(format!(
            "Issue {issue_id} cannot depend on itself."
        )));
    }

    if state.would_create_cycle(issue_id, depends_on_id) {
        return Err(Error::CircularDependency {
            from: issue_id.clone(),
            to: depends_on_id.clone(),
        });
    }

    Ok(())
}

/// Issues that `id` depends on, in insertion order.
///
/// # Errors
///
/// Returns `Error::IssueNotFound` if `id` doesn't exist.
pub fn dependencies_of<'a>(state: &'a ProjectState, id: &IssueId) -> Result<Vec<&'a Issue>> {
    neighbors(state, id, Direction::Outgoing)
}

/// Issues that depend on `id`, in insertion order.
///
/// # Errors
///
/// Returns `Error::IssueNotFound` if `id` doesn't exist.
pub fn dependents_of<'a>(state: &'a ProjectState, id: &IssueId) -> Result<Vec<&'a Issue>> {
    neighbors(state, id, Direction::Incoming)
}

fn neighbors<'a>(
    state: &'a ProjectState,
    id: &IssueId,
    direction: Direction,
) -> Result<Vec<&'a Issue>> {
    let node = state
        .node(id)
        .ok_or_else(|| Error::IssueNotFound(id.clone()))?;
    let graph = state.graph();

    let mut found: Vec<&Issue> = graph
        .edges_directed(node, direction)
        .map(|edge| match direction {
            Direction::Outgoing => &graph[edge.target()],
            Direction::Incoming => &graph[edge.source()],
        })
        .filter_map(|other| state.issue(other))
        .collect();
    found.sort_by_key(|issue| state.position(&issue.id));
    Ok(found)
}

/// Non-closed issues that `id` waits on, in insertion order.
///
/// Unknown ids have no blockers.
#[must_use]
pub fn open_blockers(state: &ProjectState, id: &IssueId) -> Vec<IssueId> {
    dependencies_of(state, id)
        .map(|deps| {
            deps.into_iter()
                .filter(|dep| !dep.is_closed())
                .map(|dep| dep.id.clone())
                .collect()
        })
        .unwrap_or_default()
}

/// Whether any dependency of `id` is still open.
#[must_use]
pub fn is_graph_blocked(state: &ProjectState, id: &IssueId) -> bool {
    let Some(node) = state.node(id) else {
        return false;
    };
    let graph = state.graph();
    graph.edges(node).any(|edge| {
        state
            .issue(&graph[edge.target()])
            .is_some_and(|blocker| !blocker.is_closed())
    })
}

/// Every non-closed issue with at least one open dependency.
#[must_use]
pub fn graph_blocked_issues(state: &ProjectState) -> HashSet<IssueId> {
    state
        .issues()
        .iter()
        .filter(|issue| !issue.is_closed() && is_graph_blocked(state, &issue.id))
        .map(|issue| issue.id.clone())
        .collect()
}
