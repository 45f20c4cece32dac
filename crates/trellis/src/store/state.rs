//! Materialized view of a project: issues, dependency edges and their graph.
//!
//! # Graph Representation
//!
//! Edges run from **dependent to dependency**: `A -> B` means A cannot be
//! ready until B closes. Every issue has a node; nodes are never removed
//! because issues are never deleted.

use super::LoadWarning;
use crate::domain::{DependencyRecord, Issue, IssueId};
use crate::error::{Error, Result};
use petgraph::algo;
use petgraph::graph::{DiGraph, NodeIndex};
use std::collections::HashMap;

/// Issues and edges of one project at one point in time.
#[derive(Debug, Clone, Default)]
pub struct ProjectState {
    /// Issues in insertion order.
    issues: Vec<Issue>,

    /// Position of each issue in `issues`.
    index: HashMap<IssueId, usize>,

    /// Edges in insertion order.
    dependencies: Vec<DependencyRecord>,

    /// Dependency graph; edge source depends on edge target.
    graph: DiGraph<IssueId, ()>,

    /// Mapping from `IssueId` to graph node. Covers every issue.
    node_map: HashMap<IssueId, NodeIndex>,
}

impl ProjectState {
    /// An empty project.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a state from stored records, skipping anything inconsistent.
    ///
    /// Duplicate issue ids keep the first record. Edges that reference an
    /// unknown issue, point at themselves, repeat an earlier edge or would
    /// close a cycle are dropped. Each skip is reported as a [`LoadWarning`].
    #[must_use]
    pub fn from_records(
        issues: Vec<Issue>,
        dependencies: Vec<DependencyRecord>,
    ) -> (Self, Vec<LoadWarning>) {
        let mut state = Self::new();
        let mut warnings = Vec::new();

        for issue in issues {
            if state.contains(&issue.id) {
                warnings.push(LoadWarning::DuplicateIssue { id: issue.id });
                continue;
            }
            state.insert_issue(issue);
        }

        for record in dependencies {
            if !state.contains(&record.issue_id) || !state.contains(&record.depends_on_id) {
                warnings.push(LoadWarning::OrphanedDependency {
                    from: record.issue_id,
                    to: record.depends_on_id,
                });
                continue;
            }
            if record.issue_id == record.depends_on_id
                || state.would_create_cycle(&record.issue_id, &record.depends_on_id)
            {
                warnings.push(LoadWarning::CircularDependency {
                    from: record.issue_id,
                    to: record.depends_on_id,
                });
                continue;
            }
            state.add_edge(record);
        }

        (state, warnings)
    }

    /// All issues in insertion order, with their stored status.
    #[must_use]
    pub fn issues(&self) -> &[Issue] {
        &self.issues
    }

    /// All edges in insertion order.
    #[must_use]
    pub fn dependencies(&self) -> &[DependencyRecord] {
        &self.dependencies
    }

    /// Whether an issue with this id exists.
    #[must_use]
    pub fn contains(&self, id: &IssueId) -> bool {
        self.index.contains_key(id)
    }

    /// Look up an issue by id.
    #[must_use]
    pub fn issue(&self, id: &IssueId) -> Option<&Issue> {
        self.index.get(id).map(|&i| &self.issues[i])
    }

    /// Look up an issue, failing with `IssueNotFound`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::IssueNotFound`] if the id is unknown.
    pub fn require(&self, id: &IssueId) -> Result<&Issue> {
        self.issue(id).ok_or_else(|| Error::IssueNotFound(id.clone()))
    }

    pub(crate) fn issue_mut(&mut self, id: &IssueId) -> Result<&mut Issue> {
        match self.index.get(id) {
            Some(&i) => Ok(&mut self.issues[i]),
            None => Err(Error::IssueNotFound(id.clone())),
        }
    }

    /// Insertion position of an issue, used for stable ordering.
    #[must_use]
    pub fn position(&self, id: &IssueId) -> Option<usize> {
        self.index.get(id).copied()
    }

    /// Whether the edge `issue_id -> depends_on_id` exists.
    #[must_use]
    pub fn has_edge(&self, issue_id: &IssueId, depends_on_id: &IssueId) -> bool {
        match (self.node_map.get(issue_id), self.node_map.get(depends_on_id)) {
            (Some(&from), Some(&to)) => self.graph.contains_edge(from, to),
            _ => false,
        }
    }

    /// Whether adding `from -> to` would close a cycle.
    ///
    /// True when `from` is already reachable from `to`. Unknown ids never
    /// form a cycle.
    #[must_use]
    pub fn would_create_cycle(&self, from: &IssueId, to: &IssueId) -> bool {
        match (self.node_map.get(from), self.node_map.get(to)) {
            (Some(&from_node), Some(&to_node)) => {
                algo::has_path_connecting(&self.graph, to_node, from_node, None)
            }
            _ => false,
        }
    }

    pub(crate) fn graph(&self) -> &DiGraph<IssueId, ()> {
        &self.graph
    }

    pub(crate) fn node(&self, id: &IssueId) -> Option<NodeIndex> {
        self.node_map.get(id).copied()
    }

    pub(crate) fn insert_issue(&mut self, issue: Issue) {
        let node = self.graph.add_node(issue.id.clone());
        self.node_map.insert(issue.id.clone(), node);
        self.index.insert(issue.id.clone(), self.issues.len());
        self.issues.push(issue);
    }

    /// Add an edge whose endpoints exist. Returns false if it was already present.
    pub(crate) fn add_edge(&mut self, record: DependencyRecord) -> bool {
        let (Some(from), Some(to)) = (
            self.node(&record.issue_id),
            self.node(&record.depends_on_id),
        ) else {
            return false;
        };
        if self.graph.contains_edge(from, to) {
            return false;
        }
        self.graph.add_edge(from, to, ());
        self.dependencies.push(record);
        true
    }

    /// Remove an edge. Returns false if it was absent.
    pub(crate) fn remove_edge(&mut self, issue_id: &IssueId, depends_on_id: &IssueId) -> bool {
        let (Some(from), Some(to)) = (self.node(issue_id), self.node(depends_on_id)) else {
            return false;
        };
        let Some(edge) = self.graph.find_edge(from, to) else {
            return false;
        };
        self.graph.remove_edge(edge);
        self.dependencies
            .retain(|d| !(d.issue_id == *issue_id && d.depends_on_id == *depends_on_id));
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::IssueStatus;
    use chrono::Utc;

    fn issue(id: &str) -> Issue {
        let now = Utc::now();
        Issue {
            id: IssueId::new(id),
            title: id.to_string(),
            description: String::new(),
            issue_type: "task".into(),
            status: IssueStatus::Open,
            priority: 2,
            assignee: None,
            blocking_notes: None,
            metadata: serde_json::Map::new(),
            created_at: now,
            updated_at: now,
            closed_at: None,
            resolution: None,
        }
    }

    fn edge(from: &str, to: &str) -> DependencyRecord {
        DependencyRecord {
            issue_id: IssueId::new(from),
            depends_on_id: IssueId::new(to),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn from_records_keeps_insertion_order() {
        let (state, warnings) =
            ProjectState::from_records(vec![issue("c"), issue("a"), issue("b")], vec![]);
        let ids: Vec<_> = state.issues().iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids, vec!["c", "a", "b"]);
        assert!(warnings.is_empty());
        assert_eq!(state.position(&IssueId::new("a")), Some(1));
    }

    #[test]
    fn from_records_drops_orphans_duplicates_and_cycles() {
        let (state, warnings) = ProjectState::from_records(
            vec![issue("a"), issue("b"), issue("a")],
            vec![edge("a", "b"), edge("b", "a"), edge("a", "zz"), edge("b", "b")],
        );

        assert_eq!(state.issues().len(), 2);
        assert_eq!(state.dependencies().len(), 1);
        assert!(state.has_edge(&IssueId::new("a"), &IssueId::new("b")));
        assert_eq!(warnings.len(), 4);
    }

    #[test]
    fn cycle_detection_is_transitive() {
        let (state, _) = ProjectState::from_records(
            vec![issue("a"), issue("b"), issue("c")],
            vec![edge("a", "b"), edge("b", "c")],
        );
        assert!(state.would_create_cycle(&IssueId::new("c"), &IssueId::new("a")));
        assert!(!state.would_create_cycle(&IssueId::new("a"), &IssueId::new("c")));
    }

    #[test]
    fn add_and_remove_edge_are_idempotent() {
        let (mut state, _) = ProjectState::from_records(vec![issue("a"), issue("b")], vec![]);

        assert!(state.add_edge(edge("a", "b")));
        assert!(!state.add_edge(edge("a", "b")));
        assert_eq!(state.dependencies().len(), 1);

        assert!(state.remove_edge(&IssueId::new("a"), &IssueId::new("b")));
        assert!(!state.remove_edge(&IssueId::new("a"), &IssueId::new("b")));
        assert!(state.dependencies().is_empty());
    }

    #[test]
    fn require_unknown_issue_is_not_found() {
        let state = ProjectState::new();
        assert!(matches!(
            state.require(&IssueId::new("nope")),
            Err(Error::IssueNotFound(_))
        ));
    }
}
