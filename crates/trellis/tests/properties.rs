//! Invariants of blocking, readiness and idempotent operations.

mod common;

use chrono::{Duration, TimeZone, Utc};
use common::{session, TestProject};
use proptest::prelude::*;
use std::collections::HashSet;
use trellis::domain::{DependencyRecord, Issue, IssueFilter, IssueId, IssueStatus};
use trellis::error::ErrorKind;
use trellis::scheduler;
use trellis::store::{IssueStore, ProjectState};

fn issue(index: usize, status: IssueStatus, priority: u8) -> Issue {
    let created = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap() + Duration::seconds(index as i64);
    Issue {
        id: IssueId::new(format!("p-{index}")),
        title: format!("issue {index}"),
        description: String::new(),
        issue_type: "task".into(),
        status,
        priority,
        assignee: None,
        blocking_notes: None,
        metadata: serde_json::Map::new(),
        created_at: created,
        updated_at: created,
        closed_at: None,
        resolution: None,
    }
}

fn status_strategy() -> impl Strategy<Value = IssueStatus> {
    prop_oneof![
        Just(IssueStatus::Open),
        Just(IssueStatus::InProgress),
        Just(IssueStatus::Closed),
    ]
}

prop_compose! {
    fn project_state()(
        nodes in prop::collection::vec((status_strategy(), 0u8..=4), 2..8),
        raw_edges in prop::collection::vec((0usize..8, 0usize..8), 0..16),
    ) -> ProjectState {
        let issues: Vec<Issue> = nodes
            .iter()
            .enumerate()
            .map(|(i, (status, priority))| issue(i, *status, *priority))
            .collect();
        let n = issues.len();
        let edges = raw_edges
            .into_iter()
            .map(|(from, to)| DependencyRecord {
                issue_id: IssueId::new(format!("p-{}", from % n)),
                depends_on_id: IssueId::new(format!("p-{}", to % n)),
                created_at: Utc::now(),
            })
            .collect();
        ProjectState::from_records(issues, edges).0
    }
}

fn has_open_dependency(state: &ProjectState, id: &IssueId) -> bool {
    state
        .dependencies()
        .iter()
        .filter(|edge| edge.issue_id == *id)
        .any(|edge| state.issue(&edge.depends_on_id).is_some_and(|dep| !dep.is_closed()))
}

proptest! {
    #[test]
    fn graph_blocked_iff_an_outgoing_edge_targets_an_open_issue(state in project_state()) {
        for issue in state.issues().iter().filter(|i| !i.is_closed()) {
            let blocked = scheduler::effective_status(&state, issue) == IssueStatus::Blocked;
            prop_assert_eq!(blocked, has_open_dependency(&state, &issue.id));
        }
    }

    #[test]
    fn ready_never_includes_an_issue_with_open_dependencies(state in project_state()) {
        let ready = scheduler::ready(&state, &IssueFilter::default());
        for issue in &ready {
            prop_assert!(!has_open_dependency(&state, &issue.id));
            prop_assert_eq!(issue.status, IssueStatus::Open);
        }
        for pair in ready.windows(2) {
            prop_assert!((pair[0].priority, pair[0].created_at) <= (pair[1].priority, pair[1].created_at));
        }
    }

    #[test]
    fn loaded_graph_never_contains_a_cycle(state in project_state()) {
        for edge in state.dependencies() {
            // A kept edge a -> b means b must not reach a.
            prop_assert!(edge.issue_id != edge.depends_on_id);
            let reverse_would_cycle = state.would_create_cycle(&edge.depends_on_id, &edge.issue_id);
            prop_assert!(reverse_would_cycle);
        }
        let unique: HashSet<_> = state
            .dependencies()
            .iter()
            .map(|e| (e.issue_id.clone(), e.depends_on_id.clone()))
            .collect();
        prop_assert_eq!(unique.len(), state.dependencies().len());
    }

    #[test]
    fn blocked_lists_exactly_the_blocked_non_closed_issues(state in project_state()) {
        let listed: HashSet<IssueId> = scheduler::blocked(&state, &IssueFilter::default())
            .into_iter()
            .map(|entry| entry.issue.id)
            .collect();
        let expected: HashSet<IssueId> = state
            .issues()
            .iter()
            .filter(|i| !i.is_closed() && has_open_dependency(&state, &i.id))
            .map(|i| i.id.clone())
            .collect();
        prop_assert_eq!(listed, expected);
    }
}

#[tokio::test]
async fn rejected_cycle_leaves_edge_set_unchanged() {
    let project = TestProject::new().await;
    let a = project.create("A", 2, &[]).await;
    let b = project.create("B", 2, &[]).await;
    let c = project.create("C", 2, &[]).await;
    let s = session("s-1");
    project.store.add_dependency(&a, &b, &s).await.unwrap();
    project.store.add_dependency(&b, &c, &s).await.unwrap();
    let before = project.store.snapshot().await.unwrap().dependencies().to_vec();
    let events_before = project.event_count().await;

    for (from, to) in [(&b, &a), (&c, &a), (&a, &a)] {
        let err = project.store.add_dependency(from, to, &s).await.unwrap_err();
        let expected = if from == to {
            ErrorKind::ValidationError
        } else {
            ErrorKind::CycleError
        };
        assert_eq!(err.kind(), expected);
    }

    assert_eq!(project.store.snapshot().await.unwrap().dependencies(), &before[..]);
    assert_eq!(project.event_count().await, events_before);
}

#[tokio::test]
async fn close_twice_appends_one_closed_event() {
    let project = TestProject::new().await;
    let id = project.create("X", 2, &[]).await;
    let s = session("s-1");

    let first = project.store.close(&id, Some("done"), &s).await.unwrap();
    let second = project.store.close(&id, Some("again"), &s).await.unwrap();

    assert_eq!(first, second);
    assert_eq!(second.resolution.as_deref(), Some("done"));
    let closed_events = project
        .store
        .events_for(&id)
        .await
        .unwrap()
        .into_iter()
        .filter(|e| e.event_type == trellis::domain::EventType::Closed)
        .count();
    assert_eq!(closed_events, 1);
}
