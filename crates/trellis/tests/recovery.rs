//! Resilient loading and rebuilding the views from the event log.

mod common;

use common::{session, TestProject};
use std::io::Write;
use trellis::domain::{IssueStatus, IssueUpdate};
use trellis::store::{IssueStore, LoadWarning};

#[tokio::test]
async fn malformed_lines_are_skipped_with_a_warning() {
    let project = TestProject::new().await;
    let id = project.create("Survivor", 2, &[]).await;

    let mut file = std::fs::OpenOptions::new()
        .append(true)
        .open(&project.store.paths().issues)
        .unwrap();
    writeln!(file, "{{ not json").unwrap();

    let (state, warnings) = project.store.load().await.unwrap();
    assert_eq!(state.issues().len(), 1);
    assert_eq!(state.issues()[0].id, id);
    assert!(matches!(
        warnings.as_slice(),
        [LoadWarning::MalformedLine { line_number: 2, .. }]
    ));
}

#[tokio::test]
async fn rebuild_regenerates_views_from_events() {
    let project = TestProject::new().await;
    let s = session("s-1");
    let a = project.create("A", 1, &[]).await;
    let b = project.create("B", 2, &[&a]).await;
    let update = IssueUpdate {
        status: Some(IssueStatus::InProgress),
        ..IssueUpdate::default()
    };
    project.store.update(&a, update, &s).await.unwrap();
    project.store.close(&b, Some("duplicate"), &s).await.unwrap();
    let expected = project.store.snapshot().await.unwrap();

    // Wipe both views; the event log is authoritative.
    std::fs::write(&project.store.paths().issues, "").unwrap();
    std::fs::write(&project.store.paths().dependencies, "").unwrap();
    assert!(project.store.snapshot().await.unwrap().issues().is_empty());

    let report = project.store.rebuild().await.unwrap();

    assert_eq!(report.issues, 2);
    assert_eq!(report.dependencies, 1);
    assert!(report.warnings.is_empty());
    let rebuilt = project.store.snapshot().await.unwrap();
    assert_eq!(rebuilt.issues(), expected.issues());
    assert_eq!(rebuilt.dependencies(), expected.dependencies());
}
