//! Several stores writing to one project, and the bounded lock wait.

mod common;

use common::{session, FakeTracker, TestProject, REPO};
use std::collections::HashSet;
use std::time::Duration;
use trellis::config::TrellisConfig;
use trellis::domain::NewIssue;
use trellis::error::ErrorKind;
use trellis::lock::ProjectLock;
use trellis::domain::EventType;
use trellis::store::{IssueStore, JsonlStore};
use trellis::sync::{sync_to_github, SyncRequest};
use trellis::workspace::ProjectPaths;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_writers_never_lose_an_issue() {
    let project = TestProject::new().await;
    let mut handles = Vec::new();

    for writer in 0..4 {
        let store = project.reopen().await;
        handles.push(tokio::spawn(async move {
            let session = session(&format!("writer-{writer}"));
            for n in 0..5 {
                store
                    .create(NewIssue::titled(format!("w{writer} #{n}")), &session)
                    .await
                    .unwrap();
            }
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    let state = project.store.snapshot().await.unwrap();
    assert_eq!(state.issues().len(), 20);
    let unique: HashSet<_> = state.issues().iter().map(|i| i.id.clone()).collect();
    assert_eq!(unique.len(), 20);
    assert_eq!(project.event_count().await, 20);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn held_lock_times_out_as_concurrency_error() {
    let project = TestProject::new().await;
    let paths = ProjectPaths::new(project.dir.path());
    let mut config = TrellisConfig::new("proj");
    config.lock.timeout_ms = 100;
    config.lock.retry_interval_ms = 10;
    let impatient = JsonlStore::with_config(paths.clone(), config);

    let held = ProjectLock::acquire(&paths.lock, Duration::from_secs(1), Duration::from_millis(5))
        .await
        .unwrap();

    let err = impatient
        .create(NewIssue::titled("Blocked writer"), &session("s-1"))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ConcurrencyError);
    assert!(err.to_string().contains("Retry"));
    assert!(impatient.snapshot().await.unwrap().issues().is_empty());

    drop(held);
    impatient
        .create(NewIssue::titled("Now it works"), &session("s-1"))
        .await
        .unwrap();
}

#[tokio::test]
async fn reads_do_not_take_the_lock() {
    let project = TestProject::new().await;
    let id = project.create("Readable", 2, &[]).await;
    let _held = ProjectLock::acquire(
        &project.store.paths().lock,
        Duration::from_secs(1),
        Duration::from_millis(5),
    )
    .await
    .unwrap();

    assert_eq!(project.store.get(&id).await.unwrap().title, "Readable");
    assert_eq!(project.store.events_for(&id).await.unwrap().len(), 1);
}

#[tokio::test]
async fn writes_from_one_store_are_visible_to_another() {
    let project = TestProject::new().await;
    let other = project.reopen().await;

    let id = project.create("Shared", 1, &[]).await;

    assert_eq!(other.get(&id).await.unwrap().priority, 1);
}

fn sync_request(session_id: &str) -> SyncRequest {
    SyncRequest {
        repo: REPO.to_string(),
        include_closed: false,
        session_id: session(session_id),
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn racing_sync_batches_keep_one_link_per_issue() {
    let project = TestProject::new().await;
    let id = project.create("Shared work", 2, &[]).await;
    let other = project.reopen().await;
    let tracker = FakeTracker::slow(Duration::from_millis(100));

    let first_request = sync_request("agent-a");
    let second_request = sync_request("agent-b");
    let (first, second) = tokio::join!(
        sync_to_github(project.store.as_ref(), tracker.as_ref(), &first_request),
        sync_to_github(&other, tracker.as_ref(), &second_request),
    );
    let (first, second) = (first.unwrap(), second.unwrap());

    assert_eq!(first.synced_count + second.synced_count, 1);
    assert_eq!(first.error_count + second.error_count, 1);
    let winner = first.synced.iter().chain(&second.synced).next().unwrap();
    let failure = first.errors.iter().chain(&second.errors).next().unwrap();
    assert_eq!(failure.issue_id.as_ref(), Some(&id));
    assert!(failure.error.contains("already linked"), "{}", failure.error);

    let stored = project.store.get(&id).await.unwrap();
    assert_eq!(stored.github_issue_number(), Some(winner.github_issue_number));
    let synced_events = project
        .store
        .events_for(&id)
        .await
        .unwrap()
        .into_iter()
        .filter(|e| e.event_type == EventType::Synced)
        .count();
    assert_eq!(synced_events, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn slow_batch_skips_issues_stamped_after_its_snapshot() {
    let project = TestProject::new().await;
    let first = project.create("First", 2, &[]).await;
    let second = project.create("Second", 2, &[]).await;
    let other = project.reopen().await;
    let slow = FakeTracker::slow(Duration::from_millis(200));
    let fast = FakeTracker::working();

    let slow_request = sync_request("agent-slow");
    let fast_request = sync_request("agent-fast");
    let (slow_report, fast_report) = tokio::join!(
        sync_to_github(project.store.as_ref(), slow.as_ref(), &slow_request),
        async {
            tokio::time::sleep(Duration::from_millis(20)).await;
            sync_to_github(&other, fast.as_ref(), &fast_request).await
        },
    );
    let (slow_report, fast_report) = (slow_report.unwrap(), fast_report.unwrap());

    assert_eq!(fast_report.synced_count, 2);
    // The slow batch was already creating the first issue when it got linked.
    assert_eq!(slow_report.error_count, 1);
    assert_eq!(slow_report.errors[0].issue_id.as_ref(), Some(&first));
    assert_eq!(slow_report.synced_count, 0);
    assert_eq!(slow_report.skipped.len(), 1);
    assert_eq!(slow_report.skipped[0].issue_id, second);
    assert_eq!(slow.created().len(), 1);
}
