//! One-way, idempotent push of local issues to an external tracker.
//!
//! A batch runs in three phases:
//!
//! 1. **Preflight**, once: the tracker must be usable and writable. A failure
//!    aborts the batch before any remote write.
//! 2. **Per issue**, sequentially in insertion order: issues already carrying
//!    a remote number, re-read just before the remote write, are skipped; the
//!    rest are rendered and created.
//! 3. **Stamp-back**: each created issue's number and URL are written into
//!    local metadata immediately, so an interrupted batch resumes where it
//!    stopped on the next run. A stamp never replaces an existing one: if a
//!    concurrent batch linked the issue first, the duplicate remote issue is
//!    reported as an error.
//!
//! Per-issue failures are collected, never raised. Remote writes are not
//! retried within a batch; rerunning the batch is the retry.

mod github;
mod render;
mod tracker;

pub use github::{CommandError, CommandOutput, CommandRunner, GhCli, TokioCommandRunner};
pub use render::{body, draft, labels, priority_label, status_label, SYNC_MARKER};
pub use tracker::{IssueTracker, RemoteIssue, RemoteIssueDraft};

use crate::domain::{
    Issue, IssueId, SessionId, GITHUB_ISSUE_NUMBER_KEY, GITHUB_REPO_KEY, GITHUB_URL_KEY,
    SYNCED_AT_KEY,
};
use crate::error::{Error, Result};
use crate::scheduler;
use crate::store::IssueStore;
use chrono::Utc;
use serde::Serialize;
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use tracing::{info, warn};

/// Reason recorded for issues that already have a remote counterpart.
pub const ALREADY_SYNCED: &str = "already_synced";

/// Parameters of one sync batch.
#[derive(Debug, Clone)]
pub struct SyncRequest {
    /// Target repository, `owner/name`.
    pub repo: String,
    /// Whether closed issues are considered.
    pub include_closed: bool,
    /// Session recorded on the `synced` events.
    pub session_id: SessionId,
}

/// An issue created remotely in this batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncedIssue {
    /// Local id.
    pub issue_id: IssueId,
    /// Remote issue number.
    pub github_issue_number: u64,
    /// Remote issue URL.
    pub github_url: String,
}

/// An issue left alone in this batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedIssue {
    /// Local id.
    pub issue_id: IssueId,
    /// Why it was skipped.
    pub reason: &'static str,
}

/// A failure inside the batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncFailure {
    /// The issue that failed; `None` for a batch-level preflight failure.
    pub issue_id: Option<IssueId>,
    /// What went wrong, suitable for relaying to a human.
    pub error: String,
}

/// Outcome of a sync batch.
///
/// `synced_count + skipped_count + error_count` equals the number of issues
/// considered, except after a preflight failure where nothing is considered
/// and the single error is the preflight message.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    /// Target repository.
    pub repo: String,
    /// Issues created remotely.
    pub synced: Vec<SyncedIssue>,
    /// Number of issues created remotely.
    pub synced_count: usize,
    /// Issues skipped.
    pub skipped: Vec<SkippedIssue>,
    /// Number of issues skipped.
    pub skipped_count: usize,
    /// Per-issue (or preflight) failures.
    pub errors: Vec<SyncFailure>,
    /// Number of failures.
    pub error_count: usize,
    /// True when the preflight rejected the batch.
    pub permission_denied: bool,
}

impl SyncReport {
    fn new(repo: &str) -> Self {
        Self {
            repo: repo.to_string(),
            ..Self::default()
        }
    }

    fn denied(repo: &str, error: &Error) -> Self {
        let mut report = Self::new(repo);
        report.permission_denied = true;
        report.errors.push(SyncFailure {
            issue_id: None,
            error: error.to_string(),
        });
        report.error_count = 1;
        report
    }
}

/// Check that `repo` looks like `owner/name`.
///
/// # Errors
///
/// Returns `Error::Validation` otherwise.
pub fn validate_repo(repo: &str) -> Result<()> {
    let mut parts = repo.split('/');
    let valid = matches!(
        (parts.next(), parts.next(), parts.next()),
        (Some(owner), Some(name), None) if !owner.trim().is_empty() && !name.trim().is_empty()
    );
    if valid {
        Ok(())
    } else {
        Err(Error::validation(format!(
            "Invalid repository '{repo}'. Use the owner/name form, e.g. octo-org/octo-repo."
        )))
    }
}

fn already_synced(issue: &Issue) -> bool {
    issue
        .metadata
        .get(GITHUB_ISSUE_NUMBER_KEY)
        .is_some_and(|number| !number.is_null())
}

/// Push every eligible local issue to the tracker.
///
/// Returns `Ok` with `permission_denied = true` when the preflight fails; no
/// remote or local write happens in that case.
///
/// # Errors
///
/// Returns `Error::Validation` for a malformed repository and propagates
/// failures to read the local store.
pub async fn sync_to_github(
    store: &dyn IssueStore,
    tracker: &dyn IssueTracker,
    request: &SyncRequest,
) -> Result<SyncReport> {
    let repo = request.repo.trim();
    validate_repo(repo)?;

    if let Err(e) = tracker.preflight(repo).await {
        warn!(%repo, error = %e, "Sync preflight failed; nothing was written");
        return Ok(SyncReport::denied(repo, &e));
    }

    let state = store.snapshot().await?;
    let mut sessions: HashMap<IssueId, Vec<SessionId>> = HashMap::new();
    for event in store.events().await? {
        let linked = sessions.entry(event.issue_id).or_default();
        if !linked.contains(&event.session_id) {
            linked.push(event.session_id);
        }
    }

    let mut report = SyncReport::new(repo);
    for issue in state.issues() {
        if issue.is_closed() && !request.include_closed {
            continue;
        }

        // Another batch may have stamped it since the snapshot.
        let stamped = match store.get(&issue.id).await {
            Ok(current) => already_synced(&current),
            Err(e) => {
                warn!(issue_id = %issue.id, error = %e, "Could not re-read issue before sync");
                report.errors.push(SyncFailure {
                    issue_id: Some(issue.id.clone()),
                    error: e.to_string(),
                });
                continue;
            }
        };
        if stamped {
            report.skipped.push(SkippedIssue {
                issue_id: issue.id.clone(),
                reason: ALREADY_SYNCED,
            });
            continue;
        }

        let view = scheduler::with_effective_status(&state, issue);
        let linked = sessions.get(&issue.id).map_or(&[][..], Vec::as_slice);
        let remote_draft = draft(&view, linked);

        match push_one(store, tracker, repo, &remote_draft, &request.session_id).await {
            Ok(synced) => {
                info!(issue_id = %synced.issue_id, number = synced.github_issue_number, %repo, "Synced issue");
                report.synced.push(synced);
            }
            Err(e) => {
                warn!(issue_id = %issue.id, %repo, error = %e, "Failed to sync issue");
                report.errors.push(SyncFailure {
                    issue_id: Some(issue.id.clone()),
                    error: e.to_string(),
                });
            }
        }
    }

    report.synced_count = report.synced.len();
    report.skipped_count = report.skipped.len();
    report.error_count = report.errors.len();
    info!(
        %repo,
        synced = report.synced_count,
        skipped = report.skipped_count,
        errors = report.error_count,
        "Sync batch finished"
    );
    Ok(report)
}

async fn push_one(
    store: &dyn IssueStore,
    tracker: &dyn IssueTracker,
    repo: &str,
    remote_draft: &RemoteIssueDraft,
    session_id: &SessionId,
) -> Result<SyncedIssue> {
    let remote = tracker.create_issue(repo, remote_draft).await?;

    let mut stamp: Map<String, Value> = Map::new();
    stamp.insert(GITHUB_ISSUE_NUMBER_KEY.to_string(), json!(remote.number));
    stamp.insert(GITHUB_URL_KEY.to_string(), json!(remote.url));
    stamp.insert(GITHUB_REPO_KEY.to_string(), json!(repo));
    stamp.insert(SYNCED_AT_KEY.to_string(), json!(Utc::now().to_rfc3339()));

    store
        .record_sync(&remote_draft.local_id, stamp, session_id)
        .await
        .map_err(|e| match e {
            Error::ExternalService { .. } => e,
            other => Error::ExternalService {
                issue_id: remote_draft.local_id.clone(),
                message: format!(
                    "created {} but could not record it locally: {other}",
                    remote.url
                ),
            },
        })?;

    Ok(SyncedIssue {
        issue_id: remote_draft.local_id.clone(),
        github_issue_number: remote.number,
        github_url: remote.url,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case::valid("octo/demo", true)]
    #[case::missing_name("octo/", false)]
    #[case::no_slash("demo", false)]
    #[case::too_many_parts("a/b/c", false)]
    #[case::empty("", false)]
    fn repo_format(#[case] repo: &str, #[case] ok: bool) {
        assert_eq!(validate_repo(repo).is_ok(), ok);
    }

    #[test]
    fn denied_report_carries_message_and_zero_counts() {
        let report = SyncReport::denied("octo/demo", &Error::Permission("log in".into()));
        assert!(report.permission_denied);
        assert_eq!(report.synced_count, 0);
        assert_eq!(report.error_count, 1);
        assert_eq!(report.errors[0].error, "log in");
    }
}
