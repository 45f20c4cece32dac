//! External tracker abstraction.

use crate::domain::IssueId;
use crate::error::Result;
use async_trait::async_trait;
use serde::Serialize;

/// A remote issue ready to be created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteIssueDraft {
    /// The local issue being pushed, for error attribution.
    pub local_id: IssueId,
    /// Remote title.
    pub title: String,
    /// Rendered body.
    pub body: String,
    /// Labels to apply.
    pub labels: Vec<String>,
    /// Remote assignee, if any.
    pub assignee: Option<String>,
}

/// What the tracker assigned to a created issue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RemoteIssue {
    /// Remote issue number.
    pub number: u64,
    /// Remote issue URL.
    pub url: String,
}

/// One-way writer to an external issue tracker.
#[async_trait]
pub trait IssueTracker: Send + Sync {
    /// Verify the client is usable and may write to `repo`.
    ///
    /// # Errors
    ///
    /// Returns `Error::Permission` with a remediation message on any failure.
    async fn preflight(&self, repo: &str) -> Result<()>;

    /// Create one remote issue.
    ///
    /// # Errors
    ///
    /// Returns `Error::ExternalService` naming `draft.local_id` on failure.
    async fn create_issue(&self, repo: &str, draft: &RemoteIssueDraft) -> Result<RemoteIssue>;
}
