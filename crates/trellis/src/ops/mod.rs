//! The operation contract exposed to agents.
//!
//! Requests name one of a closed set of operations and carry loosely typed
//! JSON parameters. [`Operation::parse`] turns them into typed values and
//! [`Dispatcher::execute`] runs them, always answering with a
//! [`ToolResponse`] envelope rather than an error.

mod params;
mod response;

pub use params::{
    CloseParams, CreateParams, DepParams, IssueRef, ListParams, QueueParams, SyncParams,
    UpdateParams,
};
pub use response::{ToolError, ToolRequest, ToolResponse};

use crate::domain::{Issue, IssueId, IssueUpdate, NewIssue, SessionId, DEFAULT_PRIORITY};
use crate::error::{Error, Result};
use crate::graph;
use crate::scheduler;
use crate::sessions;
use crate::store::{IssueStore, RebuildReport};
use crate::sync::{self, IssueTracker, SyncRequest};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, warn};

/// The closed set of operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    /// Create an issue.
    Create,
    /// List issues.
    List,
    /// Fetch one issue.
    Get,
    /// Partially update an issue.
    Update,
    /// Close an issue.
    Close,
    /// Issues that are open and unblocked, in work order.
    GetReady,
    /// Issues that are blocked, with their blockers.
    GetBlocked,
    /// Add a dependency edge.
    AddDep,
    /// Remove a dependency edge.
    RemoveDep,
    /// Session history of an issue.
    GetSessions,
    /// Push issues to GitHub.
    SyncToGithub,
}

impl OperationKind {
    /// Every operation, in documentation order.
    pub const ALL: [Self; 11] = [
        Self::Create,
        Self::List,
        Self::Get,
        Self::Update,
        Self::Close,
        Self::GetReady,
        Self::GetBlocked,
        Self::AddDep,
        Self::RemoveDep,
        Self::GetSessions,
        Self::SyncToGithub,
    ];

    /// Wire name of the operation.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::List => "list",
            Self::Get => "get",
            Self::Update => "update",
            Self::Close => "close",
            Self::GetReady => "get_ready",
            Self::GetBlocked => "get_blocked",
            Self::AddDep => "add_dep",
            Self::RemoveDep => "remove_dep",
            Self::GetSessions => "get_sessions",
            Self::SyncToGithub => "sync_to_github",
        }
    }

    /// Whether the operation writes to the store.
    #[must_use]
    pub fn is_mutation(self) -> bool {
        matches!(
            self,
            Self::Create
                | Self::Update
                | Self::Close
                | Self::AddDep
                | Self::RemoveDep
                | Self::SyncToGithub
        )
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OperationKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let name = s.trim();
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == name)
            .ok_or_else(|| {
                let valid: Vec<&str> = Self::ALL.iter().map(|k| k.as_str()).collect();
                Error::validation(format!(
                    "Unknown operation '{name}'. Valid operations: {}.",
                    valid.join(", ")
                ))
            })
    }
}

/// A typed operation.
#[derive(Debug, Clone)]
pub enum Operation {
    /// `create`
    Create(CreateParams),
    /// `list`
    List(ListParams),
    /// `get`
    Get(IssueRef),
    /// `update`
    Update(UpdateParams),
    /// `close`
    Close(CloseParams),
    /// `get_ready`
    GetReady(QueueParams),
    /// `get_blocked`
    GetBlocked(QueueParams),
    /// `add_dep`
    AddDep(DepParams),
    /// `remove_dep`
    RemoveDep(DepParams),
    /// `get_sessions`
    GetSessions(IssueRef),
    /// `sync_to_github`
    SyncToGithub(SyncParams),
}

impl Operation {
    /// Decode `params` for `kind`. `null` is treated as an empty object.
    ///
    /// # Errors
    ///
    /// Returns `Error::Validation` naming the operation when a parameter is
    /// missing, unknown or of the wrong type.
    pub fn parse(kind: OperationKind, params: Value) -> Result<Self> {
        let params = if params.is_null() { json!({}) } else { params };
        Ok(match kind {
            OperationKind::Create => Self::Create(decode(kind, params)?),
            OperationKind::List => Self::List(decode(kind, params)?),
            OperationKind::Get => Self::Get(decode(kind, params)?),
            OperationKind::Update => Self::Update(decode(kind, params)?),
            OperationKind::Close => Self::Close(decode(kind, params)?),
            OperationKind::GetReady => Self::GetReady(decode(kind, params)?),
            OperationKind::GetBlocked => Self::GetBlocked(decode(kind, params)?),
            OperationKind::AddDep => Self::AddDep(decode(kind, params)?),
            OperationKind::RemoveDep => Self::RemoveDep(decode(kind, params)?),
            OperationKind::GetSessions => Self::GetSessions(decode(kind, params)?),
            OperationKind::SyncToGithub => Self::SyncToGithub(decode(kind, params)?),
        })
    }

    /// The kind of this operation.
    #[must_use]
    pub fn kind(&self) -> OperationKind {
        match self {
            Self::Create(_) => OperationKind::Create,
            Self::List(_) => OperationKind::List,
            Self::Get(_) => OperationKind::Get,
            Self::Update(_) => OperationKind::Update,
            Self::Close(_) => OperationKind::Close,
            Self::GetReady(_) => OperationKind::GetReady,
            Self::GetBlocked(_) => OperationKind::GetBlocked,
            Self::AddDep(_) => OperationKind::AddDep,
            Self::RemoveDep(_) => OperationKind::RemoveDep,
            Self::GetSessions(_) => OperationKind::GetSessions,
            Self::SyncToGithub(_) => OperationKind::SyncToGithub,
        }
    }
}

fn ids_of(issues: Vec<&Issue>) -> Vec<IssueId> {
    issues.into_iter().map(|issue| issue.id.clone()).collect()
}

fn decode<T: DeserializeOwned>(kind: OperationKind, params: Value) -> Result<T> {
    if !params.is_object() {
        return Err(Error::validation(format!(
            "Invalid parameters for {kind}: expected an object"
        )));
    }
    serde_json::from_value(params)
        .map_err(|e| Error::validation(format!("Invalid parameters for {kind}: {e}")))
}

/// Runs operations against one project.
#[derive(Clone)]
pub struct Dispatcher {
    store: Arc<dyn IssueStore>,
    tracker: Arc<dyn IssueTracker>,
    default_repo: Option<String>,
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher")
            .field("default_repo", &self.default_repo)
            .finish_non_exhaustive()
    }
}

impl Dispatcher {
    /// Create a dispatcher over `store`, syncing through `tracker`.
    pub fn new(store: Arc<dyn IssueStore>, tracker: Arc<dyn IssueTracker>) -> Self {
        Self {
            store,
            tracker,
            default_repo: None,
        }
    }

    /// Repository used by `sync_to_github` when the request names none.
    #[must_use]
    pub fn with_default_repo(mut self, repo: Option<String>) -> Self {
        self.default_repo = repo.filter(|r| !r.trim().is_empty());
        self
    }

    /// The underlying store.
    #[must_use]
    pub fn store(&self) -> &Arc<dyn IssueStore> {
        &self.store
    }

    /// Parse and run a raw request.
    pub async fn execute(&self, request: ToolRequest) -> ToolResponse {
        let operation = match request
            .operation
            .parse::<OperationKind>()
            .and_then(|kind| Operation::parse(kind, request.params))
        {
            Ok(operation) => operation,
            Err(e) => {
                debug!(operation = %request.operation, error = %e, "Rejected request");
                return ToolResponse::failure(&e);
            }
        };
        self.run(operation).await
    }

    /// Run a typed operation.
    pub async fn run(&self, operation: Operation) -> ToolResponse {
        let kind = operation.kind();
        debug!(operation = %kind, "Executing operation");
        match self.dispatch(operation).await {
            Ok(response) => response,
            Err(e) => {
                if kind.is_mutation() {
                    warn!(operation = %kind, kind = %e.kind(), error = %e, "Operation failed");
                } else {
                    debug!(operation = %kind, kind = %e.kind(), error = %e, "Operation failed");
                }
                ToolResponse::failure(&e)
            }
        }
    }

    /// Mark in-progress work touched by `session_id` as interrupted.
    ///
    /// # Errors
    ///
    /// Returns a validation error for a blank session id and propagates store
    /// failures.
    pub async fn end_session(&self, session_id: &str) -> Result<Vec<IssueId>> {
        let session = SessionId::parse(session_id)?;
        sessions::session_ended(self.store.as_ref(), &session).await
    }

    /// Regenerate the issue and dependency files from the event log.
    ///
    /// # Errors
    ///
    /// Returns a concurrency error if the write lock cannot be acquired and
    /// propagates storage failures.
    pub async fn rebuild(&self) -> Result<RebuildReport> {
        let report = self.store.rebuild().await?;
        for warning in &report.warnings {
            warn!(%warning, "Skipped while rebuilding");
        }
        Ok(report)
    }

    async fn dispatch(&self, operation: Operation) -> Result<ToolResponse> {
        let store = self.store.as_ref();
        let data = match operation {
            Operation::Create(params) => {
                let session = SessionId::parse(params.session_id.as_str())?;
                let new_issue = NewIssue {
                    title: params.title,
                    description: params.description,
                    issue_type: params.issue_type.unwrap_or_default(),
                    priority: params
                        .priority
                        .as_ref()
                        .map_or(Ok(DEFAULT_PRIORITY), |p| p.resolve())?,
                    assignee: params.assignee,
                    metadata: params.metadata,
                    dependencies: params.deps,
                };
                json!({ "issue": store.create(new_issue, &session).await? })
            }
            Operation::List(params) => {
                let issues = store.list(&params.filter()?).await?;
                json!({ "count": issues.len(), "issues": issues })
            }
            Operation::Get(params) => {
                let state = store.snapshot().await?;
                let issue = state.require(&params.issue_id)?;
                json!({
                    "issue": scheduler::with_effective_status(&state, issue),
                    "depends_on": ids_of(graph::dependencies_of(&state, &issue.id)?),
                    "dependents": ids_of(graph::dependents_of(&state, &issue.id)?),
                })
            }
            Operation::Update(params) => {
                let session = SessionId::parse(params.session_id.as_str())?;
                let update = IssueUpdate {
                    title: params.title,
                    description: params.description,
                    issue_type: params.issue_type,
                    status: params.status,
                    priority: params.priority.as_ref().map(|p| p.resolve()).transpose()?,
                    assignee: params.assignee,
                    blocking_notes: params.blocking_notes,
                    metadata: params.metadata,
                };
                json!({ "issue": store.update(&params.issue_id, update, &session).await? })
            }
            Operation::Close(params) => {
                let session = SessionId::parse(params.session_id.as_str())?;
                let issue = store
                    .close(&params.issue_id, params.reason.as_deref(), &session)
                    .await?;
                json!({ "issue": issue })
            }
            Operation::GetReady(params) => {
                let state = store.snapshot().await?;
                let issues = scheduler::ready(&state, &params.filter()?);
                json!({ "count": issues.len(), "issues": issues })
            }
            Operation::GetBlocked(params) => {
                let state = store.snapshot().await?;
                let issues = scheduler::blocked(&state, &params.filter()?);
                json!({ "count": issues.len(), "issues": issues })
            }
            Operation::AddDep(params) => {
                let session = SessionId::parse(params.session_id.as_str())?;
                let changed = store
                    .add_dependency(&params.issue_id, &params.depends_on_id, &session)
                    .await?;
                dep_result(&params, changed)
            }
            Operation::RemoveDep(params) => {
                let session = SessionId::parse(params.session_id.as_str())?;
                let changed = store
                    .remove_dependency(&params.issue_id, &params.depends_on_id, &session)
                    .await?;
                dep_result(&params, changed)
            }
            Operation::GetSessions(params) => {
                serde_json::to_value(sessions::get_sessions(store, &params.issue_id).await?)?
            }
            Operation::SyncToGithub(params) => return self.sync(params).await,
        };
        Ok(ToolResponse::ok(data))
    }

    async fn sync(&self, params: SyncParams) -> Result<ToolResponse> {
        let session_id = SessionId::parse(params.session_id.as_str())?;
        let repo = params
            .repo
            .filter(|r| !r.trim().is_empty())
            .or_else(|| self.default_repo.clone())
            .ok_or_else(|| {
                Error::validation(
                    "No repository given. Pass repo as owner/name or set sync.default-repo in .trellis/config.yaml.",
                )
            })?;

        let request = SyncRequest {
            repo,
            include_closed: params.include_closed,
            session_id,
        };
        let report = sync::sync_to_github(self.store.as_ref(), self.tracker.as_ref(), &request).await?;
        let data = serde_json::to_value(&report)?;

        if report.permission_denied {
            let message = report
                .errors
                .first()
                .map_or_else(|| "Sync preflight failed".to_string(), |f| f.error.clone());
            return Ok(ToolResponse::failure_with_data(&Error::Permission(message), data));
        }
        Ok(ToolResponse::ok(data))
    }
}

fn dep_result(params: &DepParams, changed: bool) -> Value {
    json!({
        "issue_id": params.issue_id,
        "depends_on_id": params.depends_on_id,
        "changed": changed,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use rstest::rstest;

    #[rstest]
    #[case("create", OperationKind::Create)]
    #[case("get_ready", OperationKind::GetReady)]
    #[case(" sync_to_github ", OperationKind::SyncToGithub)]
    fn parses_operation_names(#[case] name: &str, #[case] expected: OperationKind) {
        assert_eq!(name.parse::<OperationKind>().unwrap(), expected);
    }

    #[test]
    fn unknown_operation_lists_valid_names() {
        let err = "delete".parse::<OperationKind>().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ValidationError);
        assert!(err.to_string().contains("get_blocked"));
    }

    #[test]
    fn wire_names_round_trip_through_serde() {
        for kind in OperationKind::ALL {
            let value = serde_json::to_value(kind).unwrap();
            assert_eq!(value, json!(kind.as_str()));
        }
    }

    #[test]
    fn null_params_are_an_empty_object() {
        let op = Operation::parse(OperationKind::GetReady, Value::Null).unwrap();
        assert_eq!(op.kind(), OperationKind::GetReady);
    }

    #[test]
    fn bad_params_name_the_operation() {
        let err = Operation::parse(OperationKind::Get, json!({})).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ValidationError);
        assert!(err.to_string().starts_with("Invalid parameters for get:"));

        let err = Operation::parse(OperationKind::List, json!([1])).unwrap_err();
        assert!(err.to_string().contains("expected an object"));
    }
}
