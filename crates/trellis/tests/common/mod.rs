//! Common test utilities shared across integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use trellis::domain::{IssueId, NewIssue, SessionId};
use trellis::error::{Error, Result};
use trellis::ops::{Dispatcher, ToolRequest, ToolResponse};
use trellis::store::{IssueStore, JsonlStore};
use trellis::sync::{IssueTracker, RemoteIssue, RemoteIssueDraft};
use trellis::workspace;

pub const REPO: &str = "octo/demo";

/// An initialized project in a temporary directory.
pub struct TestProject {
    pub dir: TempDir,
    pub store: Arc<JsonlStore>,
}

impl TestProject {
    pub async fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        workspace::init(dir.path(), Some("proj")).await.unwrap();
        let store = Arc::new(JsonlStore::open(dir.path()).await.unwrap());
        Self { dir, store }
    }

    /// A second, independent store over the same project.
    pub async fn reopen(&self) -> JsonlStore {
        JsonlStore::open(self.dir.path()).await.unwrap()
    }

    pub fn dispatcher(&self, tracker: Arc<FakeTracker>) -> Dispatcher {
        Dispatcher::new(self.store.clone(), tracker)
    }

    pub async fn create(&self, title: &str, priority: u8, deps: &[&IssueId]) -> IssueId {
        let new = NewIssue {
            priority,
            dependencies: deps.iter().map(|id| (*id).clone()).collect(),
            ..NewIssue::titled(title)
        };
        self.store.create(new, &session("s-1")).await.unwrap().id
    }

    pub async fn event_count(&self) -> usize {
        self.store.events().await.unwrap().len()
    }
}

pub fn session(id: &str) -> SessionId {
    SessionId::parse(id).unwrap()
}

/// Run `operation` with `params` through the dispatcher.
pub async fn call(dispatcher: &Dispatcher, operation: &str, params: Value) -> ToolResponse {
    dispatcher
        .execute(ToolRequest {
            operation: operation.to_string(),
            params,
        })
        .await
}

/// Ids of the `issues` array in a response payload.
pub fn ids(response: &ToolResponse) -> Vec<String> {
    let data = response.data.as_ref().expect("response has data");
    data["issues"]
        .as_array()
        .expect("issues array")
        .iter()
        .map(|entry| {
            // get_blocked nests the record under "issue"
            let issue = entry.get("issue").unwrap_or(entry);
            issue["id"].as_str().unwrap().to_string()
        })
        .collect()
}

/// In-process tracker with scripted behaviour.
#[derive(Default)]
pub struct FakeTracker {
    preflight_error: Option<String>,
    failing: HashSet<IssueId>,
    next_number: AtomicU64,
    create_delay: Duration,
    created: Mutex<Vec<RemoteIssueDraft>>,
}

impl FakeTracker {
    pub fn working() -> Arc<Self> {
        Arc::new(Self {
            next_number: AtomicU64::new(100),
            ..Self::default()
        })
    }

    pub fn unauthenticated() -> Arc<Self> {
        Arc::new(Self {
            preflight_error: Some("Not authenticated with GitHub. Run: gh auth login".into()),
            ..Self::default()
        })
    }

    pub fn failing_for(ids: &[&IssueId]) -> Arc<Self> {
        Arc::new(Self {
            failing: ids.iter().map(|id| (*id).clone()).collect(),
            next_number: AtomicU64::new(100),
            ..Self::default()
        })
    }

    /// A working tracker whose creates take `delay` to answer.
    pub fn slow(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            next_number: AtomicU64::new(100),
            create_delay: delay,
            ..Self::default()
        })
    }

    pub fn created(&self) -> Vec<RemoteIssueDraft> {
        self.created.lock().unwrap().clone()
    }
}

#[async_trait]
impl IssueTracker for FakeTracker {
    async fn preflight(&self, _repo: &str) -> Result<()> {
        match &self.preflight_error {
            Some(message) => Err(Error::Permission(message.clone())),
            None => Ok(()),
        }
    }

    async fn create_issue(&self, repo: &str, draft: &RemoteIssueDraft) -> Result<RemoteIssue> {
        if self.failing.contains(&draft.local_id) {
            return Err(Error::ExternalService {
                issue_id: draft.local_id.clone(),
                message: "HTTP 502: Bad Gateway".into(),
            });
        }
        if !self.create_delay.is_zero() {
            tokio::time::sleep(self.create_delay).await;
        }
        let number = self.next_number.fetch_add(1, Ordering::SeqCst);
        self.created.lock().unwrap().push(draft.clone());
        Ok(RemoteIssue {
            number,
            url: format!("https://github.com/{repo}/issues/{number}"),
        })
    }
}

pub fn sync_params() -> Value {
    json!({ "repo": REPO, "session_id": "s-sync" })
}
