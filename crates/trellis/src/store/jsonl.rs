//! JSONL-backed [`IssueStore`].

use super::mutation::{self, Applied, Touched};
use super::replay::replay;
use super::{IssueStore, LoadWarning, ProjectState, RebuildReport};
use crate::config::TrellisConfig;
use crate::domain::{DependencyRecord, Event, Issue, IssueId, IssueUpdate, NewIssue, SessionId};
use crate::error::{Result, StorageError};
use crate::id_generation::IdGenerator;
use crate::lock::ProjectLock;
use crate::scheduler;
use crate::workspace::ProjectPaths;
use async_trait::async_trait;
use chrono::Utc;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::io;
use std::path::Path;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use trellis_jsonl::{append_jsonl, read_jsonl_resilient, write_jsonl_atomic};

/// Project store persisted as three JSONL files under `.trellis/`.
///
/// Holds no issue data in memory: every read loads the latest durable state
/// and every mutation reloads it under the project lock, so several stores
/// (in one process or many) can share a project safely.
#[derive(Debug)]
pub struct JsonlStore {
    paths: ProjectPaths,
    config: TrellisConfig,
    id_generator: Mutex<IdGenerator>,
}

impl JsonlStore {
    /// Open the project rooted at `root`, loading its configuration.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotInitialized` if `root/.trellis` is missing,
    /// or `Error::Config` if the configuration file is invalid.
    pub async fn open(root: &Path) -> Result<Self> {
        let paths = ProjectPaths::new(root);
        if !paths.dir.is_dir() {
            return Err(StorageError::NotInitialized(paths.root).into());
        }
        let config = TrellisConfig::load(&paths.config).await?;
        debug!(root = %paths.root.display(), prefix = %config.issue_prefix, "Opened project store");
        Ok(Self::with_config(paths, config))
    }

    /// Build a store from explicit paths and configuration.
    #[must_use]
    pub fn with_config(paths: ProjectPaths, config: TrellisConfig) -> Self {
        let id_generator = Mutex::new(IdGenerator::new(config.issue_prefix.clone()));
        Self {
            paths,
            config,
            id_generator,
        }
    }

    /// File layout of this project.
    #[must_use]
    pub fn paths(&self) -> &ProjectPaths {
        &self.paths
    }

    /// Loaded configuration.
    #[must_use]
    pub fn config(&self) -> &TrellisConfig {
        &self.config
    }

    /// Load the materialized state together with any load warnings.
    ///
    /// # Errors
    ///
    /// Returns `Error::Io` if a file exists but cannot be read.
    pub async fn load(&self) -> Result<(ProjectState, Vec<LoadWarning>)> {
        let mut warnings = Vec::new();
        let issues: Vec<Issue> = read_records(&self.paths.issues, &mut warnings).await?;
        let dependencies: Vec<DependencyRecord> =
            read_records(&self.paths.dependencies, &mut warnings).await?;

        let (state, graph_warnings) = ProjectState::from_records(issues, dependencies);
        warnings.extend(graph_warnings);
        for warning in &warnings {
            warn!(%warning, "Project load warning");
        }
        Ok((state, warnings))
    }

    async fn lock(&self) -> Result<ProjectLock> {
        ProjectLock::acquire(
            &self.paths.lock,
            self.config.lock.timeout(),
            self.config.lock.retry_interval(),
        )
        .await
    }

    async fn load_events(&self) -> Result<Vec<Event>> {
        let mut warnings = Vec::new();
        let events = read_records(&self.paths.events, &mut warnings).await?;
        for warning in &warnings {
            warn!(%warning, "Event log warning");
        }
        Ok(events)
    }

    /// Persist the outcome of a mutation: events first, then the views it changed.
    async fn commit(&self, state: &ProjectState, events: &[Event], touched: Touched) -> Result<()> {
        if !events.is_empty() {
            append_jsonl(&self.paths.events, events).await?;
        }
        if touched.issues {
            write_jsonl_atomic(&self.paths.issues, state.issues()).await?;
        }
        if touched.dependencies {
            write_jsonl_atomic(&self.paths.dependencies, state.dependencies()).await?;
        }
        Ok(())
    }

    /// Run one read-modify-write under the project lock.
    async fn mutate<T, F>(&self, apply: F) -> Result<(ProjectState, T)>
    where
        F: FnOnce(&mut ProjectState) -> Result<Applied<T>> + Send,
        T: Send,
    {
        let _lock = self.lock().await?;
        let (mut state, _) = self.load().await?;
        let applied = apply(&mut state)?;
        self.commit(&state, &applied.events, applied.touched).await?;
        Ok((state, applied.value))
    }
}

async fn read_records<T>(path: &Path, warnings: &mut Vec<LoadWarning>) -> Result<Vec<T>>
where
    T: DeserializeOwned,
{
    match read_jsonl_resilient::<T, _>(path).await {
        Ok((records, skipped)) => {
            warnings.extend(skipped.into_iter().map(|w| LoadWarning::MalformedLine {
                file: path.to_path_buf(),
                line_number: w.line_number(),
                error: w.description(),
            }));
            Ok(records)
        }
        Err(trellis_jsonl::Error::Io(e)) if e.kind() == io::ErrorKind::NotFound => Ok(Vec::new()),
        Err(e) => Err(e.into()),
    }
}

fn view(state: &ProjectState, id: &IssueId) -> Result<Issue> {
    Ok(scheduler::with_effective_status(state, state.require(id)?))
}

#[async_trait]
impl IssueStore for JsonlStore {
    async fn create(&self, issue: NewIssue, session_id: &SessionId) -> Result<Issue> {
        let now = Utc::now();
        let mut ids = self.id_generator.lock().await;
        let (state, id) = self
            .mutate(|state| mutation::create(state, &mut ids, issue, session_id, now))
            .await?;
        drop(ids);

        info!(issue_id = %id, session_id = %session_id, "Created issue");
        view(&state, &id)
    }

    async fn update(
        &self,
        id: &IssueId,
        update: IssueUpdate,
        session_id: &SessionId,
    ) -> Result<Issue> {
        let now = Utc::now();
        let (state, id) = self
            .mutate(|state| mutation::update(state, id, update, session_id, now))
            .await?;

        info!(issue_id = %id, session_id = %session_id, "Updated issue");
        view(&state, &id)
    }

    async fn close(
        &self,
        id: &IssueId,
        reason: Option<&str>,
        session_id: &SessionId,
    ) -> Result<Issue> {
        let now = Utc::now();
        let (state, id) = self
            .mutate(|state| mutation::close(state, id, reason, session_id, now))
            .await?;

        info!(issue_id = %id, session_id = %session_id, "Closed issue");
        view(&state, &id)
    }

    async fn add_dependency(
        &self,
        issue_id: &IssueId,
        depends_on_id: &IssueId,
        session_id: &SessionId,
    ) -> Result<bool> {
        let now = Utc::now();
        let (_, added) = self
            .mutate(|state| {
                mutation::add_dependency(state, issue_id, depends_on_id, session_id, now)
            })
            .await?;

        if added {
            info!(%issue_id, %depends_on_id, session_id = %session_id, "Added dependency");
        } else {
            debug!(%issue_id, %depends_on_id, "Dependency already present");
        }
        Ok(added)
    }

    async fn remove_dependency(
        &self,
        issue_id: &IssueId,
        depends_on_id: &IssueId,
        session_id: &SessionId,
    ) -> Result<bool> {
        let now = Utc::now();
        let (_, removed) = self
            .mutate(|state| {
                mutation::remove_dependency(state, issue_id, depends_on_id, session_id, now)
            })
            .await?;

        if removed {
            info!(%issue_id, %depends_on_id, session_id = %session_id, "Removed dependency");
        } else {
            debug!(%issue_id, %depends_on_id, "Dependency already absent");
        }
        Ok(removed)
    }

    async fn record_sync(
        &self,
        id: &IssueId,
        stamp: Map<String, Value>,
        session_id: &SessionId,
    ) -> Result<Issue> {
        let now = Utc::now();
        let (state, id) = self
            .mutate(|state| mutation::stamp_sync(state, id, stamp, session_id, now))
            .await?;

        debug!(issue_id = %id, "Recorded sync metadata");
        view(&state, &id)
    }

    async fn record_session_ended(&self, id: &IssueId, session_id: &SessionId) -> Result<bool> {
        let _lock = self.lock().await?;
        let (state, _) = self.load().await?;
        let mut history = self.load_events().await?;
        history.retain(|event| event.issue_id == *id);

        let applied = mutation::session_ended(&state, &history, id, session_id, Utc::now())?;
        self.commit(&state, &applied.events, applied.touched).await?;

        if applied.value {
            info!(issue_id = %id, session_id = %session_id, "Marked issue as interrupted by session end");
        }
        Ok(applied.value)
    }

    async fn rebuild(&self) -> Result<RebuildReport> {
        let _lock = self.lock().await?;

        let mut warnings = Vec::new();
        let events: Vec<Event> = read_records(&self.paths.events, &mut warnings).await?;
        let (state, replay_warnings) = replay(&events);
        warnings.extend(replay_warnings);

        write_jsonl_atomic(&self.paths.issues, state.issues()).await?;
        write_jsonl_atomic(&self.paths.dependencies, state.dependencies()).await?;

        let report = RebuildReport {
            events: events.len(),
            issues: state.issues().len(),
            dependencies: state.dependencies().len(),
            warnings,
        };
        info!(
            events = report.events,
            issues = report.issues,
            dependencies = report.dependencies,
            warnings = report.warnings.len(),
            "Rebuilt project files from event log"
        );
        Ok(report)
    }

    async fn snapshot(&self) -> Result<ProjectState> {
        let (state, _) = self.load().await?;
        Ok(state)
    }

    async fn events(&self) -> Result<Vec<Event>> {
        self.load_events().await
    }
}
