//! Workspace context management for the MCP server.
//!
//! This module handles:
//! - Workspace detection (walking up to find `.trellis/`)
//! - Path canonicalization
//! - Per-workspace dispatcher management
//!
//! Dispatchers hold no issue data in memory, so a cached one never goes
//! stale when another session writes to the same project.

use crate::error::{Error, Result};
use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;
use trellis::store::JsonlStore;
use trellis::sync::GhCli;
use trellis::workspace::{self, TRELLIS_DIR_NAME};
use trellis::Dispatcher;

/// Maximum number of cached workspaces to prevent resource exhaustion.
///
/// When this limit is reached, the oldest workspace is evicted from cache.
const MAX_CACHED_WORKSPACES: usize = 32;

/// Context state for the MCP server.
///
/// Tracks the current workspace and one dispatcher per known workspace.
pub struct Context {
    /// The current active workspace root.
    current_workspace: Option<PathBuf>,

    /// Per-workspace dispatchers (limited to [`MAX_CACHED_WORKSPACES`]).
    dispatchers: HashMap<PathBuf, Arc<Dispatcher>>,

    /// Insertion order for FIFO cache eviction.
    cache_order: VecDeque<PathBuf>,
}

impl Context {
    /// Create a new empty context.
    #[must_use]
    pub fn new() -> Self {
        Self {
            current_workspace: None,
            dispatchers: HashMap::new(),
            cache_order: VecDeque::new(),
        }
    }

    /// Set the current workspace root.
    ///
    /// Canonicalizes the path, verifies `.trellis/` exists and opens the
    /// project unless it is already cached.
    ///
    /// # Errors
    ///
    /// Returns an error if the workspace path doesn't exist, has no `.trellis/`
    /// directory, or its configuration cannot be loaded.
    pub async fn set_workspace(&mut self, workspace_root: &Path) -> Result<WorkspaceInfo> {
        debug!(path = %workspace_root.display(), "Setting workspace");

        let canonical = workspace_root
            .canonicalize()
            .map_err(|e| Error::WorkspaceNotFound {
                path: workspace_root.display().to_string(),
                source: Some(e),
            })?;
        validate_path(&canonical)?;

        let data_dir = canonical.join(TRELLIS_DIR_NAME);
        if !data_dir.is_dir() {
            debug!(path = %data_dir.display(), "No .trellis directory found");
            return Err(Error::NoTrellisDirectory(canonical.display().to_string()));
        }

        if self.dispatchers.contains_key(&canonical) {
            debug!("Using cached dispatcher");
        } else {
            while self.dispatchers.len() >= MAX_CACHED_WORKSPACES {
                self.evict_oldest();
            }

            let store = JsonlStore::open(&canonical).await?;
            debug!(prefix = %store.config().issue_prefix, "Opened project");
            let tracker = GhCli::new(&store.config().sync);
            let default_repo = store.config().sync.default_repo.clone();
            let dispatcher =
                Dispatcher::new(Arc::new(store), Arc::new(tracker)).with_default_repo(default_repo);

            self.dispatchers
                .insert(canonical.clone(), Arc::new(dispatcher));
            self.cache_order.push_back(canonical.clone());
        }

        self.current_workspace = Some(canonical.clone());
        Ok(WorkspaceInfo {
            workspace_root: canonical,
            data_dir,
        })
    }

    /// Evict the oldest cached workspace to make room for new entries.
    fn evict_oldest(&mut self) {
        if let Some(oldest) = self.cache_order.pop_front() {
            self.dispatchers.remove(&oldest);
            if self.current_workspace.as_ref() == Some(&oldest) {
                self.current_workspace = None;
            }
            debug!(workspace = %oldest.display(), "Evicted workspace from cache");
        }
    }

    /// Get the current workspace root.
    #[must_use]
    pub fn current_workspace(&self) -> Option<&PathBuf> {
        self.current_workspace.as_ref()
    }

    /// Get the dispatcher for a specific workspace, or the current one if not specified.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - No context is set and no workspace path is provided
    /// - The workspace path doesn't exist
    /// - The workspace exists but wasn't initialized via `set_workspace()`
    pub fn dispatcher_for(&self, workspace_root: Option<&Path>) -> Result<Arc<Dispatcher>> {
        let workspace = match workspace_root {
            Some(path) => path.canonicalize().map_err(|e| Error::WorkspaceNotFound {
                path: path.display().to_string(),
                source: Some(e),
            })?,
            None => self.current_workspace.clone().ok_or(Error::NoContext)?,
        };

        self.dispatchers
            .get(&workspace)
            .cloned()
            .ok_or_else(|| Error::WorkspaceNotInitialized(workspace.display().to_string()))
    }

    /// Discover and set the workspace by walking up from the given directory.
    ///
    /// # Errors
    ///
    /// Returns an error if no `.trellis/` directory is found in the path
    /// hierarchy, or if opening the project fails.
    pub async fn discover_and_set_workspace(&mut self, start: &Path) -> Result<WorkspaceInfo> {
        let workspace_root = discover_workspace(start)?;
        self.set_workspace(&workspace_root).await
    }

    /// Register a prepared dispatcher without touching the filesystem.
    #[cfg(test)]
    pub fn set_test_workspace(&mut self, workspace_root: PathBuf, dispatcher: Dispatcher) {
        self.current_workspace = Some(workspace_root.clone());
        self.dispatchers
            .insert(workspace_root.clone(), Arc::new(dispatcher));
        self.cache_order.push_back(workspace_root);
    }

    /// Get the number of cached workspaces (for testing).
    #[cfg(test)]
    #[must_use]
    pub fn cache_size(&self) -> usize {
        self.dispatchers.len()
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}

/// Information about a workspace.
#[derive(Debug, Clone)]
pub struct WorkspaceInfo {
    /// The canonical path to the workspace root.
    pub workspace_root: PathBuf,

    /// The `.trellis/` directory holding the project files.
    pub data_dir: PathBuf,
}

/// Validate that a canonicalized path is safe to use as a workspace.
fn validate_path(path: &Path) -> Result<()> {
    if !path.is_absolute() {
        return Err(Error::Io(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            "Workspace path must be absolute",
        )));
    }

    if path.to_string_lossy().contains('\0') {
        return Err(Error::Io(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            "Workspace path contains invalid characters",
        )));
    }

    if path
        .components()
        .any(|component| matches!(component, std::path::Component::ParentDir))
    {
        return Err(Error::Io(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            "Workspace path contains parent directory references",
        )));
    }

    Ok(())
}

/// Discover a trellis workspace by walking up from the given directory.
///
/// Returns the canonicalized workspace root (directory containing `.trellis/`).
///
/// # Errors
///
/// Returns `Error::NoTrellisDirectory` if no `.trellis/` directory is found,
/// or `Error::WorkspaceNotFound` if the path cannot be canonicalized.
pub fn discover_workspace(start: &Path) -> Result<PathBuf> {
    let root = workspace::find_project_root(start)
        .ok_or_else(|| Error::NoTrellisDirectory(start.display().to_string()))?;

    // Resolve symlinks (e.g., /var -> /private/var on macOS)
    root.canonicalize().map_err(|e| Error::WorkspaceNotFound {
        path: root.display().to_string(),
        source: Some(e),
    })
}
