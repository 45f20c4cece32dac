//! Project layout, initialization and discovery.
//!
//! A project is any directory containing `.trellis/`:
//!
//! ```text
//! .trellis/
//!   config.yaml          settings
//!   issues.jsonl         materialized issue records
//!   dependencies.jsonl   materialized dependency edges
//!   events.jsonl         append-only event log
//!   .trellis.lock        advisory write lock (not tracked)
//!   .gitignore
//! ```

use crate::config::{validate_prefix, TrellisConfig, DEFAULT_PREFIX};
use crate::error::{Error, Result};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::info;

/// Name of the project directory
pub const TRELLIS_DIR_NAME: &str = ".trellis";

/// Name of the configuration file
pub const CONFIG_FILE_NAME: &str = "config.yaml";

/// Name of the issues data file
pub const ISSUES_FILE_NAME: &str = "issues.jsonl";

/// Name of the dependencies data file
pub const DEPENDENCIES_FILE_NAME: &str = "dependencies.jsonl";

/// Name of the event log
pub const EVENTS_FILE_NAME: &str = "events.jsonl";

/// Name of the advisory lock file
pub const LOCK_FILE_NAME: &str = ".trellis.lock";

/// Name of the gitignore file within `.trellis`
pub const GITIGNORE_FILE_NAME: &str = ".gitignore";

/// Maximum directory depth to traverse when searching for a project root
pub const MAX_TRAVERSAL_DEPTH: usize = 256;

/// Paths of every file in one project.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectPaths {
    /// Directory containing `.trellis/`.
    pub root: PathBuf,
    /// The `.trellis/` directory.
    pub dir: PathBuf,
    /// `config.yaml`.
    pub config: PathBuf,
    /// `issues.jsonl`.
    pub issues: PathBuf,
    /// `dependencies.jsonl`.
    pub dependencies: PathBuf,
    /// `events.jsonl`.
    pub events: PathBuf,
    /// `.trellis.lock`.
    pub lock: PathBuf,
}

impl ProjectPaths {
    /// Layout for the project rooted at `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let dir = root.join(TRELLIS_DIR_NAME);
        Self {
            config: dir.join(CONFIG_FILE_NAME),
            issues: dir.join(ISSUES_FILE_NAME),
            dependencies: dir.join(DEPENDENCIES_FILE_NAME),
            events: dir.join(EVENTS_FILE_NAME),
            lock: dir.join(LOCK_FILE_NAME),
            dir,
            root,
        }
    }
}

/// Result of [`init`]
#[derive(Debug)]
pub struct InitResult {
    /// Paths of the created project
    pub paths: ProjectPaths,
    /// The prefix used for issue IDs
    pub prefix: String,
}

/// Initialize a new project in the given directory.
///
/// # Errors
///
/// Returns an error if:
/// - `.trellis/` already exists
/// - The prefix is invalid
/// - File system operations fail
pub async fn init(base_dir: &Path, prefix: Option<&str>) -> Result<InitResult> {
    let prefix = prefix.unwrap_or(DEFAULT_PREFIX).trim();
    validate_prefix(prefix)?;

    let paths = ProjectPaths::new(base_dir);
    if paths.dir.exists() {
        return Err(Error::Config(format!(
            "Trellis is already initialized in this directory. Found existing '{TRELLIS_DIR_NAME}'"
        )));
    }

    fs::create_dir_all(&paths.dir).await?;
    TrellisConfig::new(prefix).save(&paths.config).await?;
    for file in [&paths.issues, &paths.dependencies, &paths.events] {
        fs::write(file, "").await?;
    }

    let gitignore = format!(
        "\
# The lock only coordinates concurrent writers on this machine
{LOCK_FILE_NAME}
*.tmp
"
    );
    fs::write(paths.dir.join(GITIGNORE_FILE_NAME), gitignore).await?;

    info!(root = %paths.root.display(), prefix, "Initialized trellis project");
    Ok(InitResult {
        paths,
        prefix: prefix.to_string(),
    })
}

/// Whether `base_dir` contains `.trellis/`.
#[must_use]
pub fn is_initialized(base_dir: &Path) -> bool {
    base_dir.join(TRELLIS_DIR_NAME).is_dir()
}

/// Find the project root by searching up the directory tree.
///
/// Returns the nearest ancestor of `start_dir` (inclusive) containing
/// `.trellis/`, or `None` if none is found within [`MAX_TRAVERSAL_DEPTH`].
#[must_use]
pub fn find_project_root(start_dir: &Path) -> Option<PathBuf> {
    let mut current = start_dir.to_path_buf();
    let mut depth = 0;

    loop {
        if is_initialized(&current) {
            return Some(current);
        }

        depth += 1;
        if depth > MAX_TRAVERSAL_DEPTH || !current.pop() {
            return None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn init_creates_layout() {
        let temp = TempDir::new().unwrap();
        let result = init(temp.path(), Some("demo")).await.unwrap();

        assert_eq!(result.prefix, "demo");
        for file in [
            &result.paths.config,
            &result.paths.issues,
            &result.paths.dependencies,
            &result.paths.events,
        ] {
            assert!(file.exists(), "{} missing", file.display());
        }
        let gitignore = std::fs::read_to_string(result.paths.dir.join(GITIGNORE_FILE_NAME)).unwrap();
        assert!(gitignore.contains(LOCK_FILE_NAME));

        let config = TrellisConfig::load(&result.paths.config).await.unwrap();
        assert_eq!(config.issue_prefix, "demo");
    }

    #[tokio::test]
    async fn init_trims_and_defaults_prefix() {
        let temp = TempDir::new().unwrap();
        let result = init(temp.path(), None).await.unwrap();
        assert_eq!(result.prefix, DEFAULT_PREFIX);

        let other = TempDir::new().unwrap();
        let result = init(other.path(), Some("  web  ")).await.unwrap();
        assert_eq!(result.prefix, "web");
    }

    #[tokio::test]
    async fn init_twice_fails() {
        let temp = TempDir::new().unwrap();
        init(temp.path(), None).await.unwrap();

        let err = init(temp.path(), None).await.unwrap_err();
        assert!(err.to_string().contains("already initialized"));
    }

    #[tokio::test]
    async fn init_rejects_bad_prefix_without_creating_anything() {
        let temp = TempDir::new().unwrap();
        assert!(init(temp.path(), Some("x")).await.is_err());
        assert!(!is_initialized(temp.path()));
    }

    #[tokio::test]
    async fn find_root_from_nested_directory() {
        let temp = TempDir::new().unwrap();
        init(temp.path(), None).await.unwrap();
        let nested = temp.path().join("src").join("deep");
        std::fs::create_dir_all(&nested).unwrap();

        assert_eq!(find_project_root(&nested), Some(temp.path().to_path_buf()));
    }

    #[test]
    fn find_root_returns_none_outside_project() {
        let temp = TempDir::new().unwrap();
        assert_eq!(find_project_root(temp.path()), None);
    }
}
