//! Project configuration stored in `.trellis/config.yaml`.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tokio::fs;
use tracing::debug;

/// Default issue prefix if none specified
pub const DEFAULT_PREFIX: &str = "proj";

/// Minimum prefix length
pub const MIN_PREFIX_LENGTH: usize = 2;

/// Maximum prefix length
pub const MAX_PREFIX_LENGTH: usize = 20;

/// Configuration file structure for a trellis project
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case", default)]
pub struct TrellisConfig {
    /// Issue ID prefix (e.g., "proj" for "proj-m3x9k2ab1f9z")
    pub issue_prefix: String,

    /// Write lock settings
    pub lock: LockConfig,

    /// External tracker settings
    pub sync: SyncConfig,
}

/// Write lock section
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case", default)]
pub struct LockConfig {
    /// How long a mutation waits for the lock before failing
    pub timeout_ms: u64,

    /// Pause between acquisition attempts
    pub retry_interval_ms: u64,
}

/// External tracker section
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case", default)]
pub struct SyncConfig {
    /// GitHub CLI executable
    pub gh_program: String,

    /// Timeout for each remote write
    pub command_timeout_secs: u64,

    /// Repository used when a sync request names none
    pub default_repo: Option<String>,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 10_000,
            retry_interval_ms: 25,
        }
    }
}

impl LockConfig {
    /// The bounded wait for the lock.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// The pause between attempts, never zero.
    #[must_use]
    pub fn retry_interval(&self) -> Duration {
        Duration::from_millis(self.retry_interval_ms.max(1))
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            gh_program: "gh".to_string(),
            command_timeout_secs: 30,
            default_repo: None,
        }
    }
}

impl SyncConfig {
    /// Timeout for each remote write.
    #[must_use]
    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs)
    }
}

impl TrellisConfig {
    /// Create a new configuration with the given prefix
    pub fn new(prefix: &str) -> Self {
        Self {
            issue_prefix: prefix.to_string(),
            lock: LockConfig::default(),
            sync: SyncConfig::default(),
        }
    }

    /// Load configuration from a file; a missing file yields the defaults.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if the file is not valid YAML or carries an
    /// invalid prefix, and `Error::Io` if it cannot be read.
    pub async fn load(path: &Path) -> Result<Self> {
        let content = match fs::read_to_string(path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "No config file, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(e.into()),
        };
        let config: Self = serde_yaml::from_str(&content)
            .map_err(|e| Error::Config(format!("{}: {e}", path.display())))?;
        validate_prefix(&config.issue_prefix)?;
        Ok(config)
    }

    /// Save configuration to a file
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or the write fails.
    pub async fn save(&self, path: &Path) -> Result<()> {
        let content =
            serde_yaml::to_string(self).map_err(|e| Error::Config(format!("YAML error: {e}")))?;
        fs::write(path, content).await?;
        Ok(())
    }
}

impl Default for TrellisConfig {
    fn default() -> Self {
        Self::new(DEFAULT_PREFIX)
    }
}

/// Validate issue ID prefix format.
///
/// Requirements:
/// - 2-20 characters
/// - ASCII alphanumeric only
///
/// Expects pre-trimmed input.
///
/// # Errors
///
/// Returns `Error::Config` describing the violated rule.
pub fn validate_prefix(prefix: &str) -> Result<()> {
    if prefix.len() < MIN_PREFIX_LENGTH {
        return Err(Error::Config(format!(
            "Prefix must be at least {MIN_PREFIX_LENGTH} characters"
        )));
    }

    if prefix.len() > MAX_PREFIX_LENGTH {
        return Err(Error::Config(format!(
            "Prefix cannot exceed {MAX_PREFIX_LENGTH} characters"
        )));
    }

    if !prefix.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(Error::Config(
            "Prefix must contain only alphanumeric characters".to_string(),
        ));
    }

    Ok(())
}
