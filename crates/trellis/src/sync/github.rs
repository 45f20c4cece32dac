//! GitHub tracker backed by the `gh` CLI.
//!
//! Going through `gh` keeps token handling out of this crate: whatever the
//! user authenticated with `gh auth login` is used as-is.

use super::tracker::{IssueTracker, RemoteIssue, RemoteIssueDraft};
use crate::config::SyncConfig;
use crate::error::{Error, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::io;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, warn};

const VERSION_TIMEOUT: Duration = Duration::from_secs(5);
const AUTH_TIMEOUT: Duration = Duration::from_secs(10);
const PROBE_TIMEOUT: Duration = Duration::from_secs(10);

/// Repository permissions that allow creating issues.
const WRITE_PERMISSIONS: [&str; 3] = ["WRITE", "MAINTAIN", "ADMIN"];

/// Captured result of a finished command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// Whether the process exited with status 0.
    pub success: bool,
    /// Standard output, lossily decoded.
    pub stdout: String,
    /// Standard error, lossily decoded.
    pub stderr: String,
}

/// Failure to run a command at all.
#[derive(Debug, Error)]
pub enum CommandError {
    /// The program is not on `PATH`.
    #[error("{program} is not installed")]
    NotFound {
        /// Program name.
        program: String,
    },

    /// The program did not finish in time and was killed.
    #[error("{program} timed out after {} s", .timeout.as_secs())]
    TimedOut {
        /// Program name.
        program: String,
        /// The bound that was exceeded.
        timeout: Duration,
    },

    /// Spawning or waiting failed.
    #[error("failed to run command: {0}")]
    Io(#[from] io::Error),
}

/// Runs external programs. Abstracted so the client can be tested without `gh`.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run `program` with `args`, killing it after `timeout`.
    async fn run(
        &self,
        program: &str,
        args: &[&str],
        timeout: Duration,
    ) -> std::result::Result<CommandOutput, CommandError>;
}

/// [`CommandRunner`] using `tokio::process`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioCommandRunner;

#[async_trait]
impl CommandRunner for TokioCommandRunner {
    async fn run(
        &self,
        program: &str,
        args: &[&str],
        timeout: Duration,
    ) -> std::result::Result<CommandOutput, CommandError> {
        let child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output();

        let output = match tokio::time::timeout(timeout, child).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) if e.kind() == io::ErrorKind::NotFound => {
                return Err(CommandError::NotFound {
                    program: program.to_string(),
                });
            }
            Ok(Err(e)) => return Err(e.into()),
            Err(_) => {
                return Err(CommandError::TimedOut {
                    program: program.to_string(),
                    timeout,
                });
            }
        };

        Ok(CommandOutput {
            success: output.status.success(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RepoPermission {
    viewer_permission: Option<String>,
}

/// GitHub tracker client driving the `gh` CLI.
#[derive(Clone)]
pub struct GhCli {
    program: String,
    runner: Arc<dyn CommandRunner>,
    command_timeout: Duration,
}

impl std::fmt::Debug for GhCli {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GhCli")
            .field("program", &self.program)
            .field("command_timeout", &self.command_timeout)
            .finish_non_exhaustive()
    }
}

impl GhCli {
    /// Client configured from the project's sync settings.
    #[must_use]
    pub fn new(config: &SyncConfig) -> Self {
        Self::with_runner(
            config.gh_program.clone(),
            Arc::new(TokioCommandRunner),
            config.command_timeout(),
        )
    }

    /// Client with an explicit command runner.
    pub fn with_runner(
        program: impl Into<String>,
        runner: Arc<dyn CommandRunner>,
        command_timeout: Duration,
    ) -> Self {
        Self {
            program: program.into(),
            runner,
            command_timeout,
        }
    }

    async fn gh(
        &self,
        args: &[&str],
        timeout: Duration,
    ) -> std::result::Result<CommandOutput, CommandError> {
        debug!(program = %self.program, ?args, "Running GitHub CLI");
        self.runner.run(&self.program, args, timeout).await
    }

    fn not_installed(&self) -> Error {
        Error::Permission(format!(
            "GitHub CLI ({}) is not installed or not on PATH. Install it from https://cli.github.com and then run: gh auth login",
            self.program
        ))
    }

    fn launch_failure(&self, e: CommandError) -> Error {
        match e {
            CommandError::NotFound { .. } => self.not_installed(),
            CommandError::TimedOut { program, timeout } => Error::Permission(format!(
                "GitHub permission check timed out: {program} did not answer within {} s. Check your network connection and retry.",
                timeout.as_secs()
            )),
            CommandError::Io(e) => Error::Permission(format!(
                "Could not run the GitHub CLI ({}): {e}",
                self.program
            )),
        }
    }

    async fn check_repository_access(&self, repo: &str) -> Result<()> {
        let listing = self
            .gh(
                &["issue", "list", "--repo", repo, "--limit", "1"],
                PROBE_TIMEOUT,
            )
            .await
            .map_err(|e| self.launch_failure(e))?;

        if listing.success {
            return Ok(());
        }

        let stderr = listing.stderr.trim();
        let lowered = stderr.to_ascii_lowercase();
        let message = if lowered.contains("404") || lowered.contains("not found") {
            format!(
                "Repository {repo} was not found, or your GitHub account cannot see it. Check the owner/name spelling."
            )
        } else if lowered.contains("403") || lowered.contains("forbidden") {
            format!(
                "Access to repository {repo} is forbidden for your GitHub account. Ask a maintainer for write access."
            )
        } else {
            format!("Cannot access repository {repo}: {stderr}")
        };
        Err(Error::Permission(message))
    }

    async fn check_write_permission(&self, repo: &str) -> Result<()> {
        let view = self
            .gh(
                &["repo", "view", repo, "--json", "viewerPermission"],
                PROBE_TIMEOUT,
            )
            .await
            .map_err(|e| self.launch_failure(e))?;

        let permission = view
            .success
            .then(|| serde_json::from_str::<RepoPermission>(&view.stdout).ok())
            .flatten()
            .and_then(|p| p.viewer_permission);

        match permission {
            Some(p) if WRITE_PERMISSIONS.contains(&p.as_str()) => Ok(()),
            Some(p) => Err(Error::Permission(format!(
                "You have {} access to {repo}, but creating issues requires write access (WRITE, MAINTAIN or ADMIN). Ask a maintainer to grant it.",
                p.to_ascii_lowercase()
            ))),
            None => {
                debug!(%repo, "Could not read repository permission; listing succeeded, continuing");
                Ok(())
            }
        }
    }
}

#[async_trait]
impl IssueTracker for GhCli {
    async fn preflight(&self, repo: &str) -> Result<()> {
        let version = self
            .gh(&["--version"], VERSION_TIMEOUT)
            .await
            .map_err(|e| self.launch_failure(e))?;
        if !version.success {
            return Err(self.not_installed());
        }

        let auth = self
            .gh(&["auth", "status"], AUTH_TIMEOUT)
            .await
            .map_err(|e| self.launch_failure(e))?;
        if !auth.success {
            return Err(Error::Permission(
                "Not authenticated with GitHub. Run: gh auth login".to_string(),
            ));
        }

        self.check_repository_access(repo).await?;
        self.check_write_permission(repo).await
    }

    async fn create_issue(&self, repo: &str, draft: &RemoteIssueDraft) -> Result<RemoteIssue> {
        let labels = draft.labels.join(",");
        let mut args = vec![
            "issue",
            "create",
            "--repo",
            repo,
            "--title",
            draft.title.as_str(),
            "--body",
            draft.body.as_str(),
            "--label",
            labels.as_str(),
        ];
        if let Some(assignee) = &draft.assignee {
            args.extend(["--assignee", assignee.as_str()]);
        }

        let external = |message: String| Error::ExternalService {
            issue_id: draft.local_id.clone(),
            message,
        };

        let output = self
            .gh(&args, self.command_timeout)
            .await
            .map_err(|e| external(e.to_string()))?;

        if !output.success {
            let stderr = output.stderr.trim();
            warn!(issue_id = %draft.local_id, %repo, %stderr, "gh issue create failed");
            return Err(external(if stderr.is_empty() {
                "gh issue create exited with an error".to_string()
            } else {
                stderr.to_string()
            }));
        }

        parse_issue_url(&output.stdout).ok_or_else(|| {
            external(format!(
                "Could not parse the issue number from gh output: {}",
                output.stdout.trim()
            ))
        })
    }
}

/// Extract the issue number from the URL `gh issue create` prints last.
fn parse_issue_url(stdout: &str) -> Option<RemoteIssue> {
    let url = stdout.lines().map(str::trim).rfind(|line| !line.is_empty())?;
    let number = url.rsplit('/').next()?.parse().ok()?;
    Some(RemoteIssue {
        number,
        url: url.to_string(),
    })
}
