//! Error types for trellis operations.
//!
//! Every [`Error`] maps onto one [`ErrorKind`] of the taxonomy reported to
//! callers of the operation contract. Messages are written to be relayed
//! verbatim to a human, so they say what went wrong and what to do next.

use crate::domain::IssueId;
use serde::Serialize;
use std::fmt;
use std::io;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// The error type for trellis operations.
#[derive(Debug, Error)]
pub enum Error {
    /// IO error occurred.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The on-disk project store is missing or unusable.
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Malformed input, illegal status transition or missing required field.
    #[error("{0}")]
    Validation(String),

    /// Issue not found.
    #[error("Issue not found: {0}. Use list to see available issue ids.")]
    IssueNotFound(IssueId),

    /// Adding the edge `from -> to` would close a cycle.
    #[error(
        "Cannot make {from} depend on {to}: {to} already depends on {from} (directly or transitively), so the dependency would create a cycle."
    )]
    CircularDependency {
        /// The issue that would gain the dependency.
        from: IssueId,
        /// The issue it would depend on.
        to: IssueId,
    },

    /// The project write lock could not be acquired within the bound.
    #[error(
        "Another session is writing to this project; the write lock at {} was not released within {} ms. Retry the operation.",
        .path.display(),
        .waited.as_millis()
    )]
    LockTimeout {
        /// Path of the lock file.
        path: PathBuf,
        /// How long the caller waited.
        waited: Duration,
    },

    /// Sync preflight failed: missing client, not authenticated, or no write access.
    #[error("{0}")]
    Permission(String),

    /// A single remote write failed.
    #[error("Sync of {issue_id} failed: {message}")]
    ExternalService {
        /// The local issue being synced.
        issue_id: IssueId,
        /// What the remote side reported.
        message: String,
    },
}

impl Error {
    /// Returns the taxonomy kind reported to callers.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_) | Self::IssueNotFound(_) | Self::Config(_) => {
                ErrorKind::ValidationError
            }
            Self::CircularDependency { .. } => ErrorKind::CycleError,
            Self::LockTimeout { .. } => ErrorKind::ConcurrencyError,
            Self::Permission(_) => ErrorKind::PermissionError,
            Self::ExternalService { .. } => ErrorKind::ExternalServiceError,
            Self::Io(_) | Self::Json(_) | Self::Storage(_) => ErrorKind::StorageError,
        }
    }

    /// Shorthand for a [`Error::Validation`] with the given message.
    pub(crate) fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }
}

impl From<trellis_jsonl::Error> for Error {
    fn from(e: trellis_jsonl::Error) -> Self {
        match e {
            trellis_jsonl::Error::Io(io_err) => Self::Io(io_err),
            trellis_jsonl::Error::Json(json_err) => Self::Json(json_err),
            other => Self::Storage(StorageError::Jsonl(other)),
        }
    }
}

/// Failures of the local project store that are not caller mistakes.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The `.trellis/` directory does not exist.
    #[error("No trellis project at {}. Run init in the project root first.", .0.display())]
    NotInitialized(PathBuf),

    /// A JSONL file could not be read.
    #[error("JSONL error: {0}")]
    Jsonl(trellis_jsonl::Error),

    /// No unique issue id could be produced.
    #[error("ID generation failed: {0}")]
    IdGeneration(String),
}

/// The error categories callers can branch on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Malformed input, unknown issue id, illegal transition.
    ValidationError,
    /// The requested dependency would create a cycle.
    CycleError,
    /// The project write lock was not acquired in time.
    ConcurrencyError,
    /// Sync preflight failed.
    PermissionError,
    /// A remote write failed.
    ExternalServiceError,
    /// The local store could not be read or written.
    StorageError,
}

impl ErrorKind {
    /// Returns the wire name of this kind.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ValidationError => "validation_error",
            Self::CycleError => "cycle_error",
            Self::ConcurrencyError => "concurrency_error",
            Self::PermissionError => "permission_error",
            Self::ExternalServiceError => "external_service_error",
            Self::StorageError => "storage_error",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A specialized Result type for trellis operations.
pub type Result<T> = std::result::Result<T, Error>;
