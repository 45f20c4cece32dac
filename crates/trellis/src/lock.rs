//! Advisory per-project write lock.
//!
//! Every local read-modify-write holds the lock on `.trellis/.trellis.lock`
//! for its duration. The lock is an OS-level exclusive file lock, so it
//! serializes writers across processes as well as within one. Acquisition
//! polls with a fixed interval and gives up after a bounded wait.

use crate::error::{Error, Result};
use std::fs::{File, TryLockError};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs::OpenOptions;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Held write lock; released on drop.
#[derive(Debug)]
pub struct ProjectLock {
    file: File,
    path: PathBuf,
}

impl ProjectLock {
    /// Acquire the lock at `path`, waiting at most `timeout`.
    ///
    /// The lock file is created if missing.
    ///
    /// # Errors
    ///
    /// Returns [`Error::LockTimeout`] if another holder keeps the lock for the
    /// whole wait, or `Error::Io` if the lock file cannot be opened.
    pub async fn acquire(path: &Path, timeout: Duration, retry_interval: Duration) -> Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .read(true)
            .write(true)
            .open(path)
            .await?
            .into_std()
            .await;

        let started = Instant::now();
        let mut contended = false;
        loop {
            match file.try_lock() {
                Ok(()) => {
                    if contended {
                        debug!(path = %path.display(), waited_ms = started.elapsed().as_millis(), "Acquired contended write lock");
                    }
                    return Ok(Self {
                        file,
                        path: path.to_path_buf(),
                    });
                }
                Err(TryLockError::WouldBlock) => {
                    if !contended {
                        debug!(path = %path.display(), "Write lock held elsewhere, waiting");
                        contended = true;
                    }
                    if started.elapsed() >= timeout {
                        warn!(path = %path.display(), timeout_ms = timeout.as_millis(), "Timed out waiting for write lock");
                        return Err(Error::LockTimeout {
                            path: path.to_path_buf(),
                            waited: timeout,
                        });
                    }
                    tokio::time::sleep(retry_interval).await;
                }
                Err(TryLockError::Error(e)) => return Err(e.into()),
            }
        }
    }

    /// Path of the held lock file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for ProjectLock {
    fn drop(&mut self) {
        if let Err(e) = self.file.unlock() {
            warn!(path = %self.path.display(), error = %e, "Failed to release write lock");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const SHORT: Duration = Duration::from_millis(60);
    const TICK: Duration = Duration::from_millis(5);

    #[tokio::test]
    async fn second_holder_times_out_with_concurrency_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(".trellis.lock");

        let _held = ProjectLock::acquire(&path, SHORT, TICK).await.unwrap();
        let err = ProjectLock::acquire(&path, SHORT, TICK).await.unwrap_err();

        assert!(matches!(err, Error::LockTimeout { .. }));
        assert_eq!(err.kind(), crate::error::ErrorKind::ConcurrencyError);
    }

    #[tokio::test]
    async fn lock_is_reusable_after_drop() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(".trellis.lock");

        let held = ProjectLock::acquire(&path, SHORT, TICK).await.unwrap();
        assert_eq!(held.path(), path.as_path());
        drop(held);

        assert!(ProjectLock::acquire(&path, SHORT, TICK).await.is_ok());
    }

    #[tokio::test]
    async fn waiter_acquires_once_holder_releases() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(".trellis.lock");

        let held = ProjectLock::acquire(&path, SHORT, TICK).await.unwrap();
        let waiter_path = path.clone();
        let waiter = tokio::spawn(async move {
            ProjectLock::acquire(&waiter_path, Duration::from_secs(5), TICK).await
        });

        tokio::time::sleep(Duration::from_millis(30)).await;
        drop(held);

        assert!(waiter.await.unwrap().is_ok());
    }
}
