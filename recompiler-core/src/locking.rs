//! Lock file guarding against concurrent runs over the same packages.

use std::fs::{self, OpenOptions};
use std::future::Future;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::options::LockRetry;

/// File name of the lock inside the base path.
pub const LOCK_FILE: &str = "__recompiler_lock_file__";

/// A lock file holding the pid of the process that created it.
#[derive(Debug, Clone)]
pub struct LockFile {
    path: PathBuf,
}

impl LockFile {
    pub fn new(base_path: &Path) -> Self {
        Self {
            path: base_path.join(LOCK_FILE),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Creates the lock file, or returns `None` if it already exists.
    pub fn try_acquire(&self) -> Result<Option<LockGuard>> {
        match OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&self.path)
        {
            Ok(mut file) => {
                let written = write!(file, "{}", std::process::id());
                let guard = LockGuard {
                    path: self.path.clone(),
                };
                written?;
                debug!("Acquired lock file {}", self.path.display());
                Ok(Some(guard))
            }
            Err(e) if e.kind() == ErrorKind::AlreadyExists => Ok(None),
            Err(e) => Err(Error::Io(e)),
        }
    }

    /// The pid recorded in the lock file.
    pub fn read_pid(&self) -> String {
        fs::read_to_string(&self.path)
            .map(|pid| pid.trim().to_string())
            .unwrap_or_else(|_| "{unknown}".to_string())
    }

    /// Removes the lock file if present.
    pub fn remove(&self) {
        if let Err(e) = fs::remove_file(&self.path) {
            if e.kind() != ErrorKind::NotFound {
                debug!("Failed to remove lock file {}: {}", self.path.display(), e);
            }
        }
    }
}

/// Removes the lock file when dropped.
#[derive(Debug)]
pub struct LockGuard {
    path: PathBuf,
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        LockFile {
            path: self.path.clone(),
        }
        .remove();
    }
}

/// Takes the lock or fails straight away.
#[derive(Debug, Clone)]
pub struct SyncLocker {
    lock_file: LockFile,
}

impl SyncLocker {
    pub fn new(lock_file: LockFile) -> Self {
        Self { lock_file }
    }

    /// Runs `f` while holding the lock.
    pub fn lock<T>(&self, f: impl FnOnce() -> Result<T>) -> Result<T> {
        let Some(_guard) = self.lock_file.try_acquire()? else {
            return Err(Error::LockHeld {
                path: self.lock_file.path().to_path_buf(),
                pid: self.lock_file.read_pid(),
            });
        };
        f()
    }
}

/// Waits for the lock, retrying while another process holds it.
#[derive(Debug, Clone)]
pub struct AsyncLocker {
    lock_file: LockFile,
    retry: LockRetry,
}

impl AsyncLocker {
    pub fn new(lock_file: LockFile, retry: LockRetry) -> Self {
        Self { lock_file, retry }
    }

    /// Awaits `fut` while holding the lock.
    pub async fn lock<T, F>(&self, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        let _guard = self.acquire().await?;
        fut.await
    }

    async fn acquire(&self) -> Result<LockGuard> {
        let mut pid = String::new();
        let mut attempts = 0;
        let waited_secs =
            (self.retry.delay.as_millis() * u128::from(self.retry.attempts) / 1000) as u64;

        while attempts < self.retry.attempts {
            if let Some(guard) = self.lock_file.try_acquire()? {
                return Ok(guard);
            }

            let holder = self.lock_file.read_pid();
            if holder != pid {
                // A different process took over; start waiting afresh.
                attempts = 0;
                pid = holder;
            }
            if attempts == 0 {
                info!(
                    "Another process, with id {}, is currently running recompiler.\nWaiting up to {}s for it to finish.\n(If you are sure no recompiler process is running then you should delete the lock-file at {}.)",
                    pid,
                    waited_secs,
                    self.lock_file.path().display()
                );
            }
            tokio::time::sleep(self.retry.delay).await;
            attempts += 1;
        }

        Err(Error::LockTimeout {
            path: self.lock_file.path().to_path_buf(),
            pid,
            waited_secs,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tempfile::TempDir;

    #[test]
    fn test_sync_locker_releases_on_exit() {
        let temp = TempDir::new().unwrap();
        let lock_file = LockFile::new(temp.path());
        let locker = SyncLocker::new(lock_file.clone());

        let seen = locker
            .lock(|| Ok(lock_file.path().exists()))
            .unwrap();
        assert!(seen);
        assert!(!lock_file.path().exists());
    }

    #[test]
    fn test_sync_locker_fails_when_held() {
        let temp = TempDir::new().unwrap();
        let lock_file = LockFile::new(temp.path());
        fs::write(lock_file.path(), "4242").unwrap();

        let result = SyncLocker::new(lock_file.clone()).lock(|| Ok(()));
        match result {
            Err(Error::LockHeld { pid, .. }) => assert_eq!(pid, "4242"),
            other => panic!("expected LockHeld, got {:?}", other),
        }
        assert!(lock_file.path().exists());
    }

    #[tokio::test]
    async fn test_async_locker_times_out() {
        let temp = TempDir::new().unwrap();
        let lock_file = LockFile::new(temp.path());
        fs::write(lock_file.path(), "4242").unwrap();

        let locker = AsyncLocker::new(
            lock_file,
            LockRetry {
                attempts: 2,
                delay: Duration::from_millis(5),
            },
        );
        let result = locker.lock(async { Ok(()) }).await;
        assert!(matches!(result, Err(Error::LockTimeout { .. })));
    }

    #[tokio::test]
    async fn test_async_locker_waits_for_release() {
        let temp = TempDir::new().unwrap();
        let lock_file = LockFile::new(temp.path());
        fs::write(lock_file.path(), "4242").unwrap();

        let remover = lock_file.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            remover.remove();
        });

        let locker = AsyncLocker::new(
            lock_file,
            LockRetry {
                attempts: 100,
                delay: Duration::from_millis(5),
            },
        );
        assert_eq!(locker.lock(async { Ok(7) }).await.unwrap(), 7);
    }
}
