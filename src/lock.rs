//! Advisory operation lock
//!
//! `migrate` and `restore` hold a lock file in the artifact directory for
//! their whole run so two invocations cannot mutate the same database at
//! once. The file is created with `create_new` and removed when the guard
//! drops, on every exit path.

use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use chrono::Utc;
use tracing::{debug, warn};

use crate::error::{GuardError, GuardResult};

const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Held lock; released on drop
#[derive(Debug)]
pub struct OperationLock {
    path: PathBuf,
}

impl OperationLock {
    /// Acquire the lock at `path`, waiting up to `timeout`
    pub fn acquire(path: &Path, operation: &str, timeout: Duration) -> GuardResult<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                GuardError::Io(format!("Failed to create {}: {}", parent.display(), e))
            })?;
        }

        let deadline = Instant::now() + timeout;
        loop {
            match OpenOptions::new().write(true).create_new(true).open(path) {
                Ok(mut file) => {
                    // Holder details are diagnostic only
                    let _ = writeln!(
                        file,
                        "pid={} operation={} acquired_at={}",
                        std::process::id(),
                        operation,
                        Utc::now().to_rfc3339()
                    );
                    debug!(lock = %path.display(), operation, "acquired operation lock");
                    return Ok(Self {
                        path: path.to_path_buf(),
                    });
                }
                Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                    if Instant::now() >= deadline {
                        let holder = fs::read_to_string(path).unwrap_or_default();
                        return Err(GuardError::Locked(format!(
                            "{} is held by another invocation ({}). \
                             Remove it manually if that process is gone.",
                            path.display(),
                            holder.trim()
                        )));
                    }
                    std::thread::sleep(POLL_INTERVAL);
                }
                Err(e) => {
                    return Err(GuardError::Io(format!(
                        "Failed to acquire lock {}: {}",
                        path.display(),
                        e
                    )));
                }
            }
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for OperationLock {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.path) {
            warn!(lock = %self.path.display(), error = %e, "failed to release operation lock");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_acquire_and_release() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join(".schema-guard.lock");

        {
            let lock = OperationLock::acquire(&path, "migrate", Duration::from_secs(1)).unwrap();
            assert!(lock.path().exists());
            let contents = fs::read_to_string(&path).unwrap();
            assert!(contents.contains("operation=migrate"));
        }

        assert!(!path.exists());
    }

    #[test]
    fn test_second_acquire_times_out() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join(".schema-guard.lock");

        let _held = OperationLock::acquire(&path, "migrate", Duration::from_secs(1)).unwrap();
        let err = OperationLock::acquire(&path, "restore", Duration::from_millis(150)).unwrap_err();

        assert!(matches!(err, GuardError::Locked(_)));
        assert!(err.to_string().contains("operation=migrate"));
    }

    #[test]
    fn test_reacquire_after_release() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("nested").join(".schema-guard.lock");

        drop(OperationLock::acquire(&path, "restore", Duration::from_secs(1)).unwrap());
        OperationLock::acquire(&path, "restore", Duration::from_secs(1)).unwrap();
    }
}
