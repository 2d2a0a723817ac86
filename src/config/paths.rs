//! Path management for schema-guard
//!
//! Everything lives under one artifact directory: `BACKUP_DIR` when set,
//! `./backups` otherwise (resolved by `Settings`).

use std::path::{Path, PathBuf};

use crate::error::GuardError;

/// Default artifact directory, relative to the working directory
pub const DEFAULT_BACKUP_DIR: &str = "backups";

/// Manages all paths used by schema-guard
#[derive(Debug, Clone)]
pub struct GuardPaths {
    /// Directory holding artifacts, sidecars, the audit log and the lock file
    backup_dir: PathBuf,
}

impl GuardPaths {
    /// Create GuardPaths with a custom artifact directory (useful for testing)
    pub fn with_backup_dir(backup_dir: PathBuf) -> Self {
        Self { backup_dir }
    }

    /// Get the artifact directory
    pub fn backup_dir(&self) -> &PathBuf {
        &self.backup_dir
    }

    /// Get the path to the audit log
    pub fn audit_log(&self) -> PathBuf {
        self.backup_dir.join("audit.log")
    }

    /// Get the path to the advisory lock file
    pub fn lock_file(&self) -> PathBuf {
        self.backup_dir.join(".schema-guard.lock")
    }

    /// Path of the sidecar metadata file for an artifact
    pub fn sidecar_for(artifact: &Path) -> PathBuf {
        let mut name = artifact.as_os_str().to_os_string();
        name.push(".json");
        PathBuf::from(name)
    }

    /// Ensure the artifact directory exists
    pub fn ensure_backup_dir(&self) -> Result<(), GuardError> {
        std::fs::create_dir_all(&self.backup_dir).map_err(|e| {
            GuardError::Io(format!(
                "Failed to create backup directory {}: {}",
                self.backup_dir.display(),
                e
            ))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_custom_backup_dir() {
        let temp_dir = TempDir::new().unwrap();
        let paths = GuardPaths::with_backup_dir(temp_dir.path().to_path_buf());

        assert_eq!(paths.backup_dir(), temp_dir.path());
        assert_eq!(paths.audit_log(), temp_dir.path().join("audit.log"));
        assert_eq!(
            paths.lock_file(),
            temp_dir.path().join(".schema-guard.lock")
        );
    }

    #[test]
    fn test_sidecar_path() {
        let artifact = PathBuf::from("/var/backups/backup-production-20250101-000000-000.sql.gz");
        assert_eq!(
            GuardPaths::sidecar_for(&artifact),
            PathBuf::from("/var/backups/backup-production-20250101-000000-000.sql.gz.json")
        );
    }

    #[test]
    fn test_ensure_backup_dir() {
        let temp_dir = TempDir::new().unwrap();
        let paths = GuardPaths::with_backup_dir(temp_dir.path().join("nested").join("backups"));

        paths.ensure_backup_dir().unwrap();

        assert!(paths.backup_dir().exists());
    }
}
