//! Backup validation and restoration
//!
//! A restore replaces the live database with an artifact. The artifact is
//! verified against its sidecar first; production additionally requires an
//! explicit override and takes a snapshot of the current state.

use std::fs;

use chrono::Utc;
use serde::Serialize;
use tracing::{error, info, warn};

use super::archive::{decompress_into, sha256_file, COMPRESSED_EXTENSION};
use super::manager::{BackupManager, CreateOptions};
use super::record::{BackupEntry, BackupRecord, BackupScope};
use crate::audit::{AuditEntry, Operation};
use crate::config::EnvironmentPolicy;
use crate::error::{GuardError, GuardResult};

/// Options for `restore_backup`
#[derive(Debug, Clone, Copy, Default)]
pub struct RestoreOptions {
    /// Allow restoring into (or from) production
    pub force: bool,
    /// Skip the size and checksum verification
    pub skip_validation: bool,
}

/// How a failed pre-restore snapshot is treated
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SnapshotMode {
    /// Abort the restore
    Required,
    /// Log and restore anyway; used when rolling back a failed migration
    BestEffort,
}

/// Result of checking an artifact against its sidecar
#[derive(Debug, Clone, Serialize)]
pub struct ValidationReport {
    pub filename: String,
    pub expected_size: u64,
    pub actual_size: u64,
    pub expected_checksum: String,
    pub actual_checksum: String,
}

impl ValidationReport {
    pub fn size_ok(&self) -> bool {
        self.expected_size == self.actual_size
    }

    pub fn checksum_ok(&self) -> bool {
        self.expected_checksum.eq_ignore_ascii_case(&self.actual_checksum)
    }

    pub fn is_valid(&self) -> bool {
        self.size_ok() && self.checksum_ok()
    }

    /// Convert a failed report into an integrity error
    pub fn into_result(self) -> GuardResult<()> {
        if !self.size_ok() {
            return Err(GuardError::integrity(
                self.filename,
                format!(
                    "size mismatch: expected {} bytes, found {}",
                    self.expected_size, self.actual_size
                ),
            ));
        }
        if !self.checksum_ok() {
            return Err(GuardError::integrity(
                self.filename,
                format!(
                    "checksum mismatch: expected {}, found {}",
                    self.expected_checksum, self.actual_checksum
                ),
            ));
        }
        Ok(())
    }
}

/// Result of a completed restore
#[derive(Debug, Clone)]
pub struct RestoreOutcome {
    /// The artifact that was applied
    pub restored: BackupRecord,
    /// Snapshot of the database taken just before the restore
    pub pre_restore_snapshot: Option<BackupRecord>,
    /// Whether the artifact was verified before applying it
    pub validated: bool,
}

impl RestoreOutcome {
    pub fn summary(&self) -> String {
        let mut summary = format!("Restored {}", self.restored.filename);
        if let Some(snapshot) = &self.pre_restore_snapshot {
            summary.push_str(&format!(" (previous state saved as {})", snapshot.filename));
        }
        if !self.validated {
            summary.push_str(" without validation");
        }
        summary
    }
}

impl BackupManager {
    /// Recompute size and checksum of an artifact and compare with its record
    pub fn validate_backup(&self, record: &BackupRecord) -> GuardResult<ValidationReport> {
        let actual_size = match fs::metadata(&record.path) {
            Ok(meta) => meta.len(),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(GuardError::backup_not_found(record.path.display().to_string()))
            }
            Err(e) => return Err(e.into()),
        };

        let actual_checksum = sha256_file(&record.path)?;

        Ok(ValidationReport {
            filename: record.filename.clone(),
            expected_size: record.size_bytes,
            actual_size,
            expected_checksum: record.checksum.clone(),
            actual_checksum,
        })
    }

    /// Fail with an integrity error unless the artifact matches its record
    pub fn verify_integrity(&self, record: &BackupRecord) -> GuardResult<()> {
        self.validate_backup(record)?.into_result()
    }

    /// Turn a listing entry into something restorable
    ///
    /// Artifacts without usable metadata can only be restored with
    /// `skip_validation`; their record is synthesized from the file itself.
    pub fn record_for_restore(
        &self,
        entry: BackupEntry,
        skip_validation: bool,
    ) -> GuardResult<BackupRecord> {
        match entry {
            BackupEntry::Valid(record) => Ok(record),
            BackupEntry::Unknown {
                filename,
                path,
                modified,
                size_bytes,
                reason,
            } => {
                if !skip_validation {
                    return Err(GuardError::integrity(
                        filename,
                        format!("{}; pass --skip-validation to restore it anyway", reason),
                    ));
                }
                Ok(BackupRecord {
                    compressed: filename.ends_with(COMPRESSED_EXTENSION),
                    filename,
                    path,
                    created_at: modified,
                    size_bytes,
                    checksum: String::new(),
                    scope: BackupScope::SchemaAndData,
                    environment: self.environment().to_string(),
                    tool_version: String::new(),
                    sanitized_source: String::new(),
                })
            }
        }
    }

    /// Restore the database from a backup
    ///
    /// Holds the operation lock for the whole restore.
    pub fn restore_backup(
        &self,
        record: &BackupRecord,
        options: RestoreOptions,
    ) -> GuardResult<RestoreOutcome> {
        let _lock = self.lock("restore")?;
        self.restore_locked(record, options, SnapshotMode::Required)
    }

    /// Restore while the caller already holds the operation lock
    pub(crate) fn restore_locked(
        &self,
        record: &BackupRecord,
        options: RestoreOptions,
        snapshot_mode: SnapshotMode,
    ) -> GuardResult<RestoreOutcome> {
        // Integrity first; no override skips it except skip_validation
        if options.skip_validation {
            if !record.path.is_file() {
                return Err(GuardError::backup_not_found(record.path.display().to_string()));
            }
            warn!(filename = %record.filename, "restoring without validation");
        } else {
            self.verify_integrity(record)?;
        }

        let production_target = self.policy().restore_requires_force()
            || EnvironmentPolicy::classify(&record.environment).restore_requires_force();
        if production_target && !options.force {
            return Err(GuardError::PolicyViolation(format!(
                "Restoring {} in production requires --force",
                record.filename
            )));
        }

        let pre_restore_snapshot = if self.policy().snapshots_before_restore() {
            self.take_pre_restore_snapshot(snapshot_mode)?
        } else {
            None
        };

        info!(filename = %record.filename, "restoring backup");
        match self.apply_artifact(record) {
            Ok(()) => {
                info!(filename = %record.filename, "restore completed");
                self.record_audit(
                    AuditEntry::new(
                        Operation::BackupRestored,
                        self.environment(),
                        &record.filename,
                    )
                    .with_details(&serde_json::json!({
                        "validated": !options.skip_validation,
                        "preRestoreSnapshot": pre_restore_snapshot.as_ref().map(|s| &s.filename),
                    })),
                );
                Ok(RestoreOutcome {
                    restored: record.clone(),
                    pre_restore_snapshot,
                    validated: !options.skip_validation,
                })
            }
            Err(e) => {
                error!(filename = %record.filename, error = %e, "restore failed");
                self.record_audit(
                    AuditEntry::new(Operation::RestoreFailed, self.environment(), &record.filename)
                        .with_details(&serde_json::json!({
                            "error": e.to_string(),
                            "preRestoreSnapshot": pre_restore_snapshot.as_ref().map(|s| &s.filename),
                        })),
                );
                Err(e)
            }
        }
    }

    /// Snapshot the current database; kept regardless of how the restore ends
    fn take_pre_restore_snapshot(&self, mode: SnapshotMode) -> GuardResult<Option<BackupRecord>> {
        let options = CreateOptions {
            custom_name: Some(format!(
                "pre-restore-{}-{}",
                self.environment(),
                Utc::now().format("%Y%m%d-%H%M%S-%3f")
            )),
            ..CreateOptions::default()
        };

        match self.create_unretained(&options) {
            Ok(snapshot) => {
                info!(filename = %snapshot.filename, "pre-restore snapshot created");
                self.record_audit(AuditEntry::new(
                    Operation::PreRestoreSnapshot,
                    self.environment(),
                    &snapshot.filename,
                ));
                Ok(Some(snapshot))
            }
            Err(e) if mode == SnapshotMode::BestEffort => {
                warn!(error = %e, "pre-restore snapshot failed, restoring anyway");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    /// Feed the artifact to the restorer, decompressing into a temp file first
    fn apply_artifact(&self, record: &BackupRecord) -> GuardResult<()> {
        if !record.compressed {
            return self.tools.restorer.restore(&record.path);
        }

        // Removed when dropped, on success and failure alike
        let mut decompressed = tempfile::Builder::new()
            .prefix(".restore-")
            .suffix(".sql")
            .tempfile_in(self.backup_dir())?;
        decompress_into(&record.path, decompressed.as_file_mut())?;

        self.tools.restorer.restore(decompressed.path())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GuardPaths;
    use crate::tools::fake::{test_settings, FakeDatabase};
    use std::io::Write;
    use tempfile::TempDir;

    const ORIGINAL: &[u8] = b"CREATE TABLE shifts (id int);\nINSERT INTO shifts VALUES (1);\n";
    const CHANGED: &[u8] = b"CREATE TABLE shifts (id int);\n";

    fn setup(environment: &str) -> (BackupManager, FakeDatabase, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let settings = test_settings(temp_dir.path(), environment);
        let db = FakeDatabase::new(ORIGINAL);
        let manager = BackupManager::new(&settings, db.tools());
        (manager, db, temp_dir)
    }

    fn tamper(record: &BackupRecord) {
        let mut file = fs::OpenOptions::new()
            .append(true)
            .open(&record.path)
            .unwrap();
        file.write_all(b"tampered").unwrap();
    }

    #[test]
    fn test_validate_good_backup() {
        let (manager, _db, _temp) = setup("development");
        let record = manager.create_backup(&CreateOptions::default()).unwrap();

        let report = manager.validate_backup(&record).unwrap();

        assert!(report.is_valid());
        assert_eq!(report.actual_size, record.size_bytes);
    }

    #[test]
    fn test_validate_detects_tampering() {
        let (manager, _db, _temp) = setup("development");
        let record = manager.create_backup(&CreateOptions::default()).unwrap();
        tamper(&record);

        let report = manager.validate_backup(&record).unwrap();
        assert!(!report.size_ok());
        assert!(!report.checksum_ok());

        let err = manager.verify_integrity(&record).unwrap_err();
        assert!(err.is_integrity());
        assert!(err.to_string().contains("size mismatch"));
    }

    #[test]
    fn test_validate_missing_artifact() {
        let (manager, _db, _temp) = setup("development");
        let record = manager.create_backup(&CreateOptions::default()).unwrap();
        fs::remove_file(&record.path).unwrap();

        assert!(matches!(
            manager.validate_backup(&record),
            Err(GuardError::NotFound { .. })
        ));
    }

    #[test]
    fn test_restore_round_trip_compressed() {
        let (manager, db, _temp) = setup("development");
        let record = manager.create_backup(&CreateOptions::default()).unwrap();
        db.state().content = CHANGED.to_vec();

        let outcome = manager
            .restore_backup(&record, RestoreOptions::default())
            .unwrap();

        assert_eq!(db.content(), ORIGINAL);
        assert!(outcome.validated);
        assert!(outcome.pre_restore_snapshot.is_none());
    }

    #[test]
    fn test_restore_round_trip_uncompressed() {
        let (manager, db, _temp) = setup("development");
        let record = manager
            .create_backup(&CreateOptions {
                compress: false,
                ..CreateOptions::default()
            })
            .unwrap();
        db.state().content = CHANGED.to_vec();

        manager
            .restore_backup(&record, RestoreOptions::default())
            .unwrap();

        assert_eq!(db.content(), ORIGINAL);
    }

    #[test]
    fn test_tampered_backup_never_restored() {
        let (manager, db, _temp) = setup("production");
        let record = manager.create_backup(&CreateOptions::default()).unwrap();
        tamper(&record);
        db.state().content = CHANGED.to_vec();

        let err = manager
            .restore_backup(
                &record,
                RestoreOptions {
                    force: true,
                    skip_validation: false,
                },
            )
            .unwrap_err();

        assert!(err.is_integrity());
        assert_eq!(db.state().restores, 0);
        assert_eq!(db.content(), CHANGED);
    }

    #[test]
    fn test_single_byte_flip_never_restored() {
        let (manager, db, _temp) = setup("development");
        let record = manager.create_backup(&CreateOptions::default()).unwrap();

        // Same size, different content: only the checksum can catch it
        let mut bytes = fs::read(&record.path).unwrap();
        let middle = bytes.len() / 2;
        bytes[middle] ^= 0xff;
        fs::write(&record.path, &bytes).unwrap();
        db.state().content = CHANGED.to_vec();

        let err = manager
            .restore_backup(&record, RestoreOptions::default())
            .unwrap_err();

        assert!(err.is_integrity());
        assert!(err.to_string().contains("checksum mismatch"), "{}", err);
        assert_eq!(db.state().restores, 0);
        assert_eq!(db.content(), CHANGED);
    }

    #[test]
    fn test_production_requires_force() {
        let (manager, db, _temp) = setup("production");
        let record = manager.create_backup(&CreateOptions::default()).unwrap();

        let err = manager
            .restore_backup(&record, RestoreOptions::default())
            .unwrap_err();

        assert!(err.is_policy_violation());
        assert_eq!(db.state().restores, 0);
        assert_eq!(manager.list_backups().unwrap().len(), 1);
    }

    #[test]
    fn test_production_record_requires_force_in_development() {
        let (prod, _db, temp) = setup("production");
        let record = prod.create_backup(&CreateOptions::default()).unwrap();

        let dev_db = FakeDatabase::new(CHANGED);
        let dev = BackupManager::new(&test_settings(temp.path(), "development"), dev_db.tools());

        let err = dev
            .restore_backup(&record, RestoreOptions::default())
            .unwrap_err();
        assert!(err.is_policy_violation());

        dev.restore_backup(
            &record,
            RestoreOptions {
                force: true,
                skip_validation: false,
            },
        )
        .unwrap();
        assert_eq!(dev_db.content(), ORIGINAL);
    }

    #[test]
    fn test_production_takes_pre_restore_snapshot() {
        let (manager, db, _temp) = setup("production");
        let record = manager.create_backup(&CreateOptions::default()).unwrap();
        db.state().content = CHANGED.to_vec();

        let outcome = manager
            .restore_backup(
                &record,
                RestoreOptions {
                    force: true,
                    skip_validation: false,
                },
            )
            .unwrap();

        let snapshot = outcome.pre_restore_snapshot.unwrap();
        assert!(snapshot.filename.starts_with("pre-restore-production-"));
        assert!(snapshot.path.exists());
        assert_eq!(db.content(), ORIGINAL);

        // The snapshot holds the state that was replaced
        let mut decompressed = Vec::new();
        decompress_into(&snapshot.path, &mut decompressed).unwrap();
        assert_eq!(decompressed, CHANGED);
    }

    #[test]
    fn test_snapshot_kept_when_restore_fails() {
        let (manager, db, _temp) = setup("production");
        let record = manager.create_backup(&CreateOptions::default()).unwrap();
        db.state().fail_restore = true;

        let err = manager
            .restore_backup(
                &record,
                RestoreOptions {
                    force: true,
                    skip_validation: false,
                },
            )
            .unwrap_err();

        assert!(matches!(err, GuardError::ToolExecution { .. }));
        let names: Vec<String> = manager
            .list_backups()
            .unwrap()
            .iter()
            .map(|b| b.filename().to_string())
            .collect();
        assert!(names.iter().any(|n| n.starts_with("pre-restore-")));

        let operations: Vec<_> = manager
            .audit()
            .read_all()
            .unwrap()
            .iter()
            .map(|e| e.operation)
            .collect();
        assert!(operations.contains(&Operation::PreRestoreSnapshot));
        assert!(operations.contains(&Operation::RestoreFailed));
    }

    #[test]
    fn test_failed_snapshot_aborts_operator_restore() {
        let (manager, db, _temp) = setup("production");
        let record = manager.create_backup(&CreateOptions::default()).unwrap();
        db.state().fail_dump = true;

        let err = manager
            .restore_backup(
                &record,
                RestoreOptions {
                    force: true,
                    skip_validation: false,
                },
            )
            .unwrap_err();

        assert!(matches!(err, GuardError::ToolExecution { .. }));
        assert_eq!(db.state().restores, 0);
    }

    #[test]
    fn test_no_temp_files_left_after_restore() {
        let (manager, _db, temp) = setup("development");
        let record = manager.create_backup(&CreateOptions::default()).unwrap();
        manager
            .restore_backup(&record, RestoreOptions::default())
            .unwrap();

        let leftovers: Vec<_> = fs::read_dir(temp.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
            .filter(|n| n.starts_with(".restore-") || n.ends_with(".lock"))
            .collect();
        assert!(leftovers.is_empty(), "leftover files: {:?}", leftovers);
    }

    #[test]
    fn test_restore_refused_while_locked() {
        let (manager, db, _temp) = setup("development");
        let record = manager.create_backup(&CreateOptions::default()).unwrap();
        let _held = manager.lock("migrate").unwrap();

        let err = manager
            .restore_backup(&record, RestoreOptions::default())
            .unwrap_err();

        assert!(matches!(err, GuardError::Locked(_)));
        assert_eq!(db.state().restores, 0);
    }

    #[test]
    fn test_unknown_entry_requires_skip_validation() {
        let (manager, db, temp) = setup("development");
        let path = temp.path().join("hand-made.sql");
        fs::write(&path, b"SELECT 42;").unwrap();

        let entry = manager.find_backup("hand-made.sql").unwrap();
        assert!(!entry.is_valid());
        assert!(manager
            .record_for_restore(entry.clone(), false)
            .unwrap_err()
            .is_integrity());

        let record = manager.record_for_restore(entry, true).unwrap();
        assert!(!record.compressed);
        let outcome = manager
            .restore_backup(
                &record,
                RestoreOptions {
                    force: false,
                    skip_validation: true,
                },
            )
            .unwrap();

        assert!(!outcome.validated);
        assert_eq!(db.content(), b"SELECT 42;");
        assert!(!GuardPaths::sidecar_for(&path).exists());
    }
}
