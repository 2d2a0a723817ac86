//! Backup manager for schema-guard
//!
//! Creates checksummed, optionally compressed dumps of the datastore and
//! keeps the artifact directory within its retention budget.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use super::archive::{
    compress_file, is_artifact_name, sha256_file, COMPRESSED_EXTENSION, PARTIAL_SUFFIX,
    RAW_EXTENSION,
};
use super::record::{redact_database_url, BackupEntry, BackupMetadata, BackupRecord, BackupScope};
use crate::audit::{AuditEntry, AuditLogger, Operation};
use crate::config::{EnvironmentPolicy, GuardPaths, Settings};
use crate::error::{GuardError, GuardResult};
use crate::lock::OperationLock;
use crate::storage::{read_json_required, write_json_atomic};
use crate::tools::{BackupTools, Datastore};

/// Options for `create_backup`
#[derive(Debug, Clone)]
pub struct CreateOptions {
    /// Gzip the dump (default true)
    pub compress: bool,
    /// Include table definitions (default true)
    pub include_schema: bool,
    /// Include rows (default true)
    pub include_data: bool,
    /// Artifact name instead of the timestamped default
    pub custom_name: Option<String>,
}

impl Default for CreateOptions {
    fn default() -> Self {
        Self {
            compress: true,
            include_schema: true,
            include_data: true,
            custom_name: None,
        }
    }
}

/// Manages backup creation, listing and retention
pub struct BackupManager {
    /// Artifact directory layout
    paths: GuardPaths,
    /// Environment name recorded in sidecars
    environment: String,
    /// Behavior switches for the environment
    policy: EnvironmentPolicy,
    /// Number of valid backups kept by cleanup
    retention_count: usize,
    /// Version recorded in sidecars
    tool_version: String,
    /// Redacted connection string recorded in sidecars
    sanitized_source: String,
    /// How long to wait for the operation lock
    lock_timeout: Duration,
    /// Dump, restore and query capabilities
    pub(super) tools: BackupTools,
    /// Append-only audit trail
    audit: AuditLogger,
}

impl BackupManager {
    /// Create a new BackupManager
    pub fn new(settings: &Settings, tools: BackupTools) -> Self {
        Self {
            paths: settings.paths.clone(),
            environment: settings.environment.clone(),
            policy: settings.policy,
            retention_count: settings.retention_count,
            tool_version: settings.tool_version.clone(),
            sanitized_source: redact_database_url(settings.database_url.as_deref().unwrap_or("")),
            lock_timeout: settings.lock_timeout,
            tools,
            audit: AuditLogger::new(settings.paths.audit_log()),
        }
    }

    /// Create a BackupManager backed by `pg_dump` and `psql`
    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(settings, BackupTools::postgres(settings))
    }

    /// Get backup directory path
    pub fn backup_dir(&self) -> &PathBuf {
        self.paths.backup_dir()
    }

    pub fn paths(&self) -> &GuardPaths {
        &self.paths
    }

    pub fn environment(&self) -> &str {
        &self.environment
    }

    pub fn policy(&self) -> EnvironmentPolicy {
        self.policy
    }

    pub fn retention_count(&self) -> usize {
        self.retention_count
    }

    pub fn tool_version(&self) -> &str {
        &self.tool_version
    }

    /// The datastore the backups are taken from
    pub fn datastore(&self) -> &dyn Datastore {
        self.tools.datastore.as_ref()
    }

    pub fn audit(&self) -> &AuditLogger {
        &self.audit
    }

    /// Write an audit entry; a failing audit log never fails the operation
    pub(crate) fn record_audit(&self, entry: AuditEntry) {
        if let Err(e) = self.audit.log(&entry) {
            warn!(operation = %entry.operation, error = %e, "failed to write audit entry");
        }
    }

    /// Take the advisory lock for a mutating operation
    pub fn lock(&self, operation: &str) -> GuardResult<OperationLock> {
        OperationLock::acquire(&self.paths.lock_file(), operation, self.lock_timeout)
    }

    /// Create a backup and then enforce the retention policy
    pub fn create_backup(&self, options: &CreateOptions) -> GuardResult<BackupRecord> {
        let record = self.create_unretained(options)?;
        let deleted = self.cleanup_old_backups(self.retention_count)?;
        if !deleted.is_empty() {
            info!(deleted = deleted.len(), "retention cleanup removed old backups");
        }
        Ok(record)
    }

    /// Create a backup without running retention cleanup
    pub(crate) fn create_unretained(&self, options: &CreateOptions) -> GuardResult<BackupRecord> {
        let scope = BackupScope::from_flags(options.include_schema, options.include_data)?;

        self.tools.datastore.probe()?;
        self.paths.ensure_backup_dir()?;

        let created_at = Utc::now();
        let stem = match &options.custom_name {
            Some(name) => sanitize_name(name)?,
            None => format!(
                "backup-{}-{}",
                sanitize_component(&self.environment),
                created_at.format("%Y%m%d-%H%M%S-%3f")
            ),
        };
        let extension = if options.compress {
            COMPRESSED_EXTENSION
        } else {
            RAW_EXTENSION
        };
        let filename = format!("{}{}", stem, extension);
        let artifact_path = self.backup_dir().join(&filename);
        if artifact_path.exists() {
            return Err(GuardError::Config(format!(
                "Backup {} already exists",
                filename
            )));
        }

        let partial_path = self
            .backup_dir()
            .join(format!("{}{}{}", stem, RAW_EXTENSION, PARTIAL_SUFFIX));

        info!(%scope, filename, "creating backup");
        let dump = match self.tools.dumper.dump(scope, &partial_path) {
            Ok(dump) => dump,
            Err(e) => {
                remove_quietly(&partial_path);
                return Err(e);
            }
        };
        debug!(bytes = dump.bytes_written, "dump finished");

        let raw_size = fs::metadata(&partial_path).map(|m| m.len()).unwrap_or(0);
        if raw_size == 0 {
            remove_quietly(&partial_path);
            return Err(GuardError::EmptyArtifact { path: artifact_path });
        }

        if options.compress {
            let compressed = compress_file(&partial_path, &artifact_path);
            remove_quietly(&partial_path);
            if let Err(e) = compressed {
                remove_quietly(&artifact_path);
                return Err(e);
            }
        } else {
            fs::rename(&partial_path, &artifact_path).map_err(|e| {
                remove_quietly(&partial_path);
                GuardError::Io(format!("Failed to move dump into place: {}", e))
            })?;
        }

        let size_bytes = fs::metadata(&artifact_path)?.len();
        if size_bytes == 0 {
            remove_quietly(&artifact_path);
            return Err(GuardError::EmptyArtifact { path: artifact_path });
        }
        let checksum = sha256_file(&artifact_path)?;

        let record = BackupRecord {
            filename,
            path: artifact_path,
            created_at,
            size_bytes,
            checksum,
            compressed: options.compress,
            scope,
            environment: self.environment.clone(),
            tool_version: self.tool_version.clone(),
            sanitized_source: self.sanitized_source.clone(),
        };

        // The sidecar commits the backup; without it the artifact is not a record
        if let Err(e) = write_json_atomic(GuardPaths::sidecar_for(&record.path), &record.to_metadata())
        {
            remove_quietly(&record.path);
            return Err(e);
        }

        info!(
            filename = %record.filename,
            size = record.size_bytes,
            checksum = %record.checksum,
            "backup created"
        );
        self.record_audit(
            AuditEntry::new(Operation::BackupCreated, &self.environment, &record.filename)
                .with_details(&record.to_metadata()),
        );

        Ok(record)
    }

    /// List all artifacts, newest first
    ///
    /// Artifacts with missing or unreadable metadata are listed as
    /// `BackupEntry::Unknown` rather than skipped.
    pub fn list_backups(&self) -> GuardResult<Vec<BackupEntry>> {
        if !self.backup_dir().exists() {
            return Ok(Vec::new());
        }

        let mut backups = Vec::new();

        for entry in fs::read_dir(self.backup_dir()).map_err(|e| {
            GuardError::Io(format!("Failed to read backup directory: {}", e))
        })? {
            let entry = entry.map_err(|e| {
                GuardError::Io(format!("Failed to read directory entry: {}", e))
            })?;

            let path = entry.path();
            let is_artifact = path
                .file_name()
                .map_or(false, |name| is_artifact_name(&name.to_string_lossy()));
            if is_artifact && path.is_file() {
                backups.push(inspect_artifact(&path));
            }
        }

        backups.sort_by(|a, b| {
            b.created_at()
                .cmp(&a.created_at())
                .then_with(|| b.filename().cmp(a.filename()))
        });

        Ok(backups)
    }

    /// Resolve a backup by `latest`, a path, or a filename in the backup directory
    pub fn find_backup(&self, identifier: &str) -> GuardResult<BackupEntry> {
        if identifier.eq_ignore_ascii_case("latest") {
            return self
                .get_latest_backup()?
                .map(BackupEntry::Valid)
                .ok_or_else(|| GuardError::backup_not_found("latest"));
        }

        let path = PathBuf::from(identifier);
        if path.is_file() {
            return Ok(inspect_artifact(&path));
        }

        for candidate in [
            identifier.to_string(),
            format!("{}{}", identifier, COMPRESSED_EXTENSION),
            format!("{}{}", identifier, RAW_EXTENSION),
        ] {
            let path = self.backup_dir().join(candidate);
            if path.is_file() {
                return Ok(inspect_artifact(&path));
            }
        }

        Err(GuardError::backup_not_found(identifier))
    }

    /// Get the most recent valid backup
    pub fn get_latest_backup(&self) -> GuardResult<Option<BackupRecord>> {
        Ok(self
            .list_backups()?
            .into_iter()
            .find_map(|entry| match entry {
                BackupEntry::Valid(record) => Some(record),
                BackupEntry::Unknown { .. } => None,
            }))
    }

    /// Keep the `retention_count` newest valid backups, delete the rest
    ///
    /// Unknown artifacts older than the oldest kept backup are deleted too.
    /// Returns the deleted artifact paths.
    pub fn cleanup_old_backups(&self, retention_count: usize) -> GuardResult<Vec<PathBuf>> {
        if retention_count == 0 {
            return Err(GuardError::Config(
                "Retention count must be at least 1".into(),
            ));
        }

        let backups = self.list_backups()?;
        let (valid, unknown): (Vec<_>, Vec<_>) = backups.into_iter().partition(|b| b.is_valid());

        let cutoff = valid.get(retention_count - 1).map(|b| b.created_at());
        let mut deleted = Vec::new();

        for backup in valid.iter().skip(retention_count) {
            self.delete_backup(backup)?;
            deleted.push(backup.path().clone());
        }

        if let Some(cutoff) = cutoff {
            for backup in unknown.iter().filter(|b| b.created_at() < cutoff) {
                self.delete_backup(backup)?;
                deleted.push(backup.path().clone());
            }
        }

        Ok(deleted)
    }

    /// Delete an artifact and its sidecar
    pub fn delete_backup(&self, backup: &BackupEntry) -> GuardResult<()> {
        remove_if_exists(backup.path())?;
        remove_if_exists(&GuardPaths::sidecar_for(backup.path()))?;

        info!(filename = backup.filename(), "deleted backup");
        self.record_audit(AuditEntry::new(
            Operation::BackupDeleted,
            &self.environment,
            backup.filename(),
        ));
        Ok(())
    }
}

/// Build a listing entry for an artifact, never failing
fn inspect_artifact(path: &Path) -> BackupEntry {
    let filename = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();

    let (size_bytes, modified) = match fs::metadata(path) {
        Ok(meta) => (
            meta.len(),
            meta.modified()
                .map(DateTime::<Utc>::from)
                .unwrap_or(DateTime::<Utc>::UNIX_EPOCH),
        ),
        Err(_) => (0, DateTime::<Utc>::UNIX_EPOCH),
    };

    let unknown = |reason: String| BackupEntry::Unknown {
        filename: filename.clone(),
        path: path.to_path_buf(),
        modified,
        size_bytes,
        reason,
    };

    if size_bytes == 0 {
        return unknown("empty artifact".into());
    }

    let sidecar = GuardPaths::sidecar_for(path);
    if !sidecar.exists() {
        return unknown("metadata missing".into());
    }

    let metadata: BackupMetadata = match read_json_required(&sidecar) {
        Ok(metadata) => metadata,
        Err(e) => return unknown(format!("metadata unreadable: {}", e)),
    };

    if metadata.filename != filename {
        return unknown(format!("metadata describes {}", metadata.filename));
    }

    match BackupRecord::from_metadata(metadata, path.to_path_buf()) {
        Ok(record) => BackupEntry::Valid(record),
        Err(e) => unknown(format!("metadata invalid: {}", e)),
    }
}

/// Validate an operator-supplied artifact name
fn sanitize_name(name: &str) -> GuardResult<String> {
    let trimmed = name
        .trim()
        .trim_end_matches(COMPRESSED_EXTENSION)
        .trim_end_matches(RAW_EXTENSION);
    let cleaned = sanitize_component(trimmed);
    if cleaned.is_empty() || cleaned.chars().all(|c| c == '.') {
        return Err(GuardError::Config(format!("Invalid backup name '{}'", name)));
    }
    Ok(cleaned)
}

/// Replace anything outside `[A-Za-z0-9._-]` with `-`
fn sanitize_component(raw: &str) -> String {
    raw.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '-'
            }
        })
        .collect()
}

fn remove_if_exists(path: &Path) -> GuardResult<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(GuardError::Io(format!(
            "Failed to delete {}: {}",
            path.display(),
            e
        ))),
    }
}

fn remove_quietly(path: &Path) {
    if let Err(e) = fs::remove_file(path) {
        if e.kind() != std::io::ErrorKind::NotFound {
            warn!(path = %path.display(), error = %e, "failed to remove intermediate file");
        }
    }
}
