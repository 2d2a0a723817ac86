//! Safe migration workflow
//!
//! Validate, snapshot (production), apply, verify, commit. When a step after
//! the snapshot fails, the snapshot is restored. Rollback is only ever
//! attempted against a snapshot taken by the same attempt.

use std::path::Path;

use tracing::{error, info, warn};

use super::state::{MigrationAttempt, MigrationOutcome, MigrationState};
use super::system_config::SystemConfigEntry;
use crate::audit::{AuditEntry, Operation};
use crate::backup::{BackupManager, CreateOptions, RestoreOptions, SnapshotMode};
use crate::config::Settings;
use crate::error::{GuardError, GuardResult};
use crate::tools::{CommandSchemaApplier, SchemaApplier};

/// Options for `migrate`
#[derive(Debug, Clone, Copy)]
pub struct MigrateOptions {
    /// Snapshot before applying (production only)
    pub create_backup: bool,
    /// Report pending migrations and stop
    pub dry_run: bool,
    /// Allow skipping the production snapshot
    pub force: bool,
}

impl Default for MigrateOptions {
    fn default() -> Self {
        Self {
            create_backup: true,
            dry_run: false,
            force: false,
        }
    }
}

/// Runs migration attempts against one environment
pub struct Migrator {
    backups: BackupManager,
    applier: Box<dyn SchemaApplier>,
    database_configured: bool,
}

impl Migrator {
    pub fn new(settings: &Settings, backups: BackupManager, applier: Box<dyn SchemaApplier>) -> Self {
        Self {
            backups,
            applier,
            database_configured: settings.require_database_url().is_ok(),
        }
    }

    /// Migrator using `pg_dump`/`psql` and the configured migration command
    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(
            settings,
            BackupManager::from_settings(settings),
            Box::new(CommandSchemaApplier::from_settings(settings)),
        )
    }

    pub fn backups(&self) -> &BackupManager {
        &self.backups
    }

    /// Run one migration attempt
    ///
    /// Returns the attempt when it committed or was a dry run. Every other
    /// ending is an error carrying the attempt: `MigrationFailed` when the
    /// database was restored or never touched, `RollbackFailure` when the
    /// restore itself failed.
    pub fn migrate(&self, options: &MigrateOptions) -> GuardResult<MigrationAttempt> {
        let mut attempt = MigrationAttempt::new(self.backups.environment());
        info!(
            attempt = %attempt.id,
            environment = %attempt.environment,
            dry_run = options.dry_run,
            "starting migration"
        );

        attempt.transition(MigrationState::Validating);
        self.validate(options)?;

        if options.dry_run {
            attempt.pending = self.applier.pending()?;
            info!(pending = attempt.pending.len(), "dry run, no changes made");
            attempt.finish(MigrationOutcome::DryRun);
            self.audit(Operation::MigrationDryRun, &attempt);
            return Ok(attempt);
        }

        let _lock = self.backups.lock("migrate")?;

        if options.create_backup && self.backups.policy().snapshots_before_migration() {
            attempt.transition(MigrationState::Snapshotting);
            match self.backups.create_backup(&CreateOptions::default()) {
                Ok(snapshot) => {
                    info!(filename = %snapshot.filename, "pre-migration snapshot created");
                    attempt.snapshot = Some(snapshot);
                }
                Err(e) => return Err(self.recover(attempt, e)),
            }
        } else if options.create_backup {
            info!(policy = %self.backups.policy(), "skipping pre-migration snapshot");
        } else {
            warn!("pre-migration snapshot disabled, failures cannot be rolled back");
        }

        attempt.transition(MigrationState::Applying);
        match self.applier.apply() {
            Ok(applied) => {
                info!(count = applied.len(), "migrations applied");
                attempt.applied = applied;
            }
            Err(e) => return Err(self.recover(attempt, e)),
        }

        attempt.transition(MigrationState::Verifying);
        if let Err(e) = self.verify(&attempt) {
            return Err(self.recover(attempt, e));
        }

        attempt.transition(MigrationState::Committed);
        attempt.finish(MigrationOutcome::Committed);
        info!(attempt = %attempt.id, applied = attempt.applied.len(), "migration committed");
        self.audit(Operation::MigrationCommitted, &attempt);

        Ok(attempt)
    }

    /// Pre-flight checks; never changes anything
    fn validate(&self, options: &MigrateOptions) -> GuardResult<()> {
        if !self.database_configured {
            return Err(GuardError::Config("DATABASE_URL is not set".into()));
        }

        self.backups.datastore().probe()?;

        let policy = self.backups.policy();
        if policy.requires_backup_dir() {
            check_dir_creatable(self.backups.backup_dir())?;
        }

        if !options.dry_run
            && !options.create_backup
            && policy.snapshot_skip_requires_force()
            && !options.force
        {
            return Err(GuardError::PolicyViolation(
                "Migrating production without a snapshot requires --force".into(),
            ));
        }

        Ok(())
    }

    /// Smoke queries, then the commit marker
    fn verify(&self, attempt: &MigrationAttempt) -> GuardResult<()> {
        let datastore = self.backups.datastore();

        for check in datastore.smoke_check()? {
            info!(check = %check.target, rows = check.row_count, "smoke check passed");
        }

        let marker = SystemConfigEntry::last_migration(attempt, self.backups.tool_version());
        datastore.upsert_system_config(&marker).map_err(|e| {
            GuardError::Verification(format!(
                "Failed to record {}: {}",
                SystemConfigEntry::LAST_MIGRATION,
                e
            ))
        })
    }

    /// Restore the snapshot when there is one and build the final error
    fn recover(&self, mut attempt: MigrationAttempt, failure: GuardError) -> GuardError {
        error!(attempt = %attempt.id, state = %attempt.state(), error = %failure, "migration step failed");

        let snapshot = match attempt.snapshot.clone() {
            Some(snapshot) => snapshot,
            None => {
                attempt.transition(MigrationState::FailedNoRollback);
                attempt.finish(MigrationOutcome::FailedNoRollback);
                warn!(attempt = %attempt.id, "no snapshot for this attempt, nothing to roll back");
                self.audit(Operation::MigrationFailed, &attempt);
                return GuardError::MigrationFailed {
                    attempt: Box::new(attempt),
                    source: Box::new(failure),
                };
            }
        };

        attempt.transition(MigrationState::RollingBack);
        let options = RestoreOptions {
            force: true,
            skip_validation: false,
        };

        match self
            .backups
            .restore_locked(&snapshot, options, SnapshotMode::BestEffort)
        {
            Ok(_) => {
                attempt.transition(MigrationState::RolledBack);
                attempt.finish(MigrationOutcome::RolledBack);
                warn!(attempt = %attempt.id, snapshot = %snapshot.filename, "migration rolled back");
                self.audit(Operation::MigrationRolledBack, &attempt);
                GuardError::MigrationFailed {
                    attempt: Box::new(attempt),
                    source: Box::new(failure),
                }
            }
            Err(restore) => {
                attempt.transition(MigrationState::FailedNoRollback);
                attempt.finish(MigrationOutcome::FailedNoRollback);
                error!(
                    attempt = %attempt.id,
                    snapshot = %snapshot.filename,
                    original = %failure,
                    restore = %restore,
                    "ROLLBACK FAILED: database may be partially migrated, manual recovery required"
                );
                self.audit(Operation::RollbackFailed, &attempt);
                GuardError::RollbackFailure {
                    attempt: Box::new(attempt),
                    original: Box::new(failure),
                    restore: Box::new(restore),
                }
            }
        }
    }

    fn audit(&self, operation: Operation, attempt: &MigrationAttempt) {
        self.backups.record_audit(
            AuditEntry::new(operation, &attempt.environment, attempt.id.to_string())
                .with_details(attempt),
        );
    }
}

/// The directory exists and is writable, or its nearest existing ancestor is
fn check_dir_creatable(dir: &Path) -> GuardResult<()> {
    let mut candidate = Some(dir);
    while let Some(path) = candidate {
        if path.as_os_str().is_empty() {
            break;
        }
        if let Ok(meta) = path.metadata() {
            if !meta.is_dir() {
                return Err(GuardError::Config(format!(
                    "Backup directory {} is blocked by a file at {}",
                    dir.display(),
                    path.display()
                )));
            }
            if meta.permissions().readonly() {
                return Err(GuardError::Config(format!(
                    "Backup directory {} is not writable",
                    dir.display()
                )));
            }
            return Ok(());
        }
        candidate = path.parent();
    }
    // Relative path with no existing ancestor resolves against the working directory
    Ok(())
}
