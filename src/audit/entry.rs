//! Audit entry data structures

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Events recorded in the audit log
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    BackupCreated,
    BackupDeleted,
    PreRestoreSnapshot,
    BackupRestored,
    RestoreFailed,
    MigrationDryRun,
    MigrationCommitted,
    MigrationRolledBack,
    MigrationFailed,
    /// The automatic restore after a failed migration failed too
    RollbackFailed,
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Operation::BackupCreated => "BACKUP_CREATED",
            Operation::BackupDeleted => "BACKUP_DELETED",
            Operation::PreRestoreSnapshot => "PRE_RESTORE_SNAPSHOT",
            Operation::BackupRestored => "BACKUP_RESTORED",
            Operation::RestoreFailed => "RESTORE_FAILED",
            Operation::MigrationDryRun => "MIGRATION_DRY_RUN",
            Operation::MigrationCommitted => "MIGRATION_COMMITTED",
            Operation::MigrationRolledBack => "MIGRATION_ROLLED_BACK",
            Operation::MigrationFailed => "MIGRATION_FAILED",
            Operation::RollbackFailed => "ROLLBACK_FAILED",
        };
        write!(f, "{}", label)
    }
}

/// A single audit log entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    /// When the event occurred (UTC)
    pub timestamp: DateTime<Utc>,

    /// What happened
    pub operation: Operation,

    /// Environment the command ran in
    pub environment: String,

    /// Artifact filename or migration attempt id
    pub subject: String,

    /// Structured details (record, attempt, error message)
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub details: serde_json::Value,
}

impl AuditEntry {
    /// Create an entry timestamped now
    pub fn new(
        operation: Operation,
        environment: impl Into<String>,
        subject: impl Into<String>,
    ) -> Self {
        Self {
            timestamp: Utc::now(),
            operation,
            environment: environment.into(),
            subject: subject.into(),
            details: serde_json::Value::Null,
        }
    }

    /// Attach any serializable value as details
    ///
    /// Details that cannot be represented as JSON are dropped with a warning;
    /// the entry itself is still written.
    pub fn with_details<T: Serialize>(mut self, details: &T) -> Self {
        self.details = match serde_json::to_value(details) {
            Ok(value) => value,
            Err(e) => {
                warn!(operation = %self.operation, error = %e, "failed to serialize audit details");
                serde_json::Value::Null
            }
        };
        self
    }

    /// Format the entry for human-readable output
    pub fn format_human_readable(&self) -> String {
        format!(
            "[{}] {} {} ({})",
            self.timestamp.format("%Y-%m-%d %H:%M:%S UTC"),
            self.operation,
            self.subject,
            self.environment
        )
    }
}
