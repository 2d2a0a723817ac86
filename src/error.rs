//! Custom error types for schema-guard
//!
//! This module defines the error hierarchy for backup and migration
//! operations using thiserror for ergonomic error definitions. Every kind is
//! distinct so callers can tell an unreachable database from a corrupt
//! artifact or a failed rollback.

use std::path::PathBuf;

use thiserror::Error;

use crate::migrate::MigrationAttempt;

/// The main error type for schema-guard operations
#[derive(Error, Debug)]
pub enum GuardError {
    /// Datastore unreachable
    #[error("Connectivity error: {0}")]
    Connectivity(String),

    /// Required setting missing or invalid
    #[error("Configuration error: {0}")]
    Config(String),

    /// A dump produced zero bytes
    #[error("Empty artifact: {} contains no data", path.display())]
    EmptyArtifact { path: PathBuf },

    /// Checksum or size mismatch on an artifact
    #[error("Integrity error for {filename}: {reason}")]
    Integrity { filename: String, reason: String },

    /// Operation refused by the environment policy
    #[error("Policy violation: {0}")]
    PolicyViolation(String),

    /// An external tool exited unsuccessfully
    #[error("{tool} failed ({status}): {stderr}")]
    ToolExecution {
        tool: String,
        status: String,
        stderr: String,
    },

    /// Post-migration smoke verification failed
    #[error("Verification failed: {0}")]
    Verification(String),

    /// Compression or decompression errors
    #[error("Compression error: {0}")]
    Compression(String),

    /// The migration failed and the attempt ended without committing
    #[error("Migration {} {}: {source}", attempt.id, attempt.outcome_label())]
    MigrationFailed {
        attempt: Box<MigrationAttempt>,
        #[source]
        source: Box<GuardError>,
    },

    /// The automatic post-failure restore itself failed
    #[error(
        "ROLLBACK FAILED for migration {}: database may be partially migrated. \
         Original failure: {original}. Restore failure: {restore}",
        attempt.id
    )]
    RollbackFailure {
        attempt: Box<MigrationAttempt>,
        original: Box<GuardError>,
        restore: Box<GuardError>,
    },

    /// Another invocation holds the operation lock
    #[error("Locked: {0}")]
    Locked(String),

    /// Entity not found errors
    #[error("{entity_type} not found: {identifier}")]
    NotFound {
        entity_type: &'static str,
        identifier: String,
    },

    /// File I/O errors
    #[error("I/O error: {0}")]
    Io(String),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(String),
}

impl GuardError {
    /// Create a "not found" error for backups
    pub fn backup_not_found(identifier: impl Into<String>) -> Self {
        Self::NotFound {
            entity_type: "Backup",
            identifier: identifier.into(),
        }
    }

    /// Create an integrity error for an artifact
    pub fn integrity(filename: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Integrity {
            filename: filename.into(),
            reason: reason.into(),
        }
    }

    /// Check if this is an integrity error
    pub fn is_integrity(&self) -> bool {
        matches!(self, Self::Integrity { .. })
    }

    /// Check if this is a policy violation
    pub fn is_policy_violation(&self) -> bool {
        matches!(self, Self::PolicyViolation(_))
    }

    /// Check if this error means operator action is required
    pub fn is_rollback_failure(&self) -> bool {
        matches!(self, Self::RollbackFailure { .. })
    }

    /// The migration attempt carried by migration-level failures
    pub fn attempt(&self) -> Option<&MigrationAttempt> {
        match self {
            Self::MigrationFailed { attempt, .. } | Self::RollbackFailure { attempt, .. } => {
                Some(attempt.as_ref())
            }
            _ => None,
        }
    }
}

impl From<std::io::Error> for GuardError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl From<serde_json::Error> for GuardError {
    fn from(err: serde_json::Error) -> Self {
        Self::Json(err.to_string())
    }
}

/// Result type alias for schema-guard operations
pub type GuardResult<T> = Result<T, GuardError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = GuardError::Config("DATABASE_URL is not set".into());
        assert_eq!(
            err.to_string(),
            "Configuration error: DATABASE_URL is not set"
        );
    }

    #[test]
    fn test_not_found_error() {
        let err = GuardError::backup_not_found("latest");
        assert_eq!(err.to_string(), "Backup not found: latest");
    }

    #[test]
    fn test_tool_execution_error() {
        let err = GuardError::ToolExecution {
            tool: "pg_dump".into(),
            status: "exit status: 1".into(),
            stderr: "connection refused".into(),
        };
        assert_eq!(
            err.to_string(),
            "pg_dump failed (exit status: 1): connection refused"
        );
    }

    #[test]
    fn test_integrity_error() {
        let err = GuardError::integrity("backup.sql.gz", "checksum mismatch");
        assert!(err.is_integrity());
        assert!(!err.is_policy_violation());
        assert!(err.attempt().is_none());
    }

    #[test]
    fn test_from_io_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let guard_err: GuardError = io_err.into();
        assert!(matches!(guard_err, GuardError::Io(_)));
    }
}
