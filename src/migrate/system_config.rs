//! System configuration entries written by `migrate`

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::state::MigrationAttempt;

/// A key/value row in the system-config table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemConfigEntry {
    pub key: String,
    pub value: serde_json::Value,
}

impl SystemConfigEntry {
    /// Key of the marker recording the last committed migration
    pub const LAST_MIGRATION: &'static str = "LAST_MIGRATION";

    pub fn new(key: impl Into<String>, value: serde_json::Value) -> Self {
        Self {
            key: key.into(),
            value,
        }
    }

    /// The `LAST_MIGRATION` marker for a committed attempt
    pub fn last_migration(attempt: &MigrationAttempt, tool_version: &str) -> Self {
        Self::new(
            Self::LAST_MIGRATION,
            json!({
                "timestamp": Utc::now().to_rfc3339(),
                "version": tool_version,
                "environment": attempt.environment,
                "attemptId": attempt.id.to_string(),
                "appliedMigrations": attempt.applied,
            }),
        )
    }
}
