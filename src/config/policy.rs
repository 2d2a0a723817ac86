//! Environment policies
//!
//! Production and non-production deployments differ in how cautious the
//! backup and migration workflows are. All of those differences live here.

use serde::{Deserialize, Serialize};

/// Behavior switches for the environment a command runs in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnvironmentPolicy {
    /// Data is irreplaceable: snapshot before migrating, gate restores
    Production,
    /// Data is disposable: favor speed
    Development,
}

impl EnvironmentPolicy {
    /// Classify an environment name such as `production` or `development`
    pub fn classify(environment: &str) -> Self {
        match environment.trim().to_ascii_lowercase().as_str() {
            "production" | "prod" => Self::Production,
            _ => Self::Development,
        }
    }

    /// Whether this is the production policy
    pub fn is_production(&self) -> bool {
        matches!(self, Self::Production)
    }

    /// Whether `migrate` takes a snapshot before applying migrations
    pub fn snapshots_before_migration(&self) -> bool {
        self.is_production()
    }

    /// Whether skipping the pre-migration snapshot needs `--force`
    pub fn snapshot_skip_requires_force(&self) -> bool {
        self.is_production()
    }

    /// Whether a restore must be explicitly forced
    pub fn restore_requires_force(&self) -> bool {
        self.is_production()
    }

    /// Whether a restore first snapshots the current state
    pub fn snapshots_before_restore(&self) -> bool {
        self.is_production()
    }

    /// Whether the artifact directory must be usable before migrating
    pub fn requires_backup_dir(&self) -> bool {
        self.is_production()
    }

    /// Number of backups kept when `MAX_BACKUPS` is not set
    pub fn default_retention(&self) -> usize {
        match self {
            Self::Production => 30,
            Self::Development => 10,
        }
    }
}

impl std::fmt::Display for EnvironmentPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Production => write!(f, "production"),
            Self::Development => write!(f, "development"),
        }
    }
}
