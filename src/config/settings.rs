//! Settings for schema-guard
//!
//! Settings are read from the process environment (after `.env` has been
//! loaded by the binaries). Only `DATABASE_URL` is mandatory, and only for
//! operations that touch the datastore.

use std::time::Duration;

use super::paths::{GuardPaths, DEFAULT_BACKUP_DIR};
use super::policy::EnvironmentPolicy;
use crate::error::GuardError;

const DEFAULT_PG_DUMP: &str = "pg_dump";
const DEFAULT_PSQL: &str = "psql";
const DEFAULT_DEPLOY_CMD: &str = "npx prisma migrate deploy";
const DEFAULT_STATUS_CMD: &str = "npx prisma migrate status";
const DEFAULT_SYSTEM_CONFIG_TABLE: &str = "system_config";
const DEFAULT_LOCK_TIMEOUT_SECS: u64 = 30;

/// Runtime settings
#[derive(Debug, Clone)]
pub struct Settings {
    /// Datastore connection string
    pub database_url: Option<String>,

    /// Logical environment name (e.g. "production")
    pub environment: String,

    /// Policy derived from the environment name
    pub policy: EnvironmentPolicy,

    /// Artifact directory layout
    pub paths: GuardPaths,

    /// Maximum number of backups to keep
    pub retention_count: usize,

    /// Version recorded in sidecars and the migration marker
    pub tool_version: String,

    /// Dump tool binary
    pub pg_dump_bin: String,

    /// SQL client binary used for restores and queries
    pub psql_bin: String,

    /// Command that applies pending migrations
    pub migrate_deploy_cmd: Vec<String>,

    /// Command that reports pending migrations
    pub migrate_status_cmd: Vec<String>,

    /// Core tables queried during smoke verification
    pub smoke_tables: Vec<String>,

    /// Table holding system configuration entries
    pub system_config_table: String,

    /// How long to wait for the operation lock
    pub lock_timeout: Duration,

    /// Whether `MAX_BACKUPS` was set explicitly
    retention_explicit: bool,
}

impl Settings {
    /// Load settings from the process environment
    pub fn from_env() -> Result<Self, GuardError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load settings from an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, GuardError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let environment = get("APP_ENV")
            .or_else(|| get("NODE_ENV"))
            .unwrap_or_else(|| "development".to_string());
        let policy = EnvironmentPolicy::classify(&environment);

        let backup_dir = get("BACKUP_DIR").unwrap_or_else(|| DEFAULT_BACKUP_DIR.to_string());

        let (retention_count, retention_explicit) = match get("MAX_BACKUPS") {
            Some(raw) => (parse_retention(&raw)?, true),
            None => (policy.default_retention(), false),
        };

        let lock_timeout = match get("LOCK_TIMEOUT_SECS") {
            Some(raw) => Duration::from_secs(raw.trim().parse().map_err(|_| {
                GuardError::Config(format!("LOCK_TIMEOUT_SECS must be a number, got '{}'", raw))
            })?),
            None => Duration::from_secs(DEFAULT_LOCK_TIMEOUT_SECS),
        };

        Ok(Self {
            database_url: get("DATABASE_URL"),
            environment: environment.trim().to_string(),
            policy,
            paths: GuardPaths::with_backup_dir(backup_dir.into()),
            retention_count,
            tool_version: env!("CARGO_PKG_VERSION").to_string(),
            pg_dump_bin: get("PG_DUMP_BIN").unwrap_or_else(|| DEFAULT_PG_DUMP.to_string()),
            psql_bin: get("PSQL_BIN").unwrap_or_else(|| DEFAULT_PSQL.to_string()),
            migrate_deploy_cmd: split_command(
                &get("MIGRATE_DEPLOY_CMD").unwrap_or_else(|| DEFAULT_DEPLOY_CMD.to_string()),
            )?,
            migrate_status_cmd: split_command(
                &get("MIGRATE_STATUS_CMD").unwrap_or_else(|| DEFAULT_STATUS_CMD.to_string()),
            )?,
            smoke_tables: get("SMOKE_TABLES")
                .map(|raw| {
                    raw.split(',')
                        .map(|t| t.trim().to_string())
                        .filter(|t| !t.is_empty())
                        .collect()
                })
                .unwrap_or_default(),
            system_config_table: get("SYSTEM_CONFIG_TABLE")
                .unwrap_or_else(|| DEFAULT_SYSTEM_CONFIG_TABLE.to_string()),
            lock_timeout,
            retention_explicit,
        })
    }

    /// Override the environment (and the policy derived from it)
    ///
    /// The retention default follows the new policy unless `MAX_BACKUPS`
    /// was set explicitly.
    pub fn with_environment(mut self, environment: &str) -> Self {
        self.environment = environment.trim().to_string();
        self.policy = EnvironmentPolicy::classify(environment);
        if !self.retention_explicit {
            self.retention_count = self.policy.default_retention();
        }
        self
    }

    /// Replace the artifact directory layout
    pub fn with_paths(mut self, paths: GuardPaths) -> Self {
        self.paths = paths;
        self
    }

    /// Set the retention count explicitly
    pub fn with_retention(mut self, retention_count: usize) -> Self {
        self.retention_count = retention_count;
        self.retention_explicit = true;
        self
    }

    /// The connection string, or a configuration error if it is missing
    pub fn require_database_url(&self) -> Result<&str, GuardError> {
        self.database_url
            .as_deref()
            .filter(|url| !url.trim().is_empty())
            .ok_or_else(|| GuardError::Config("DATABASE_URL is not set".into()))
    }
}

fn parse_retention(raw: &str) -> Result<usize, GuardError> {
    let count: usize = raw.trim().parse().map_err(|_| {
        GuardError::Config(format!("MAX_BACKUPS must be a positive integer, got '{}'", raw))
    })?;
    if count == 0 {
        return Err(GuardError::Config("MAX_BACKUPS must be at least 1".into()));
    }
    Ok(count)
}

fn split_command(raw: &str) -> Result<Vec<String>, GuardError> {
    let parts: Vec<String> = raw.split_whitespace().map(str::to_string).collect();
    if parts.is_empty() {
        return Err(GuardError::Config(format!("Empty command: '{}'", raw)));
    }
    Ok(parts)
}
