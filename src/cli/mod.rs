//! CLI command handlers
//!
//! This module contains the implementation of the `backup` and `migrate`
//! commands, bridging clap argument parsing with the backup and migration
//! layers.

pub mod backup;
pub mod migrate;

use std::path::PathBuf;

use crate::config::{GuardPaths, Settings};
use crate::error::GuardResult;

pub use backup::{handle_backup_command, BackupCommands};
pub use migrate::{handle_migrate_command, MigrateArgs};

/// Install the stderr log subscriber; `RUST_LOG` overrides the `info` default
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "schema_guard=info,backup=info,migrate=info".into()),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

/// Load settings from the environment, applying command-line overrides
pub fn load_settings(
    backup_dir: Option<PathBuf>,
    environment: Option<&str>,
) -> GuardResult<Settings> {
    let mut settings = Settings::from_env()?;
    if let Some(dir) = backup_dir {
        settings = settings.with_paths(GuardPaths::with_backup_dir(dir));
    }
    if let Some(environment) = environment {
        settings = settings.with_environment(environment);
    }
    Ok(settings)
}
