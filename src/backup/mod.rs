//! Backup system for schema-guard
//!
//! Creates, lists, validates and restores database dumps.
//!
//! # Architecture
//!
//! - `BackupManager`: creates backups, enforces retention, restores
//! - `archive`: gzip and checksum helpers for artifacts on disk
//! - `record`: the `BackupRecord` model and its JSON sidecar form
//!
//! # Artifact layout
//!
//! Every backup is a pair of files in the backup directory:
//! - `backup-<env>-<timestamp>.sql[.gz]`: the dump itself
//! - `backup-<env>-<timestamp>.sql[.gz].json`: sidecar metadata
//!
//! The sidecar is written last and atomically. An artifact without a
//! readable sidecar is listed as unknown and is not restorable without
//! skipping validation.
//!
//! # Example
//!
//! ```rust,ignore
//! use schema_guard::backup::{BackupManager, CreateOptions, RestoreOptions};
//! use schema_guard::config::Settings;
//!
//! let settings = Settings::from_env()?;
//! let manager = BackupManager::from_settings(&settings);
//!
//! let record = manager.create_backup(&CreateOptions::default())?;
//!
//! // Later, restore from backup
//! let outcome = manager.restore_backup(&record, RestoreOptions::default())?;
//! println!("{}", outcome.summary());
//! ```

pub mod archive;
mod manager;
mod record;
mod restore;

pub use manager::{BackupManager, CreateOptions};
pub use record::{redact_database_url, BackupEntry, BackupMetadata, BackupRecord, BackupScope};
pub(crate) use restore::SnapshotMode;
pub use restore::{RestoreOptions, RestoreOutcome, ValidationReport};
