//! schema-guard - checksummed database backups and safe schema migrations
//!
//! This library provides the migration-and-backup safety layer for a
//! PostgreSQL-backed application: verified backups before schema changes,
//! smoke-tested migrations, and automatic restore when a migration fails.
//!
//! # Architecture
//!
//! The crate is organized into the following modules:
//!
//! - `config`: Settings, environment policy and artifact paths
//! - `error`: Custom error types
//! - `tools`: `pg_dump`, `psql` and migration tool capabilities
//! - `backup`: Backup creation, retention, validation and restore
//! - `migrate`: The migration state machine with rollback
//! - `audit`: Audit logging system
//! - `lock`: Advisory lock serializing `migrate` and `restore`
//! - `storage`: Atomic JSON file helpers
//! - `cli`: Command handlers for the `backup` and `migrate` binaries
//!
//! # Example
//!
//! ```rust,ignore
//! use schema_guard::config::Settings;
//! use schema_guard::migrate::{MigrateOptions, Migrator};
//!
//! let settings = Settings::from_env()?;
//! let attempt = Migrator::from_settings(&settings).migrate(&MigrateOptions::default())?;
//! println!("{}", attempt.outcome_label());
//! ```

pub mod audit;
pub mod backup;
pub mod cli;
pub mod config;
pub mod error;
pub mod lock;
pub mod migrate;
pub mod storage;
pub mod tools;

pub use error::{GuardError, GuardResult};
