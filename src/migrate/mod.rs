//! Safe schema migration
//!
//! A `Migrator` drives one `MigrationAttempt` through
//! `IDLE → VALIDATING → (SNAPSHOTTING) → APPLYING → VERIFYING → COMMITTED`,
//! restoring the pre-migration snapshot when applying or verifying fails.

mod migrator;
mod state;
mod system_config;

pub use migrator::{MigrateOptions, Migrator};
pub use state::{MigrationAttempt, MigrationOutcome, MigrationState};
pub use system_config::SystemConfigEntry;
