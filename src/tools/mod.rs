//! External tool capabilities
//!
//! The backup and migration workflows never talk to a database directly.
//! They go through four capabilities, each returning typed results:
//!
//! - `Dumper`: writes a dump of the datastore to a file
//! - `Restorer`: replays a dump file into the datastore
//! - `SchemaApplier`: reports and applies pending schema migrations
//! - `Datastore`: connectivity probe, smoke queries, system config writes
//!
//! `postgres` implements the first, second and fourth on top of `pg_dump`
//! and `psql`; `migration_tool` implements `SchemaApplier` on top of a
//! migration CLI such as `prisma migrate`.

pub mod migration_tool;
pub mod postgres;
pub mod process;

#[cfg(test)]
pub(crate) mod fake;

use std::path::Path;

use crate::backup::BackupScope;
use crate::config::Settings;
use crate::error::GuardResult;
use crate::migrate::SystemConfigEntry;

pub use migration_tool::CommandSchemaApplier;
pub use postgres::{PgDump, Psql};

/// Result of a dump
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DumpOutput {
    /// Bytes written to the destination file
    pub bytes_written: u64,
}

/// Result of one smoke query
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SmokeCheck {
    /// What was queried
    pub target: String,
    /// Row count returned
    pub row_count: u64,
}

/// Produces dumps of the datastore
pub trait Dumper {
    /// Dump the datastore into `destination`, overwriting it
    fn dump(&self, scope: BackupScope, destination: &Path) -> GuardResult<DumpOutput>;
}

/// Replays dumps into the datastore
pub trait Restorer {
    /// Apply the uncompressed dump at `source`
    fn restore(&self, source: &Path) -> GuardResult<()>;
}

/// Applies schema migrations
pub trait SchemaApplier {
    /// Identifiers of migrations not yet applied
    fn pending(&self) -> GuardResult<Vec<String>>;

    /// Apply all pending migrations, returning the identifiers applied
    fn apply(&self) -> GuardResult<Vec<String>>;
}

/// Direct queries against the datastore
pub trait Datastore {
    /// Trivial round-trip query; fails with a connectivity error
    fn probe(&self) -> GuardResult<()>;

    /// Run the fixed set of post-migration smoke queries
    fn smoke_check(&self) -> GuardResult<Vec<SmokeCheck>>;

    /// Insert or replace a system configuration entry
    fn upsert_system_config(&self, entry: &SystemConfigEntry) -> GuardResult<()>;
}

/// The capabilities a `BackupManager` needs
pub struct BackupTools {
    pub datastore: Box<dyn Datastore>,
    pub dumper: Box<dyn Dumper>,
    pub restorer: Box<dyn Restorer>,
}

impl BackupTools {
    /// `pg_dump` + `psql` backed tools for the configured database
    pub fn postgres(settings: &Settings) -> Self {
        let psql = Psql::from_settings(settings);
        Self {
            datastore: Box::new(psql.clone()),
            dumper: Box::new(PgDump::from_settings(settings)),
            restorer: Box::new(psql),
        }
    }
}
