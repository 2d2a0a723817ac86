//! PostgreSQL tools: `pg_dump` for dumps, `psql` for restores and queries

use std::fs;
use std::path::Path;

use percent_encoding::percent_decode_str;
use tracing::{debug, info};
use url::Url;

use super::process::ToolCommand;
use super::{Datastore, DumpOutput, Dumper, Restorer, SmokeCheck};
use crate::backup::BackupScope;
use crate::config::Settings;
use crate::error::{GuardError, GuardResult};
use crate::migrate::SystemConfigEntry;

/// A connection string with the password moved out of it
///
/// The URL goes on the command line; the password goes in `PGPASSWORD`,
/// which other local users cannot read from the process table.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Connection {
    url: String,
    password: Option<String>,
}

impl Connection {
    fn parse(raw: &str) -> GuardResult<Self> {
        let mut url = Url::parse(raw).map_err(|e| {
            GuardError::Config(format!("DATABASE_URL is not a valid connection URL: {}", e))
        })?;

        let password = url
            .password()
            .map(|encoded| percent_decode_str(encoded).decode_utf8_lossy().into_owned());
        if password.is_some() && url.set_password(None).is_err() {
            return Err(GuardError::Config(
                "DATABASE_URL credentials cannot be separated from the host".into(),
            ));
        }

        Ok(Self {
            url: url.to_string(),
            password,
        })
    }

    /// Start a command for `bin` connected to this database
    fn command(&self, bin: &str) -> ToolCommand {
        let command = ToolCommand::new(bin).arg(format!("--dbname={}", self.url));
        match &self.password {
            Some(password) => command.env("PGPASSWORD", password.as_str()),
            None => command,
        }
    }
}

fn connect(url: &Option<String>) -> GuardResult<Connection> {
    let raw = url
        .as_deref()
        .ok_or_else(|| GuardError::Config("DATABASE_URL is not set".into()))?;
    Connection::parse(raw)
}

/// Dumps through `pg_dump`
#[derive(Debug, Clone)]
pub struct PgDump {
    bin: String,
    database_url: Option<String>,
}

impl PgDump {
    pub fn new(bin: impl Into<String>, database_url: Option<String>) -> Self {
        Self {
            bin: bin.into(),
            database_url,
        }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(settings.pg_dump_bin.clone(), settings.database_url.clone())
    }

    fn command(&self, scope: BackupScope, destination: &Path) -> GuardResult<ToolCommand> {
        let command = connect(&self.database_url)?
            .command(&self.bin)
            .args(["--no-owner", "--no-privileges", "--format=plain"])
            .arg(format!("--file={}", destination.display()));

        // Full dumps drop objects first so they can be replayed over a live schema
        Ok(match scope {
            BackupScope::SchemaAndData => command.args(["--clean", "--if-exists"]),
            BackupScope::SchemaOnly => command.args(["--schema-only", "--clean", "--if-exists"]),
            BackupScope::DataOnly => command.arg("--data-only"),
        })
    }
}

impl Dumper for PgDump {
    fn dump(&self, scope: BackupScope, destination: &Path) -> GuardResult<DumpOutput> {
        info!(%scope, destination = %destination.display(), "dumping database");
        self.command(scope, destination)?.run()?.ensure_success()?;

        let bytes_written = fs::metadata(destination)
            .map(|m| m.len())
            .map_err(|e| GuardError::Io(format!("pg_dump produced no file: {}", e)))?;
        Ok(DumpOutput { bytes_written })
    }
}

/// Restores and queries through `psql`
#[derive(Debug, Clone)]
pub struct Psql {
    bin: String,
    database_url: Option<String>,
    smoke_tables: Vec<String>,
    system_config_table: String,
}

impl Psql {
    pub fn new(bin: impl Into<String>, database_url: Option<String>) -> Self {
        Self {
            bin: bin.into(),
            database_url,
            smoke_tables: Vec::new(),
            system_config_table: "system_config".into(),
        }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            bin: settings.psql_bin.clone(),
            database_url: settings.database_url.clone(),
            smoke_tables: settings.smoke_tables.clone(),
            system_config_table: settings.system_config_table.clone(),
        }
    }

    fn base_command(&self) -> GuardResult<ToolCommand> {
        Ok(connect(&self.database_url)?
            .command(&self.bin)
            .args(["--no-psqlrc", "--quiet", "--set=ON_ERROR_STOP=1"]))
    }

    /// Run one statement and return its unaligned, tuples-only output
    fn query(&self, sql: &str) -> GuardResult<String> {
        debug!(sql, "psql query");
        let output = self
            .base_command()?
            .args(["--tuples-only", "--no-align", "--command"])
            .arg(sql)
            .run()?
            .ensure_success()?;
        Ok(output.stdout.trim().to_string())
    }

    fn count(&self, sql: &str) -> GuardResult<u64> {
        let raw = self.query(sql)?;
        raw.parse()
            .map_err(|_| GuardError::Verification(format!("Expected a row count, got '{}'", raw)))
    }
}

impl Restorer for Psql {
    fn restore(&self, source: &Path) -> GuardResult<()> {
        info!(source = %source.display(), "restoring database");
        self.base_command()?
            .arg("--single-transaction")
            .arg(format!("--file={}", source.display()))
            .run()?
            .ensure_success()?;
        Ok(())
    }
}

impl Datastore for Psql {
    fn probe(&self) -> GuardResult<()> {
        match self.query("SELECT 1") {
            Ok(out) if out == "1" => Ok(()),
            Ok(out) => Err(GuardError::Connectivity(format!(
                "Unexpected probe response '{}'",
                out
            ))),
            Err(GuardError::ToolExecution { stderr, .. }) => Err(GuardError::Connectivity(stderr)),
            Err(e) => Err(e),
        }
    }

    fn smoke_check(&self) -> GuardResult<Vec<SmokeCheck>> {
        let mut checks = Vec::with_capacity(self.smoke_tables.len() + 1);

        let schema_tables = self
            .count(
                "SELECT count(*) FROM information_schema.tables \
                 WHERE table_schema NOT IN ('pg_catalog', 'information_schema')",
            )
            .map_err(as_verification)?;
        if schema_tables == 0 {
            return Err(GuardError::Verification(
                "No user tables found after migration".into(),
            ));
        }
        checks.push(SmokeCheck {
            target: "information_schema.tables".into(),
            row_count: schema_tables,
        });

        for table in &self.smoke_tables {
            let row_count = self
                .count(&format!("SELECT count(*) FROM {}", quote_ident(table)))
                .map_err(as_verification)?;
            checks.push(SmokeCheck {
                target: table.clone(),
                row_count,
            });
        }

        Ok(checks)
    }

    fn upsert_system_config(&self, entry: &SystemConfigEntry) -> GuardResult<()> {
        let value = serde_json::to_string(&entry.value)?;
        let sql = format!(
            "INSERT INTO {table} (\"key\", \"value\") VALUES ({key}, {value}::jsonb) \
             ON CONFLICT (\"key\") DO UPDATE SET \"value\" = EXCLUDED.\"value\"",
            table = quote_ident(&self.system_config_table),
            key = quote_literal(&entry.key),
            value = quote_literal(&value),
        );
        self.query(&sql)?;
        Ok(())
    }
}

fn as_verification(err: GuardError) -> GuardError {
    match err {
        GuardError::ToolExecution { stderr, .. } => GuardError::Verification(stderr),
        other => other,
    }
}

/// Quote a possibly schema-qualified identifier
fn quote_ident(name: &str) -> String {
    name.split('.')
        .map(|part| format!("\"{}\"", part.replace('"', "\"\"")))
        .collect::<Vec<_>>()
        .join(".")
}

fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}
