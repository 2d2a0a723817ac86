//! Schema migrations through an external migration CLI
//!
//! The default commands are `prisma migrate deploy` and `prisma migrate
//! status`. Their textual output is parsed here and nowhere else.

use tracing::{info, warn};

use super::process::ToolCommand;
use super::SchemaApplier;
use crate::config::Settings;
use crate::error::{GuardError, GuardResult};

const APPLYING_MARKER: &str = "Applying migration";
const PENDING_MARKER: &str = "not yet been applied";
const UP_TO_DATE_MARKER: &str = "Database schema is up to date";
const NO_PENDING_MARKER: &str = "No pending migrations";

/// Applies migrations by running configurable deploy/status commands
#[derive(Debug, Clone)]
pub struct CommandSchemaApplier {
    deploy: Vec<String>,
    status: Vec<String>,
    database_url: Option<String>,
}

impl CommandSchemaApplier {
    pub fn new(deploy: Vec<String>, status: Vec<String>, database_url: Option<String>) -> Self {
        Self {
            deploy,
            status,
            database_url,
        }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(
            settings.migrate_deploy_cmd.clone(),
            settings.migrate_status_cmd.clone(),
            settings.database_url.clone(),
        )
    }

    fn command(&self, parts: &[String]) -> GuardResult<ToolCommand> {
        let command = ToolCommand::from_parts(parts)?;
        Ok(match &self.database_url {
            Some(url) => command.env("DATABASE_URL", url),
            None => command,
        })
    }
}

impl SchemaApplier for CommandSchemaApplier {
    fn pending(&self) -> GuardResult<Vec<String>> {
        // `migrate status` exits non-zero when migrations are pending
        let output = self.command(&self.status)?.run()?;

        match parse_pending(&output.combined()) {
            Some(pending) => Ok(pending),
            None if output.success() => {
                warn!(tool = %output.tool, "unrecognized status output, assuming nothing pending");
                Ok(Vec::new())
            }
            None => Err(output.into_error()),
        }
    }

    fn apply(&self) -> GuardResult<Vec<String>> {
        let output = self.command(&self.deploy)?.run()?.ensure_success()?;
        let applied = parse_applied(&output.combined());
        info!(count = applied.len(), "migration tool finished");
        Ok(applied)
    }
}

/// Migration identifiers from deploy output
///
/// Recognizes lines such as ``Applying migration `20240101000000_init` ``.
pub fn parse_applied(output: &str) -> Vec<String> {
    output
        .lines()
        .filter_map(|line| {
            let rest = &line[line.find(APPLYING_MARKER)? + APPLYING_MARKER.len()..];
            let start = rest.find('`')? + 1;
            let len = rest[start..].find('`')?;
            let id = rest[start..start + len].trim();
            (!id.is_empty()).then(|| id.to_string())
        })
        .collect()
}

/// Pending migration identifiers from status output
///
/// Returns `None` when the output is not recognized.
pub fn parse_pending(output: &str) -> Option<Vec<String>> {
    if output.contains(UP_TO_DATE_MARKER) || output.contains(NO_PENDING_MARKER) {
        return Some(Vec::new());
    }

    let mut lines = output.lines().skip_while(|line| !line.contains(PENDING_MARKER));
    lines.next()?;

    Some(
        lines
            .map(str::trim)
            .skip_while(|line| line.is_empty())
            .take_while(|line| !line.is_empty())
            .map(str::to_string)
            .collect(),
    )
}
