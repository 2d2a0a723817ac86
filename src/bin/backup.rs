use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;

use schema_guard::cli::{handle_backup_command, init_tracing, load_settings, BackupCommands};

#[derive(Parser)]
#[command(
    name = "backup",
    author = "Kaylee Beyene",
    version,
    about = "Create, verify and restore checksummed database backups",
    long_about = "Creates gzip-compressed, SHA-256 checksummed dumps of the database \
                  with JSON metadata, keeps the newest MAX_BACKUPS of them, and \
                  restores them after verifying their integrity."
)]
struct Cli {
    /// Directory holding backup artifacts
    #[arg(long, env = "BACKUP_DIR", global = true)]
    backup_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: BackupCommands,
}

fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_tracing();

    let settings = load_settings(cli.backup_dir, None)?;
    handle_backup_command(&settings, cli.command)?;

    Ok(())
}
