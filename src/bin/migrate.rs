use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;

use schema_guard::cli::{handle_migrate_command, init_tracing, load_settings, MigrateArgs};

#[derive(Parser)]
#[command(
    name = "migrate",
    author = "Kaylee Beyene",
    version,
    about = "Apply pending schema migrations with a verified snapshot and automatic rollback"
)]
struct Cli {
    /// Directory holding backup artifacts
    #[arg(long, env = "BACKUP_DIR")]
    backup_dir: Option<PathBuf>,

    #[command(flatten)]
    args: MigrateArgs,
}

fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_tracing();

    let settings = load_settings(cli.backup_dir, cli.args.environment.as_deref())?;
    handle_migrate_command(&settings, &cli.args)?;

    Ok(())
}
