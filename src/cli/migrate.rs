//! Migrate CLI command
//!
//! Runs one safe migration attempt and reports how it ended.

use clap::Args;

use crate::config::Settings;
use crate::error::{GuardError, GuardResult};
use crate::migrate::{MigrateOptions, MigrationAttempt, MigrationOutcome, Migrator};

/// Arguments of the `migrate` command
#[derive(Args, Debug, Clone)]
pub struct MigrateArgs {
    /// Report pending migrations without applying them
    #[arg(long)]
    pub dry_run: bool,

    /// Do not snapshot before migrating (production requires --force)
    #[arg(long)]
    pub no_backup: bool,

    /// Override production safeguards
    #[arg(long)]
    pub force: bool,

    /// Target environment (default: APP_ENV, then NODE_ENV)
    #[arg(short, long)]
    pub environment: Option<String>,
}

impl MigrateArgs {
    pub fn options(&self) -> MigrateOptions {
        MigrateOptions {
            create_backup: !self.no_backup,
            dry_run: self.dry_run,
            force: self.force,
        }
    }
}

/// Handle the migrate command
pub fn handle_migrate_command(settings: &Settings, args: &MigrateArgs) -> GuardResult<()> {
    let migrator = Migrator::from_settings(settings);
    run_migrate_command(&migrator, args)
}

/// Run the migrate command against an existing migrator
pub fn run_migrate_command(migrator: &Migrator, args: &MigrateArgs) -> GuardResult<()> {
    println!(
        "Migrating {} environment{}",
        migrator.backups().environment(),
        if args.dry_run { " (dry run)" } else { "" }
    );

    match migrator.migrate(&args.options()) {
        Ok(attempt) => {
            print_attempt(&attempt);
            Ok(())
        }
        Err(e) => {
            if let Some(attempt) = e.attempt() {
                print_attempt(attempt);
            }
            if let GuardError::RollbackFailure { attempt, .. } = &e {
                eprintln!();
                eprintln!("!! ROLLBACK FAILED: the database may be partially migrated.");
                if let Some(snapshot) = &attempt.snapshot {
                    eprintln!("!! Restore manually with: backup restore --file {} --force", snapshot.filename);
                }
            }
            Err(e)
        }
    }
}

fn print_attempt(attempt: &MigrationAttempt) {
    println!("Attempt: {}", attempt.id);

    if attempt.outcome == Some(MigrationOutcome::DryRun) {
        if attempt.pending.is_empty() {
            println!("Database schema is up to date.");
        } else {
            println!("Pending migrations:");
            for id in &attempt.pending {
                println!("  - {}", id);
            }
        }
        return;
    }

    if let Some(snapshot) = &attempt.snapshot {
        println!("Snapshot: {}", snapshot.filename);
    }
    if !attempt.applied.is_empty() {
        println!("Applied migrations:");
        for id in &attempt.applied {
            println!("  - {}", id);
        }
    }
    let states: Vec<String> = attempt.states.iter().map(|s| s.to_string()).collect();
    println!("States: {}", states.join(" -> "));
    println!("Outcome: {}", attempt.outcome_label());
}
