//! Backup CLI commands
//!
//! Implements the `backup` subcommands: create, restore, list, validate,
//! cleanup, delete and history.

use clap::Subcommand;

use crate::backup::{BackupEntry, BackupManager, CreateOptions, RestoreOptions};
use crate::config::Settings;
use crate::error::{GuardError, GuardResult};

/// Backup subcommands
#[derive(Subcommand, Debug)]
pub enum BackupCommands {
    /// Create a new backup
    Create {
        /// Store the dump uncompressed
        #[arg(long)]
        no_compress: bool,

        /// Dump table definitions only
        #[arg(long, conflicts_with = "data_only")]
        schema_only: bool,

        /// Dump rows only
        #[arg(long)]
        data_only: bool,

        /// Artifact name instead of the timestamped default
        #[arg(short, long)]
        name: Option<String>,
    },

    /// Restore the database from a backup
    Restore {
        /// Backup filename or path (use 'latest' for most recent)
        #[arg(short, long)]
        file: String,

        /// Required to restore in production
        #[arg(long)]
        force: bool,

        /// Skip size and checksum verification
        #[arg(long)]
        skip_validation: bool,
    },

    /// List all available backups
    List {
        /// Show detailed information
        #[arg(short, long)]
        verbose: bool,
    },

    /// Verify a backup's size and checksum against its metadata
    Validate {
        /// Backup filename or path
        #[arg(short, long)]
        file: String,
    },

    /// Delete old backups according to the retention policy
    Cleanup {
        /// Number of backups to keep (default: MAX_BACKUPS)
        #[arg(short, long, value_parser = clap::value_parser!(u64).range(1..))]
        keep: Option<u64>,
    },

    /// Delete a single backup
    Delete {
        /// Backup filename or path
        #[arg(short, long)]
        file: String,

        /// Skip confirmation
        #[arg(long)]
        force: bool,
    },

    /// Show recent entries from the audit log
    History {
        /// Number of entries to show
        #[arg(short, long, default_value = "20")]
        limit: usize,
    },
}

/// Handle a backup command
pub fn handle_backup_command(settings: &Settings, cmd: BackupCommands) -> GuardResult<()> {
    let manager = BackupManager::from_settings(settings);
    run_backup_command(&manager, cmd)
}

/// Run a backup command against an existing manager
pub fn run_backup_command(manager: &BackupManager, cmd: BackupCommands) -> GuardResult<()> {
    match cmd {
        BackupCommands::Create {
            no_compress,
            schema_only,
            data_only,
            name,
        } => {
            let _lock = manager.lock("create")?;
            println!("Creating backup...");
            let record = manager.create_backup(&CreateOptions {
                compress: !no_compress,
                include_schema: !data_only,
                include_data: !schema_only,
                custom_name: name,
            })?;
            println!("Backup created: {}", record.filename);
            println!("Location: {}", record.path.display());
            println!("Size: {}", format_size(record.size_bytes));
            println!("Checksum: {}", record.checksum);
        }

        BackupCommands::Restore {
            file,
            force,
            skip_validation,
        } => {
            let entry = manager.find_backup(&file)?;
            let record = manager.record_for_restore(entry, skip_validation)?;

            println!("Backup Information");
            println!("==================");
            println!("File: {}", record.path.display());
            println!(
                "Created: {}",
                record.created_at.format("%Y-%m-%d %H:%M:%S UTC")
            );
            println!("Environment: {}", record.environment);
            println!("Scope: {}", record.scope);
            println!();

            println!("Restoring from backup...");
            let outcome = manager.restore_backup(
                &record,
                RestoreOptions {
                    force,
                    skip_validation,
                },
            )?;

            println!("Restore complete!");
            println!("{}", outcome.summary());
        }

        BackupCommands::List { verbose } => {
            let backups = manager.list_backups()?;

            if backups.is_empty() {
                println!("No backups found in {}.", manager.backup_dir().display());
                println!("Create one with: backup create");
                return Ok(());
            }

            println!("Available Backups");
            println!("=================");
            println!();

            for (i, backup) in backups.iter().enumerate() {
                let age = chrono::Utc::now().signed_duration_since(backup.created_at());
                let age_str = format_duration(age);

                match backup {
                    BackupEntry::Valid(record) if verbose => {
                        println!(
                            "{}. {}\n   Created: {}\n   Size: {}\n   Age: {}\n   Environment: {}\n   Scope: {}\n   Compressed: {}\n   Checksum: {}\n   Source: {}\n",
                            i + 1,
                            record.filename,
                            record.created_at.format("%Y-%m-%d %H:%M:%S UTC"),
                            format_size(record.size_bytes),
                            age_str,
                            record.environment,
                            record.scope,
                            if record.compressed { "yes" } else { "no" },
                            record.checksum,
                            record.sanitized_source,
                        );
                    }
                    BackupEntry::Valid(record) => {
                        println!(
                            "  {}. {} ({} ago, {}, {})",
                            i + 1,
                            record.filename,
                            age_str,
                            format_size(record.size_bytes),
                            record.environment,
                        );
                    }
                    BackupEntry::Unknown { reason, .. } => {
                        println!(
                            "  {}. {} ({} ago, {}) [unknown: {}]",
                            i + 1,
                            backup.filename(),
                            age_str,
                            format_size(backup.size_bytes()),
                            reason,
                        );
                    }
                }
            }

            let unknown = backups.iter().filter(|b| !b.is_valid()).count();
            println!();
            if unknown > 0 {
                println!(
                    "Total: {} backup(s), {} without usable metadata",
                    backups.len(),
                    unknown
                );
            } else {
                println!("Total: {} backup(s)", backups.len());
            }
        }

        BackupCommands::Validate { file } => {
            let record = match manager.find_backup(&file)? {
                BackupEntry::Valid(record) => record,
                BackupEntry::Unknown {
                    filename, reason, ..
                } => return Err(GuardError::integrity(filename, reason)),
            };

            let report = manager.validate_backup(&record)?;

            println!("Backup Validation");
            println!("=================");
            println!("File: {}", record.path.display());
            println!(
                "Size: {} (expected {}) {}",
                report.actual_size,
                report.expected_size,
                status_label(report.size_ok())
            );
            println!(
                "Checksum: {} {}",
                report.actual_checksum,
                status_label(report.checksum_ok())
            );
            println!();

            report.into_result()?;
            println!("Status: Valid");
        }

        BackupCommands::Cleanup { keep } => {
            let keep = keep.map_or(manager.retention_count(), |k| k as usize);
            let _lock = manager.lock("cleanup")?;
            let deleted = manager.cleanup_old_backups(keep)?;

            if deleted.is_empty() {
                println!("No backups to clean up (keeping {}).", keep);
            } else {
                for path in &deleted {
                    println!("  Deleted {}", path.display());
                }
                println!("Deleted {} backup(s), kept the newest {}.", deleted.len(), keep);
            }
        }

        BackupCommands::Delete { file, force } => {
            let entry = manager.find_backup(&file)?;

            if !force {
                println!("This will permanently delete {}", entry.path().display());
                println!("To proceed, run again with --force flag:");
                println!("  backup delete --file {} --force", file);
                return Ok(());
            }

            let _lock = manager.lock("delete")?;
            manager.delete_backup(&entry)?;
            println!("Deleted {}", entry.filename());
        }

        BackupCommands::History { limit } => {
            let entries = manager.audit().read_recent(limit)?;

            if entries.is_empty() {
                println!("No audit entries in {}.", manager.audit().path().display());
                return Ok(());
            }

            for entry in entries {
                println!("{}", entry.format_human_readable());
            }
        }
    }

    Ok(())
}

fn status_label(ok: bool) -> &'static str {
    if ok {
        "[ok]"
    } else {
        "[MISMATCH]"
    }
}

/// Format a duration in human-readable form
fn format_duration(duration: chrono::Duration) -> String {
    let total_seconds = duration.num_seconds().max(0);

    if total_seconds < 60 {
        return format!("{}s", total_seconds);
    }

    let minutes = total_seconds / 60;
    if minutes < 60 {
        return format!("{}m", minutes);
    }

    let hours = minutes / 60;
    if hours < 24 {
        return format!("{}h", hours);
    }

    format!("{}d", hours / 24)
}

/// Format a file size in human-readable form
fn format_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.1} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::fake::{test_settings, FakeDatabase};
    use tempfile::TempDir;

    #[test]
    fn test_format_size() {
        assert_eq!(format_size(512), "512 B");
        assert_eq!(format_size(2048), "2.0 KB");
        assert_eq!(format_size(5 * 1024 * 1024), "5.0 MB");
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(chrono::Duration::seconds(42)), "42s");
        assert_eq!(format_duration(chrono::Duration::minutes(90)), "1h");
        assert_eq!(format_duration(chrono::Duration::days(3)), "3d");
        assert_eq!(format_duration(chrono::Duration::seconds(-5)), "0s");
    }

    #[test]
    fn test_create_then_validate_and_delete() {
        let temp = TempDir::new().unwrap();
        let db = FakeDatabase::new(b"CREATE TABLE t (id int);\n");
        let manager = BackupManager::new(&test_settings(temp.path(), "development"), db.tools());

        run_backup_command(
            &manager,
            BackupCommands::Create {
                no_compress: false,
                schema_only: true,
                data_only: false,
                name: Some("cli".into()),
            },
        )
        .unwrap();

        let record = manager.get_latest_backup().unwrap().unwrap();
        assert!(!record.scope.includes_data());

        run_backup_command(&manager, BackupCommands::Validate { file: "cli".into() }).unwrap();

        // Without --force nothing is deleted
        run_backup_command(
            &manager,
            BackupCommands::Delete {
                file: "cli".into(),
                force: false,
            },
        )
        .unwrap();
        assert!(record.path.exists());

        run_backup_command(
            &manager,
            BackupCommands::Delete {
                file: "cli".into(),
                force: true,
            },
        )
        .unwrap();
        assert!(!record.path.exists());
    }

    #[test]
    fn test_mutating_commands_wait_for_lock() {
        let temp = TempDir::new().unwrap();
        let db = FakeDatabase::new(b"CREATE TABLE t (id int);\n");
        let manager = BackupManager::new(&test_settings(temp.path(), "development"), db.tools());
        let record = manager.create_backup(&CreateOptions::default()).unwrap();

        let held = manager.lock("migrate").unwrap();

        let err = run_backup_command(&manager, BackupCommands::Cleanup { keep: Some(1) })
            .unwrap_err();
        assert!(matches!(err, GuardError::Locked(_)));

        let err = run_backup_command(
            &manager,
            BackupCommands::Delete {
                file: record.filename.clone(),
                force: true,
            },
        )
        .unwrap_err();
        assert!(matches!(err, GuardError::Locked(_)));
        assert!(record.path.exists());

        let err = run_backup_command(
            &manager,
            BackupCommands::Create {
                no_compress: false,
                schema_only: false,
                data_only: false,
                name: None,
            },
        )
        .unwrap_err();
        assert!(matches!(err, GuardError::Locked(_)));
        assert_eq!(db.state().dumps, 1);

        drop(held);
        run_backup_command(
            &manager,
            BackupCommands::Delete {
                file: record.filename.clone(),
                force: true,
            },
        )
        .unwrap();
        assert!(!record.path.exists());
    }

    #[test]
    fn test_list_shows_unknown_entries() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join("manual.sql"), b"SELECT 1;").unwrap();
        let db = FakeDatabase::new(b"CREATE TABLE t (id int);\n");
        let manager = BackupManager::new(&test_settings(temp.path(), "development"), db.tools());
        manager.create_backup(&CreateOptions::default()).unwrap();

        let backups = manager.list_backups().unwrap();
        let unknown = backups.iter().find(|b| !b.is_valid()).unwrap();
        assert_eq!(unknown.size_bytes(), 9);

        run_backup_command(&manager, BackupCommands::List { verbose: false }).unwrap();
        run_backup_command(&manager, BackupCommands::List { verbose: true }).unwrap();
    }

    #[test]
    fn test_validate_unknown_entry_fails() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join("manual.sql"), b"SELECT 1;").unwrap();
        let db = FakeDatabase::new(b"x");
        let manager = BackupManager::new(&test_settings(temp.path(), "development"), db.tools());

        let err =
            run_backup_command(&manager, BackupCommands::Validate { file: "manual.sql".into() })
                .unwrap_err();
        assert!(err.is_integrity());
    }
}
