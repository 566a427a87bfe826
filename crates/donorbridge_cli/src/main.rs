//! Donorbridge CLI - operator tools for the donation sync engine.

mod commands;
mod config;
mod progress;
mod shutdown;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use console::Term;
use donorbridge::source::DonationId;
use tracing_subscriber::EnvFilter;

use crate::commands::log::StatusFilter;
use crate::commands::shared::{Context, OutputFormat};

#[derive(Parser)]
#[command(name = "donorbridge")]
#[command(version)]
#[command(about = "Sync donations from a donation platform into DonorPerfect")]
#[command(
    long_about = "Donorbridge delivers donations from a donation-platform export to the \
DonorPerfect CRM. It matches donors by email, opens one pledge per recurring \
subscription, and keeps a local sync log so every donation is delivered once."
)]
#[command(after_long_help = r#"EXAMPLES
    Check the API key and the configured codes:
        $ donorbridge check connection
        $ donorbridge check codes

    See what the next backfill would do without sending anything:
        $ donorbridge backfill --dry-run

    Backfill every unsynced donation (Ctrl+C stops after the current donation):
        $ donorbridge backfill

    Retry one donation:
        $ donorbridge sync 1042

    Export the log, then clear it:
        $ donorbridge log clear --export sync-log.csv --yes

CONFIGURATION
    Donorbridge reads configuration from:
      1. ~/.config/donorbridge/config.toml (or $XDG_CONFIG_HOME/donorbridge/config.toml)
      2. ./donorbridge.toml
      3. Environment variables (DONORBRIDGE_* prefix)
      4. .env file in current directory

ENVIRONMENT VARIABLES
    DONORBRIDGE_DATABASE_URL   Database connection string (default: ~/.local/state/donorbridge/donorbridge.db)
    DONORBRIDGE_API_KEY        DonorPerfect API key
    DONORBRIDGE_SOURCE_PATH    JSON export of the donation platform
    DONORBRIDGE_SYNC__ENABLED  Turn real-time sync on or off
"#)]
struct Cli {
    /// JSON export to read donations from (overrides [source] path)
    #[arg(short, long, global = true)]
    source: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run database migrations
    Migrate {
        #[command(subcommand)]
        action: MigrateAction,
    },
    /// Sync a single donation
    Sync {
        /// Source donation id
        donation_id: DonationId,

        /// Only sync when real-time sync is enabled, like a payment hook would
        #[arg(long)]
        realtime: bool,

        /// Output format
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Table)]
        output: OutputFormat,
    },
    /// Sync every unsynced donation, batch after batch
    Backfill {
        /// Donations per batch (default 5, or 50 with --dry-run)
        #[arg(short, long)]
        batch_size: Option<u64>,

        /// Dry run - show what the next batch would do without sending anything
        #[arg(short = 'n', long)]
        dry_run: bool,

        /// Output format
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Table)]
        output: OutputFormat,
    },
    /// Inspect, export or clear the sync log
    Log {
        #[command(subcommand)]
        action: LogAction,
    },
    /// Show sync counters
    Stats {
        /// Output format
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Table)]
        output: OutputFormat,
    },
    /// Compare source donors with DonorPerfect donors (read-only)
    Report {
        /// Output format
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Table)]
        output: OutputFormat,
    },
    /// Check the DonorPerfect configuration
    Check {
        #[command(subcommand)]
        action: CheckAction,
    },
    /// Generate shell completion scripts
    Completions {
        /// Shell to generate completions for
        shell: clap_complete::Shell,
    },
    /// Generate man page(s)
    Man {
        /// Output directory for man pages (prints to stdout if not specified)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[derive(Subcommand)]
enum MigrateAction {
    /// Apply all pending migrations
    Up,
    /// Rollback the last migration
    Down,
    /// Show migration status
    Status,
    /// Fresh install - drop all tables and reapply migrations
    Fresh,
}

#[derive(Subcommand)]
enum LogAction {
    /// List log entries, newest first
    List {
        /// Maximum number of entries
        #[arg(short, long, default_value_t = 50)]
        limit: u64,

        /// Entries to skip
        #[arg(long, default_value_t = 0)]
        offset: u64,

        /// Only show entries with this status
        #[arg(long, value_enum)]
        status: Option<StatusFilter>,

        /// Output format
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Table)]
        output: OutputFormat,
    },
    /// Write the whole log as CSV
    Export {
        /// Output file (default: sync-log-<date>.csv)
        path: Option<PathBuf>,
    },
    /// Delete the whole log
    ///
    /// Every donation becomes unsynced again and the next backfill re-sends
    /// gifts DonorPerfect already has. The pledge map is kept.
    Clear {
        /// Confirm deletion
        #[arg(long)]
        yes: bool,

        /// Export the log to this file first
        #[arg(long, value_name = "PATH")]
        export: Option<PathBuf>,
    },
}

#[derive(Subcommand)]
enum CheckAction {
    /// Test the API key against DonorPerfect
    Connection {
        /// Output format
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Table)]
        output: OutputFormat,
    },
    /// Validate the configured GL, campaign, solicit and gift type codes
    Codes {
        /// Output format
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Table)]
        output: OutputFormat,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    // Initialize tracing for non-TTY mode (structured logging)
    if !Term::stdout().is_term() {
        let env_filter = match EnvFilter::try_from_default_env() {
            Ok(filter) => filter,
            Err(_) => EnvFilter::new("donorbridge=info,donorbridge_cli=info"),
        };

        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .init();
    }

    // Load configuration (config file -> env vars -> defaults)
    let config = config::Config::load();

    let cli = Cli::parse();

    // Handle commands that don't require database access first
    match &cli.command {
        Commands::Completions { shell } => {
            commands::meta::handle_completions(*shell)?;
            return Ok(());
        }
        Commands::Man { output } => {
            commands::meta::handle_man(output.clone())?;
            return Ok(());
        }
        _ => {}
    }

    let database_url = config
        .database_url()
        .ok_or("Could not determine a database location. Set DONORBRIDGE_DATABASE_URL.")?;

    // Ensure the database directory exists for SQLite
    if database_url.starts_with("sqlite://") {
        let db_path = database_url.trim_start_matches("sqlite://");
        // Strip query parameters (e.g., ?mode=rwc) before path operations
        let db_path = db_path.split('?').next().unwrap_or(db_path);
        let db_path = std::path::Path::new(db_path);

        if db_path.is_relative() && !db_path.as_os_str().is_empty() {
            tracing::warn!(
                "Database path '{}' is relative - behavior depends on current directory. \
                 Consider using an absolute path.",
                db_path.display()
            );
        }

        if let Some(parent) = db_path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }
    }

    let ctx = Context {
        config,
        database_url,
        source: cli.source,
    };

    match cli.command {
        Commands::Migrate { action } => {
            commands::migrate::handle_migrate(action, &ctx.database_url).await?;
        }
        Commands::Sync {
            donation_id,
            realtime,
            output,
        } => {
            commands::sync::handle_sync(&ctx, donation_id, realtime, output).await?;
        }
        Commands::Backfill {
            batch_size,
            dry_run,
            output,
        } => {
            commands::sync::handle_backfill(&ctx, batch_size, dry_run, output).await?;
        }
        Commands::Log { action } => {
            commands::log::handle_log(&ctx, action).await?;
        }
        Commands::Stats { output } => {
            commands::stats::handle_stats(&ctx, output).await?;
        }
        Commands::Report { output } => {
            commands::report::handle_report(&ctx, output).await?;
        }
        Commands::Check { action } => {
            commands::check::handle_check(&ctx, action).await?;
        }
        Commands::Completions { .. } | Commands::Man { .. } => {}
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backfill_flags_parse() {
        let cli = Cli::try_parse_from([
            "donorbridge",
            "--source",
            "export.json",
            "backfill",
            "--batch-size",
            "10",
            "--dry-run",
        ])
        .unwrap();

        assert_eq!(cli.source, Some(PathBuf::from("export.json")));
        match cli.command {
            Commands::Backfill {
                batch_size,
                dry_run,
                output,
            } => {
                assert_eq!(batch_size, Some(10));
                assert!(dry_run);
                assert_eq!(output, OutputFormat::Table);
            }
            _ => panic!("expected backfill"),
        }
    }

    #[test]
    fn log_list_accepts_a_status_filter() {
        let cli = Cli::try_parse_from([
            "donorbridge",
            "log",
            "list",
            "--status",
            "error",
            "-o",
            "json",
        ])
        .unwrap();

        match cli.command {
            Commands::Log {
                action: LogAction::List { status, output, .. },
            } => {
                assert_eq!(status, Some(StatusFilter::Error));
                assert_eq!(output, OutputFormat::Json);
            }
            _ => panic!("expected log list"),
        }
    }

    #[test]
    fn global_source_flag_works_after_the_subcommand() {
        let cli = Cli::try_parse_from(["donorbridge", "sync", "1042", "--source", "x.json"])
            .unwrap();
        assert_eq!(cli.source, Some(PathBuf::from("x.json")));
    }

    #[test]
    fn log_clear_requires_no_arguments_to_parse() {
        let cli = Cli::try_parse_from(["donorbridge", "log", "clear"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Log {
                action: LogAction::Clear {
                    yes: false,
                    export: None
                }
            }
        ));
    }
}
