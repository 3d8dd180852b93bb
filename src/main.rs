// ABOUTME: CLI entry point for retail-sync
// ABOUTME: Parses commands and routes to the run, check, and ledger handlers

use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use retail_sync::commands;
use retail_sync::config::ConfigArgs;
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser)]
#[command(name = "retail-sync")]
#[command(about = "Forward POS sales and purchase orders to a marketing platform", long_about = None)]
#[command(version)]
struct Cli {
    /// Set the log level (error, warn, info, debug, trace)
    #[arg(long, global = true, default_value = "info")]
    log: String,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one sync cycle: fetch, filter against the ledger, publish, record
    ///
    /// Exit code 0 means every new record was handled; 2 means the cycle
    /// completed but some records failed permanently and are quarantined.
    Run {
        #[command(flatten)]
        config: ConfigArgs,
        /// First day to sync (YYYY-MM-DD, inclusive; requires --to)
        #[arg(long)]
        from: Option<NaiveDate>,
        /// Last day to sync (YYYY-MM-DD, inclusive; requires --from)
        #[arg(long)]
        to: Option<NaiveDate>,
    },
    /// Verify both API credentials without touching real data
    Check {
        #[command(flatten)]
        config: ConfigArgs,
    },
    /// Inspect or repair the dedup ledger
    Ledger {
        /// Directory holding the ledger (default: ~/.retail-sync)
        #[arg(long = "data-dir", env = "RETAIL_SYNC_DATA_DIR")]
        data_dir: Option<PathBuf>,
        #[command(subcommand)]
        action: LedgerAction,
    },
}

#[derive(Subcommand)]
enum LedgerAction {
    /// Show entry counts and quarantined records
    Status,
    /// Remove one entry so the next run re-delivers that transaction
    Clear {
        /// Transaction kind: sale or purchase
        #[arg(long)]
        kind: String,
        /// Transaction id as reported by the POS API
        #[arg(long)]
        id: String,
    },
    /// Drop every entry; the next run re-sends its whole window
    Reset {
        /// Skip the confirmation guard
        #[arg(short = 'y', long)]
        yes: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();

    // Initialize logging
    // 1. RUST_LOG environment variable has highest precedence
    // 2. --log flag is used if RUST_LOG is not set
    // 3. Default to "info" if neither are provided
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(cli.log.clone()));

    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    match cli.command {
        Commands::Run { config, from, to } => {
            commands::run(commands::run::RunOptions { config, from, to }).await
        }
        Commands::Check { config } => commands::check(config).await,
        Commands::Ledger { data_dir, action } => {
            match action {
                LedgerAction::Status => commands::ledger::status(data_dir)?,
                LedgerAction::Clear { kind, id } => {
                    commands::ledger::clear(data_dir, &kind, &id)?
                }
                LedgerAction::Reset { yes } => commands::ledger::reset(data_dir, yes)?,
            }
            Ok(ExitCode::SUCCESS)
        }
    }
}
