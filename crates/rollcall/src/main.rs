//! Rollcall scanning station
//!
//! One binary per station laptop. `scan` is the long-running mode: decoded
//! badge ids arrive on stdin (from the camera decoder or typed by hand) and
//! each one gets immediate feedback while offline scans sync in the
//! background. The other commands manage the roster, the offline queue and
//! configuration.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use rollcall_logging::{init_logging, LogConfig};
use rollcall_protocol::Day;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

mod cli;

use cli::config::StationConfig;

/// Shutdown timeout in seconds
const SHUTDOWN_TIMEOUT_SECS: u64 = 10;

#[derive(Parser, Debug)]
#[command(name = "rollcall", about = "Conference attendance scanning station")]
struct Cli {
    /// Enable verbose logging (info/debug to stderr)
    #[arg(short = 'v', long, global = true)]
    verbose: bool,

    /// Config file (default: ~/.rollcall/config.toml)
    #[arg(long, global = true, env = "ROLLCALL_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Classify decoded badge ids read from stdin, one per line
    Scan {
        /// Conference day (1-4)
        #[arg(short, long)]
        day: Day,

        /// Scan purpose, e.g. "Lunch" (default: first purpose allowed on the day)
        #[arg(short, long)]
        purpose: Option<String>,

        /// Operator name (default: `user` from the config file)
        #[arg(short, long)]
        user: Option<String>,

        /// Treat the store as unreachable; every scan goes to the offline queue
        #[arg(long)]
        offline: bool,

        /// Print one JSON object per outcome
        #[arg(long)]
        json: bool,
    },

    /// Push queued scans to the record store once
    Sync {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show or manage the offline queue
    Queue {
        #[command(subcommand)]
        action: Option<QueueAction>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Manage the delegate roster
    Roster {
        #[command(subcommand)]
        action: RosterAction,
    },

    /// Show resolved configuration and paths
    Config {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand, Debug)]
enum QueueAction {
    /// Move quarantined scans back into the queue for the next sync
    Retry,
}

#[derive(Subcommand, Debug)]
enum RosterAction {
    /// Load delegates from a CSV file with columns id,name[,organization]
    Import {
        /// CSV file
        file: PathBuf,
    },
    /// List delegates
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

fn command_wants_json(command: &Commands) -> bool {
    match command {
        Commands::Scan { json, .. }
        | Commands::Sync { json }
        | Commands::Queue { json, .. }
        | Commands::Config { json } => *json,
        Commands::Roster {
            action: RosterAction::List { json },
        } => *json,
        Commands::Roster {
            action: RosterAction::Import { .. },
        } => false,
    }
}

fn run_command(cli: Cli) -> Result<()> {
    let (config, config_path) = StationConfig::load(cli.config.as_deref())?;

    // Config and queue inspection never touch the store.
    match cli.command {
        Commands::Config { json } => {
            return cli::config::run(cli::config::ConfigArgs { json }, &config, &config_path)
        }
        Commands::Queue {
            action: None,
            json,
        } => return cli::queue::show(&config, json),
        Commands::Queue {
            action: Some(QueueAction::Retry),
            ..
        } => return cli::queue::retry(&config),
        _ => {}
    }

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to start async runtime")?;

    let result = runtime.block_on(async {
        match cli.command {
            Commands::Scan {
                day,
                purpose,
                user,
                offline,
                json,
            } => {
                cli::scan::run(
                    cli::scan::ScanArgs {
                        day,
                        purpose,
                        user,
                        offline,
                        json,
                    },
                    &config,
                )
                .await
            }
            Commands::Sync { json } => cli::sync::run(&config, json).await,
            Commands::Roster {
                action: RosterAction::Import { file },
            } => cli::roster::import(&config, &file).await,
            Commands::Roster {
                action: RosterAction::List { json },
            } => cli::roster::list(&config, json).await,
            Commands::Config { .. } | Commands::Queue { .. } => Ok(()),
        }
    });

    // A blocked stdin read must not hold the process open.
    runtime.shutdown_timeout(Duration::from_secs(SHUTDOWN_TIMEOUT_SECS));
    result
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let json_mode = command_wants_json(&cli.command);

    if let Err(err) = init_logging(LogConfig {
        app_name: "rollcall",
        verbose: cli.verbose,
        log_dir: None,
    }) {
        eprintln!("Warning: logging disabled: {:#}", err);
    }

    match run_command(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            if json_mode {
                cli::error::print_json_error(&err);
            } else {
                eprintln!("{:?}", err);
            }
            ExitCode::from(1)
        }
    }
}
