//! aptmirror CLI - mirror APT repositories to a local directory.
//!
//! Exit codes: 0 when the mirror is complete, 1 when the command failed,
//! 2 when a sync finished with failed or unprocessed files.

mod commands;
mod error;
mod runner;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use console::style;

use commands::common::MirrorArgs;
use commands::config::ConfigCommands;
use commands::plan::PlanArgs;
use commands::prune::{PruneArgs, RemoveArgs};
use commands::sync::SyncArgs;
use error::{CliError, EXIT_ERROR};
use runner::CliRunner;

#[derive(Parser)]
#[command(name = "aptmirror")]
#[command(version, about = "Incremental, crash-consistent APT repository mirror", long_about = None)]
struct Cli {
    /// Debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Use this configuration file instead of the default
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Bring the local mirror up to date
    Sync {
        #[command(flatten)]
        mirror: MirrorArgs,

        /// Print the run result as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show what a sync would download, without downloading
    Plan {
        #[command(flatten)]
        mirror: MirrorArgs,

        /// Print the plan as JSON
        #[arg(long)]
        json: bool,
    },

    /// Delete local files the repository no longer lists
    Prune {
        #[command(flatten)]
        mirror: MirrorArgs,

        /// Do not ask for confirmation
        #[arg(short, long)]
        yes: bool,

        /// Prune even if some index combinations could not be fetched
        #[arg(long)]
        force: bool,

        /// Only list what would be deleted
        #[arg(long)]
        dry_run: bool,
    },

    /// Delete a mirrored distribution
    Remove {
        /// Distribution to remove, e.g. bullseye
        distribution: String,

        #[command(flatten)]
        mirror: MirrorArgs,

        /// Do not ask for confirmation
        #[arg(short, long)]
        yes: bool,

        /// Only list what would be deleted
        #[arg(long)]
        dry_run: bool,
    },

    /// View or change config.ini
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

fn main() {
    let cli = Cli::parse();

    let code = match run(cli) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{} {}", style("Error:").red().bold(), e);
            EXIT_ERROR
        }
    };
    std::process::exit(code);
}

fn run(cli: Cli) -> Result<i32, CliError> {
    let command = match cli.command {
        Commands::Config { command } => {
            return commands::config::run(command, cli.config.as_deref());
        }
        command => command,
    };

    let runner = CliRunner::new(cli.config.as_deref(), cli.verbose)?;
    match command {
        Commands::Sync { mirror, json } => commands::sync::run(&runner, SyncArgs { mirror, json }),
        Commands::Plan { mirror, json } => commands::plan::run(&runner, PlanArgs { mirror, json }),
        Commands::Prune {
            mirror,
            yes,
            force,
            dry_run,
        } => commands::prune::run_prune(
            &runner,
            PruneArgs {
                mirror,
                yes,
                force,
                dry_run,
            },
        ),
        Commands::Remove {
            distribution,
            mirror,
            yes,
            dry_run,
        } => commands::prune::run_remove(
            &runner,
            RemoveArgs {
                mirror,
                distribution,
                yes,
                dry_run,
            },
        ),
        Commands::Config { command } => commands::config::run(command, cli.config.as_deref()),
    }
}
