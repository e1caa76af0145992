//! Sync command - bring the local mirror up to date.

use aptmirror::config::format_size;
use aptmirror::download::RunResult;
use aptmirror::MirrorSync;
use console::style;
use indicatif::{ProgressBar, ProgressStyle};

use super::common::{resolve_sync_config, MirrorArgs};
use crate::error::{CliError, EXIT_INCOMPLETE, EXIT_OK};
use crate::runner::CliRunner;

/// Arguments for the sync command.
pub struct SyncArgs {
    pub mirror: MirrorArgs,
    pub json: bool,
}

/// Run the sync command.
pub fn run(runner: &CliRunner, args: SyncArgs) -> Result<i32, CliError> {
    runner.log_startup("sync");
    let config = resolve_sync_config(&args.mirror, runner.config())?;

    if !args.json {
        println!("{}", style("aptmirror sync").bold());
        println!("Repository:    {}", config.repository);
        println!("Mirror:        {}", config.mirror_root().display());
        println!("Distributions: {}", config.distributions.join(" "));
        println!();
    }

    let cancel = runner.cancel_on_interrupt()?;
    let mut sync = MirrorSync::new(config)?;

    let bar = if args.json {
        ProgressBar::hidden()
    } else {
        progress_bar()
    };
    let callback_bar = bar.clone();
    sync = sync.with_progress(Box::new(move |bytes, total_bytes, done, total| {
        callback_bar.set_length(total_bytes);
        callback_bar.set_position(bytes);
        callback_bar.set_message(format!("{}/{} files", done, total));
    }));

    let result = runner.block_on(sync.run(cancel));
    bar.finish_and_clear();
    let result = result?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        print_summary(&result);
    }

    Ok(if result.is_complete() {
        EXIT_OK
    } else {
        EXIT_INCOMPLETE
    })
}

fn progress_bar() -> ProgressBar {
    let bar = ProgressBar::new(0);
    bar.set_style(
        ProgressStyle::with_template(
            "{spinner} [{elapsed_precise}] [{bar:40}] {bytes}/{total_bytes} ({bytes_per_sec}) {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("=> "),
    );
    bar
}

fn print_summary(result: &RunResult) {
    println!("{}", style("Summary").bold());
    println!("  Added:      {}", result.files_added);
    println!("  Replaced:   {}", result.files_replaced);
    println!("  Up to date: {}", result.files_skipped);
    println!("  Downloaded: {}", format_size(result.bytes_downloaded));
    if !result.not_served.is_empty() {
        println!(
            "  Not served: {} (listed in Release only)",
            result.not_served.len()
        );
    }

    if !result.skipped_combinations.is_empty() {
        println!();
        println!("{}", style("Skipped combinations:").yellow());
        for skipped in &result.skipped_combinations {
            println!("  {} - {}", skipped.scope, skipped.reason);
        }
    }

    if !result.orphans.is_empty() {
        println!();
        println!(
            "{} local files are no longer in the repository (see 'aptmirror prune').",
            style(result.orphans.len()).yellow()
        );
    }

    if !result.failures.is_empty() {
        println!();
        println!("{}", style(format!("Failed ({}):", result.failures.len())).red());
        for failure in &result.failures {
            println!(
                "  {} [{}] {} (attempts: {})",
                failure.path, failure.reason, failure.detail, failure.attempts
            );
        }
    }

    println!();
    if result.cancelled {
        println!(
            "{}",
            style(format!("Cancelled; {} files were not processed.", result.dropped)).yellow()
        );
    } else if result.is_complete() {
        println!("{}", style("Mirror is up to date.").green());
    } else {
        println!(
            "{}",
            style("Sync incomplete; the next run retries the missing files.").red()
        );
    }
}
