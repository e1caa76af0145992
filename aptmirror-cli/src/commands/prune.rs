//! Prune and remove commands - opt-in deletion from the mirror.

use aptmirror::config::format_size;
use aptmirror::prune::{prune_orphans, remove_distribution, PruneReport};
use aptmirror::MirrorSync;
use console::style;

use super::common::{confirm, resolve_sync_config, MirrorArgs};
use crate::error::{CliError, EXIT_OK};
use crate::runner::CliRunner;

/// Arguments for the prune command.
pub struct PruneArgs {
    pub mirror: MirrorArgs,
    pub yes: bool,
    pub force: bool,
    pub dry_run: bool,
}

/// Arguments for the remove command.
pub struct RemoveArgs {
    pub mirror: MirrorArgs,
    pub distribution: String,
    pub yes: bool,
    pub dry_run: bool,
}

/// Delete local files the repository no longer lists.
///
/// Orphans are computed against a fresh plan. When index combinations were
/// skipped, their files would look orphaned too, so pruning is refused unless
/// `--force` is given.
pub fn run_prune(runner: &CliRunner, args: PruneArgs) -> Result<i32, CliError> {
    runner.log_startup("prune");
    let config = resolve_sync_config(&args.mirror, runner.config())?;
    let mirror_root = config.mirror_root();
    let plan = runner.block_on(MirrorSync::new(config)?.plan())?;

    if !plan.skipped_combinations.is_empty() && !args.force {
        for skipped in &plan.skipped_combinations {
            eprintln!("  skipped: {} ({})", skipped.scope, skipped.reason);
        }
        return Err(CliError::Config(
            "Some index combinations could not be fetched; their files would be pruned. \
             Fix the selection or use --force."
                .to_string(),
        ));
    }

    if plan.orphans.is_empty() {
        println!("No orphaned files.");
        return Ok(EXIT_OK);
    }

    for orphan in &plan.orphans {
        println!("  {}", orphan);
    }
    let prompt = format!("Delete {} orphaned files?", plan.orphans.len());
    if !args.dry_run && !confirm(&prompt, args.yes)? {
        println!("Aborted.");
        return Ok(EXIT_OK);
    }

    let report = prune_orphans(&mirror_root, &plan.orphans, args.dry_run)?;
    print_report(&report);
    Ok(EXIT_OK)
}

/// Delete a mirrored distribution and the package files only it uses.
pub fn run_remove(runner: &CliRunner, args: RemoveArgs) -> Result<i32, CliError> {
    runner.log_startup("remove");
    let config = resolve_sync_config(&args.mirror, runner.config())?;

    let prompt = format!(
        "Remove distribution '{}' from {}?",
        args.distribution,
        config.mirror_root().display()
    );
    if !args.dry_run && !confirm(&prompt, args.yes)? {
        println!("Aborted.");
        return Ok(EXIT_OK);
    }

    let report = remove_distribution(&config, &args.distribution, args.dry_run)?;
    print_report(&report);
    Ok(EXIT_OK)
}

fn print_report(report: &PruneReport) {
    let verb = if report.dry_run {
        "Would remove"
    } else {
        "Removed"
    };
    println!(
        "{} {} files ({}), {} empty directories.",
        style(verb).bold(),
        report.removed.len(),
        format_size(report.freed_bytes),
        report.dirs_removed
    );
}
