//! Plan command - show what a sync would do without downloading.

use aptmirror::config::format_size;
use aptmirror::download::ChangeKind;
use aptmirror::planner::SyncPlan;
use aptmirror::MirrorSync;
use console::style;
use serde_json::json;

use super::common::{resolve_sync_config, MirrorArgs};
use crate::error::{CliError, EXIT_OK};
use crate::runner::CliRunner;

/// Arguments for the plan command.
pub struct PlanArgs {
    pub mirror: MirrorArgs,
    pub json: bool,
}

/// Run the plan command.
pub fn run(runner: &CliRunner, args: PlanArgs) -> Result<i32, CliError> {
    runner.log_startup("plan");
    let config = resolve_sync_config(&args.mirror, runner.config())?;
    let sync = MirrorSync::new(config)?;
    let plan = runner.block_on(sync.plan())?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&plan_json(&plan))?);
    } else {
        print_plan(&plan);
    }
    Ok(EXIT_OK)
}

fn plan_json(plan: &SyncPlan) -> serde_json::Value {
    let actions: Vec<_> = plan
        .actions
        .iter()
        .map(|a| {
            json!({
                "path": a.path,
                "kind": a.kind,
                "size": a.expected_size,
                "checksum": a.expected_checksum.to_string(),
            })
        })
        .collect();

    json!({
        "actions": actions,
        "skipped": plan.skipped,
        "orphans": plan.orphans,
        "skipped_combinations": plan.skipped_combinations,
        "held": plan.held,
        "total_bytes": plan.total_bytes(),
    })
}

fn print_plan(plan: &SyncPlan) {
    for action in &plan.actions {
        let kind = match action.kind {
            ChangeKind::Add => style("add").green(),
            ChangeKind::Replace => style("replace").yellow(),
        };
        println!(
            "{:>8} {:>10}  {}",
            kind,
            format_size(action.expected_size),
            action.path
        );
    }
    for orphan in &plan.orphans {
        println!("{:>8} {:>10}  {}", style("orphan").dim(), "", orphan);
    }
    for skipped in &plan.skipped_combinations {
        println!("{:>8} {:>10}  {} ({})", style("skip").dim(), "", skipped.scope, skipped.reason);
    }
    for held in &plan.held {
        println!("{:>8} {:>10}  {} ({})", style("hold").red(), "", held.path, held.detail);
    }

    println!();
    println!(
        "{} to add, {} to replace, {} up to date, {} orphaned; {} to download",
        plan.count(ChangeKind::Add),
        plan.count(ChangeKind::Replace),
        plan.skipped,
        plan.orphans.len(),
        format_size(plan.total_bytes())
    );
}
