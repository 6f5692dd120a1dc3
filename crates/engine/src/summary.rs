//! Post-run execution summary.
//!
//! Groups scheduled tasks by outcome, lists the failures with the unit's own
//! message, and shows every configuration value an operator set explicitly.

use std::{fmt::Write, sync::Arc};

use taskrun_registry::BoundInstance;

use crate::{RunReport, TaskOutcome};

const BANNER: &str = "===== Taskrun Execution Summary =====";

/// Renders the summary.
///
/// # Arguments
///
/// * `report` - Outcome of the run
/// * `configs` - Configuration singletons; only their explicitly set values are shown
/// * `summary_length` - Most tasks listed per group before the rest are counted
pub fn render(report: &RunReport, configs: &[Arc<BoundInstance>], summary_length: usize) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{BANNER}\n");

    if report.lock_held {
        let _ = writeln!(out, "Nothing was scheduled because another process holds the lock for these tasks.");
    } else {
        let _ = writeln!(out, "Scheduled {} tasks of which:", report.tasks.len());
        let groups = [
            (TaskOutcome::AlreadyDone, "complete ones were encountered"),
            (TaskOutcome::Completed, "ran successfully"),
            (TaskOutcome::Failed, "failed"),
            (TaskOutcome::UpstreamFailed, "had failed dependencies"),
            (TaskOutcome::NotRun, "were not run"),
        ];
        for (outcome, label) in groups {
            let task_ids: Vec<&str> = report.with_outcome(outcome).map(|task| task.task_id.as_str()).collect();
            if task_ids.is_empty() {
                continue;
            }
            let _ = writeln!(out, "* {} {label}:", task_ids.len());
            for task_id in task_ids.iter().take(summary_length) {
                let _ = writeln!(out, "    - {task_id}");
            }
            if task_ids.len() > summary_length {
                let _ = writeln!(out, "    ...and {} more", task_ids.len() - summary_length);
            }
        }
    }

    if !report.failures.is_empty() {
        let _ = writeln!(out, "\nFailures:");
        for failure in &report.failures {
            let _ = writeln!(out, "    {} ({:?}): {}", failure.unit, failure.error_kind, failure.message);
        }
    }

    let explicit: Vec<String> = configs
        .iter()
        .flat_map(|config| {
            config
                .explicit_values()
                .map(|(name, value, source)| format!("    {}.{name}={value} ({source})", config.name()))
                .collect::<Vec<_>>()
        })
        .collect();
    if !explicit.is_empty() {
        let _ = writeln!(out, "\nConfiguration set for this run:");
        for line in explicit {
            let _ = writeln!(out, "{line}");
        }
    }

    let _ = writeln!(out, "\nThis progress looks {}", verdict(report));
    let _ = writeln!(out, "\n{BANNER}");
    out
}

fn verdict(report: &RunReport) -> &'static str {
    if report.lock_held {
        ":| because the process lock was held by another process"
    } else if report.has_scheduling_failure() {
        ":( because there were tasks whose scheduling failed"
    } else if report.with_outcome(TaskOutcome::Failed).next().is_some() || report.first_execution_failure().is_some() {
        ":( because there were failed tasks"
    } else if report.success() {
        ":) because there were no failed tasks or missing dependencies"
    } else {
        ":| because there were tasks that were not run"
    }
}
