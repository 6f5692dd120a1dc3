//! Execution engine: plans the dependency graph of the requested instances and
//! runs it in-process.
//!
//! - `planning` walks `requires` and orders requirements before dependents
//! - `lock::ProcessLock` keeps two processes from running the same roots
//! - `LocalScheduler` runs units sequentially on the calling thread, capturing
//!   errors and panics as `UnitFailure`s
//! - `guard` contains panics raised by work-unit code

use std::{env, path::PathBuf};

use taskrun_registry::BoundInstance;
use tracing::{debug, info, warn};

use crate::{Catalog, FailureKind, RunReport, TaskOutcome, UnitContext, UnitFailure};

pub(crate) mod guard;
pub mod lock;
mod planning;

use guard::{UnitError, guarded};
pub use lock::{LockError, ProcessLock};
use planning::{PlanState, PlannedTask};

/// Options that shape a run.
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Run in-process; a central scheduler is not available, so `false` only
    /// changes what gets logged
    pub local_scheduler: bool,
    pub no_lock: bool,
    pub lock_dir: PathBuf,
    /// Address a central scheduler would be reached at
    pub scheduler_address: String,
    /// Re-check `complete` after a successful `run`
    pub check_complete_on_run: bool,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            local_scheduler: true,
            no_lock: false,
            lock_dir: default_lock_dir(),
            scheduler_address: "localhost:8082".to_string(),
            check_complete_on_run: false,
        }
    }
}

pub fn default_lock_dir() -> PathBuf {
    env::temp_dir().join("taskrun")
}

/// Runs bound root instances and everything they require.
pub trait Executor {
    fn execute(&self, catalog: &Catalog, roots: Vec<BoundInstance>, options: &RunOptions) -> RunReport;
}

/// Sequential in-process scheduler.
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalScheduler;

impl Executor for LocalScheduler {
    fn execute(&self, catalog: &Catalog, roots: Vec<BoundInstance>, options: &RunOptions) -> RunReport {
        if !options.local_scheduler {
            warn!(
                scheduler = %options.scheduler_address,
                "central scheduler is not supported; running with the local scheduler"
            );
        }

        let lock_key = roots.iter().map(BoundInstance::task_id).collect::<Vec<_>>().join(" ");
        let _lock = if options.no_lock {
            None
        } else {
            match ProcessLock::acquire(&options.lock_dir, &lock_key) {
                Ok(lock) => Some(lock),
                Err(LockError::Held { pid, .. }) => {
                    warn!(pid, roots = %lock_key, "another process is already running these tasks");
                    return RunReport {
                        lock_held: true,
                        ..RunReport::default()
                    };
                }
                Err(error) => {
                    warn!(error = %error, "running without the process lock");
                    None
                }
            }
        };

        let plan = planning::plan(catalog, roots);
        info!(task_count = plan.tasks.len(), "run started");

        let mut report = RunReport {
            failures: plan.failures,
            ..RunReport::default()
        };
        for (task_id, task) in &plan.tasks {
            let outcome = match task.state {
                PlanState::AlreadyDone => TaskOutcome::AlreadyDone,
                PlanState::Unschedulable => TaskOutcome::NotRun,
                PlanState::Pending => match requirement_block(&task.requirements, &report) {
                    Some(blocked) => blocked,
                    None => run_task(catalog, task_id, task, options, &mut report.failures),
                },
            };
            match outcome {
                TaskOutcome::Completed => debug!(task = %task_id, "task completed"),
                TaskOutcome::AlreadyDone => debug!(task = %task_id, "task already complete"),
                TaskOutcome::Failed => warn!(task = %task_id, "task failed"),
                TaskOutcome::UpstreamFailed | TaskOutcome::NotRun => info!(task = %task_id, outcome = ?outcome, "task not run"),
            }
            report.record(task_id, task.instance.name(), outcome);
        }

        info!(
            task_count = report.tasks.len(),
            completed = report.with_outcome(TaskOutcome::Completed).count(),
            failed = report.with_outcome(TaskOutcome::Failed).count(),
            "run finished"
        );
        report
    }
}

fn requirement_block(requirements: &[String], report: &RunReport) -> Option<TaskOutcome> {
    for requirement in requirements {
        match report.outcome(requirement) {
            Some(outcome) if outcome.is_done() => {}
            Some(TaskOutcome::Failed | TaskOutcome::UpstreamFailed) => return Some(TaskOutcome::UpstreamFailed),
            _ => return Some(TaskOutcome::NotRun),
        }
    }
    None
}

fn run_task(
    catalog: &Catalog,
    task_id: &str,
    task: &PlannedTask,
    options: &RunOptions,
    failures: &mut Vec<UnitFailure>,
) -> TaskOutcome {
    let Some(unit) = &task.unit else {
        return TaskOutcome::NotRun;
    };
    let context = UnitContext::new(&task.instance, catalog);
    debug!(task = %task_id, "task started");

    let (error_kind, message) = match guarded(|| unit.run(&context)) {
        Ok(()) if !options.check_complete_on_run => return TaskOutcome::Completed,
        Ok(()) => match guarded(|| unit.complete(&context)) {
            Ok(true) => return TaskOutcome::Completed,
            Ok(false) => (FailureKind::Completeness, "run finished but the task is still incomplete".to_string()),
            Err(UnitError::Failed(error)) => (FailureKind::Completeness, format!("{error:#}")),
            Err(UnitError::Panicked { message, .. }) => (FailureKind::Panic, message),
        },
        Err(UnitError::Failed(error)) => (FailureKind::Error, format!("{error:#}")),
        Err(UnitError::Panicked { message, .. }) => (FailureKind::Panic, message),
    };
    failures.push(UnitFailure {
        unit: task_id.to_string(),
        error_kind,
        message,
    });
    TaskOutcome::Failed
}
