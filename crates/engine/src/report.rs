use indexmap::IndexMap;
use serde::Serialize;

/// Final state of a scheduled task instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskOutcome {
    /// Ran and returned successfully
    Completed,
    /// Was complete before the run
    AlreadyDone,
    /// Ran and returned an error or panicked
    Failed,
    /// A requirement failed, so the task never ran
    UpstreamFailed,
    /// Not run for any other reason, e.g. its requirements could not be bound
    NotRun,
}

impl TaskOutcome {
    pub fn is_done(&self) -> bool {
        matches!(self, TaskOutcome::Completed | TaskOutcome::AlreadyDone)
    }
}

/// Stage at which a unit's own code failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// `run` returned an error
    Error,
    /// A call into the work unit panicked
    Panic,
    /// `complete` returned an error
    Completeness,
    /// `requires` failed or named a task that could not be bound
    Scheduling,
}

/// A failure raised by a work unit, carrying only the unit's own message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnitFailure {
    /// Task id of the failing instance
    pub unit: String,
    pub error_kind: FailureKind,
    pub message: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct TaskReport {
    pub task_id: String,
    pub name: String,
    pub outcome: TaskOutcome,
}

/// What happened to every scheduled instance, in execution order.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunReport {
    pub tasks: IndexMap<String, TaskReport>,
    pub failures: Vec<UnitFailure>,
    /// Another process held the lock, nothing ran
    pub lock_held: bool,
}

impl RunReport {
    pub fn outcome(&self, task_id: &str) -> Option<TaskOutcome> {
        self.tasks.get(task_id).map(|task| task.outcome)
    }

    /// True when nothing failed and every scheduled task is done.
    pub fn success(&self) -> bool {
        !self.lock_held && self.failures.is_empty() && self.tasks.values().all(|task| task.outcome.is_done())
    }

    pub fn with_outcome(&self, outcome: TaskOutcome) -> impl Iterator<Item = &TaskReport> {
        self.tasks.values().filter(move |task| task.outcome == outcome)
    }

    pub fn has_scheduling_failure(&self) -> bool {
        self.failures.iter().any(|failure| failure.error_kind == FailureKind::Scheduling)
    }

    /// The first failure raised by a unit's `run`, if any.
    pub fn first_execution_failure(&self) -> Option<&UnitFailure> {
        self.failures
            .iter()
            .find(|failure| matches!(failure.error_kind, FailureKind::Error | FailureKind::Panic | FailureKind::Completeness))
    }

    pub(crate) fn record(&mut self, task_id: &str, name: &str, outcome: TaskOutcome) {
        self.tasks.insert(
            task_id.to_string(),
            TaskReport {
                task_id: task_id.to_string(),
                name: name.to_string(),
                outcome,
            },
        );
    }
}
