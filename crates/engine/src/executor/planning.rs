//! Dependency graph construction for a run.

use std::{collections::HashSet, sync::Arc, vec};

use indexmap::IndexMap;
use taskrun_registry::BoundInstance;
use tracing::debug;

use super::guard::{UnitError, guarded};
use crate::{Catalog, FailureKind, TaskRequest, UnitContext, UnitFailure, WorkUnit};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PlanState {
    /// Incomplete with every requirement scheduled
    Pending,
    /// Complete before the run
    AlreadyDone,
    /// Its requirements could not be determined
    Unschedulable,
}

pub(crate) struct PlannedTask {
    pub instance: BoundInstance,
    pub unit: Option<Arc<dyn WorkUnit>>,
    /// Task ids of the requirements, all planned earlier
    pub requirements: Vec<String>,
    pub state: PlanState,
}

/// Every instance reachable from the roots, requirements before dependents.
pub(crate) struct Plan {
    pub tasks: IndexMap<String, PlannedTask>,
    pub failures: Vec<UnitFailure>,
}

/// Walks `requires` depth-first from each root.
///
/// Complete instances are not expanded. Instances are deduplicated by task id,
/// so a requirement shared by several dependents runs once. The walk keeps its
/// own stack, so deep requirement chains do not grow the thread's stack.
pub(crate) fn plan(catalog: &Catalog, roots: Vec<BoundInstance>) -> Plan {
    let mut planner = Planner {
        catalog,
        tasks: IndexMap::new(),
        visiting: HashSet::new(),
        failures: Vec::new(),
    };
    for root in roots {
        planner.plan_root(root);
    }
    Plan {
        tasks: planner.tasks,
        failures: planner.failures,
    }
}

/// An instance whose requirements are being planned.
struct Frame {
    task_id: String,
    instance: BoundInstance,
    unit: Arc<dyn WorkUnit>,
    pending: vec::IntoIter<TaskRequest>,
    requirements: Vec<String>,
}

enum Entered {
    Planned(String),
    Expanding(Frame),
}

enum Step {
    Finish(PlanState),
    Descend(BoundInstance),
}

struct Planner<'a> {
    catalog: &'a Catalog,
    tasks: IndexMap<String, PlannedTask>,
    visiting: HashSet<String>,
    failures: Vec<UnitFailure>,
}

impl<'a> Planner<'a> {
    fn plan_root(&mut self, root: BoundInstance) {
        if self.tasks.contains_key(&root.task_id()) {
            return;
        }
        let mut stack = match self.enter(root) {
            Entered::Planned(_) => return,
            Entered::Expanding(frame) => vec![frame],
        };

        while let Some(frame) = stack.last_mut() {
            let step = match frame.pending.next() {
                None => Step::Finish(PlanState::Pending),
                Some(request) => match self.catalog.bind(&request) {
                    Err(error) => {
                        let message = format!("cannot schedule requirement {request}: {error}");
                        self.fail(&frame.task_id, FailureKind::Scheduling, message);
                        Step::Finish(PlanState::Unschedulable)
                    }
                    Ok(requirement) => {
                        let requirement_id = requirement.task_id();
                        if self.visiting.contains(&requirement_id) {
                            let message = format!("dependency cycle through {requirement_id}");
                            self.fail(&frame.task_id, FailureKind::Scheduling, message);
                            Step::Finish(PlanState::Unschedulable)
                        } else if self.tasks.contains_key(&requirement_id) {
                            frame.requirements.push(requirement_id);
                            continue;
                        } else {
                            Step::Descend(requirement)
                        }
                    }
                },
            };

            match step {
                Step::Finish(state) => {
                    let Some(frame) = stack.pop() else { break };
                    let task_id = self.finish(frame, state);
                    if let Some(parent) = stack.last_mut() {
                        parent.requirements.push(task_id);
                    }
                }
                Step::Descend(requirement) => match self.enter(requirement) {
                    Entered::Expanding(child) => stack.push(child),
                    Entered::Planned(task_id) => {
                        if let Some(parent) = stack.last_mut() {
                            parent.requirements.push(task_id);
                        }
                    }
                },
            }
        }
    }

    /// Checks completeness and lists requirements. Instances that need no
    /// expansion are planned right away.
    fn enter(&mut self, instance: BoundInstance) -> Entered {
        let task_id = instance.task_id();
        let Some(unit) = self.catalog.unit(instance.definition_id()) else {
            self.fail(&task_id, FailureKind::Scheduling, "no work unit is registered for this definition".to_string());
            return Entered::Planned(self.insert(task_id, instance, None, Vec::new(), PlanState::Unschedulable));
        };

        let expansion = {
            let context = UnitContext::new(&instance, self.catalog);
            match guarded(|| unit.complete(&context)) {
                Ok(true) => Err(PlanState::AlreadyDone),
                Ok(false) => guarded(|| unit.requires(&context))
                    .map_err(|error| self.unit_failed(&task_id, FailureKind::Scheduling, error)),
                Err(error) => Err(self.unit_failed(&task_id, FailureKind::Completeness, error)),
            }
        };

        match expansion {
            Ok(requests) => {
                self.visiting.insert(task_id.clone());
                Entered::Expanding(Frame {
                    requirements: Vec::with_capacity(requests.len()),
                    pending: requests.into_iter(),
                    task_id,
                    instance,
                    unit,
                })
            }
            Err(state) => Entered::Planned(self.insert(task_id, instance, Some(unit), Vec::new(), state)),
        }
    }

    fn finish(&mut self, frame: Frame, state: PlanState) -> String {
        self.visiting.remove(&frame.task_id);
        let requirements = match state {
            PlanState::Pending => frame.requirements,
            PlanState::AlreadyDone | PlanState::Unschedulable => Vec::new(),
        };
        self.insert(frame.task_id, frame.instance, Some(frame.unit), requirements, state)
    }

    fn insert(
        &mut self,
        task_id: String,
        instance: BoundInstance,
        unit: Option<Arc<dyn WorkUnit>>,
        requirements: Vec<String>,
        state: PlanState,
    ) -> String {
        debug!(task = %task_id, state = ?state, requirements = requirements.len(), "planned task");
        self.tasks.insert(
            task_id.clone(),
            PlannedTask {
                instance,
                unit,
                requirements,
                state,
            },
        );
        task_id
    }

    /// Records a failed `complete` or `requires` call. Panics are reported as
    /// such whichever call raised them.
    fn unit_failed(&mut self, task_id: &str, error_kind: FailureKind, error: UnitError) -> PlanState {
        match error {
            UnitError::Failed(error) => self.fail(task_id, error_kind, format!("{error:#}")),
            UnitError::Panicked { message, .. } => self.fail(task_id, FailureKind::Panic, message),
        }
        PlanState::Unschedulable
    }

    fn fail(&mut self, task_id: &str, error_kind: FailureKind, message: String) {
        self.failures.push(UnitFailure {
            unit: task_id.to_string(),
            error_kind,
            message,
        });
    }
}
