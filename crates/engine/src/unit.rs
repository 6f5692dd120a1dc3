//! Work-unit behavior attached to task definitions.

use std::{fmt, sync::Arc};

use anyhow::Result;
use indexmap::IndexMap;
use taskrun_registry::{BoundInstance, ParamValue};

use crate::Catalog;

/// A request for a task instance, by definition name plus parameter values.
///
/// Parameters not named here are bound from the command line, the
/// configuration file or their defaults.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskRequest {
    pub name: String,
    pub overrides: IndexMap<String, ParamValue>,
}

impl TaskRequest {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            overrides: IndexMap::new(),
        }
    }

    pub fn with(mut self, parameter: impl Into<String>, value: impl Into<ParamValue>) -> Self {
        self.overrides.insert(parameter.into(), value.into());
        self
    }
}

impl fmt::Display for TaskRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rendered: Vec<String> = self.overrides.iter().map(|(name, value)| format!("{name}={value}")).collect();
        write!(f, "{}({})", self.name, rendered.join(", "))
    }
}

/// What a work unit sees while it runs: its own bound parameters and the
/// configuration singletons of the catalog it was registered in.
pub struct UnitContext<'a> {
    instance: &'a BoundInstance,
    catalog: &'a Catalog,
}

impl<'a> UnitContext<'a> {
    pub fn new(instance: &'a BoundInstance, catalog: &'a Catalog) -> Self {
        Self { instance, catalog }
    }

    pub fn instance(&self) -> &BoundInstance {
        self.instance
    }

    pub fn task_id(&self) -> String {
        self.instance.task_id()
    }

    /// Reads a configuration singleton by name.
    pub fn config(&self, name: &str) -> Result<Arc<BoundInstance>> {
        Ok(self.catalog.config(name)?)
    }
}

/// Behavior of a task definition.
///
/// `requires` and `complete` are consulted while the dependency graph is
/// built; `run` is called once every requirement has completed.
pub trait WorkUnit: Send + Sync {
    /// Instances that must be complete before this one runs.
    fn requires(&self, _context: &UnitContext<'_>) -> Result<Vec<TaskRequest>> {
        Ok(Vec::new())
    }

    /// Whether the instance's work is already done. Complete instances are
    /// neither run nor expanded.
    fn complete(&self, _context: &UnitContext<'_>) -> Result<bool> {
        Ok(false)
    }

    fn run(&self, context: &UnitContext<'_>) -> Result<()>;
}

/// A work unit with no behavior, for definitions that only group parameters.
pub struct NoopUnit;

impl WorkUnit for NoopUnit {
    fn run(&self, _context: &UnitContext<'_>) -> Result<()> {
        Ok(())
    }
}
