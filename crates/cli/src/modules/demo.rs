//! The `demo` module: small tasks that exercise naming, inheritance,
//! configuration and failure reporting from the command line.

use std::{
    collections::HashSet,
    fs,
    path::Path,
    sync::Mutex,
};

use anyhow::{Context, Result, anyhow, bail};
use once_cell::sync::Lazy;
use taskrun_engine::{Catalog, NoopUnit, TaskRequest, UnitContext, WorkUnit};
use taskrun_registry::{Declaration, ParamSpec, RegistryError};
use tracing::info;

pub const MODULE: &str = "demo";

/// Task ids whose in-memory output exists.
static MEMORY_OUTPUTS: Lazy<Mutex<HashSet<String>>> = Lazy::new(|| Mutex::new(HashSet::new()));

fn memory_outputs() -> std::sync::MutexGuard<'static, HashSet<String>> {
    MEMORY_OUTPUTS.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Forgets every in-memory output.
pub fn clear_memory_outputs() {
    memory_outputs().clear();
}

pub fn has_memory_output(task_id: &str) -> bool {
    memory_outputs().contains(task_id)
}

pub fn register(catalog: &mut Catalog) -> Result<(), RegistryError> {
    catalog.register_task(
        Declaration::task("SomeTask")
            .describe("Marks its in-memory output done")
            .param(ParamSpec::int("n")),
        SomeTask,
    )?;

    catalog.register_task(Declaration::task("AmbiguousClass"), NoopUnit)?;
    catalog.register_task(Declaration::task("AmbiguousClass"), NoopUnit)?;

    catalog.register_task(
        Declaration::task("TaskWithSameName").slot("demo::TaskWithSameName"),
        Answer(42),
    )?;
    catalog.register_task(
        Declaration::task("TaskWithSameName").slot("demo::TaskWithSameName"),
        Answer(43),
    )?;

    catalog.register_task(
        Declaration::task("WriteToFile")
            .describe("Writes a line to a file")
            .param(ParamSpec::str("filename").describe("File to create")),
        WriteToFile,
    )?;

    let foo_base = catalog.register_task(
        Declaration::task("FooBaseClass").param(ParamSpec::str("x").default("foo_base_default")),
        NoopUnit,
    )?;
    catalog.register_task(Declaration::task("FooSubClass").extends(&foo_base), NoopUnit)?;

    catalog.register_task(Declaration::task("ATaskThatFails"), ATaskThatFails)?;

    catalog.register_config(Declaration::config("RequiredConfig").param(ParamSpec::str("required_test_param")))?;
    catalog.register_task(
        Declaration::task("TaskThatRequiresConfig").uses("RequiredConfig"),
        TaskThatRequiresConfig,
    )?;
    catalog.register_task(Declaration::task("SubTaskThatFails"), SubTaskThatFails)?;

    catalog.register_task(
        Declaration::task("Daily")
            .describe("One unit of daily work")
            .param(ParamSpec::date("date")),
        Daily,
    )?;
    Ok(())
}

struct SomeTask;

impl WorkUnit for SomeTask {
    fn complete(&self, context: &UnitContext<'_>) -> Result<bool> {
        Ok(has_memory_output(&context.task_id()))
    }

    fn run(&self, context: &UnitContext<'_>) -> Result<()> {
        memory_outputs().insert(context.task_id());
        Ok(())
    }
}

struct Answer(i64);

impl WorkUnit for Answer {
    fn run(&self, context: &UnitContext<'_>) -> Result<()> {
        info!(task = %context.task_id(), answer = self.0, "answered");
        Ok(())
    }
}

struct WriteToFile;

impl WriteToFile {
    fn filename<'a>(context: &'a UnitContext<'_>) -> Result<&'a Path> {
        context
            .instance()
            .str("filename")
            .map(Path::new)
            .ok_or_else(|| anyhow!("no filename was given"))
    }
}

impl WorkUnit for WriteToFile {
    fn complete(&self, context: &UnitContext<'_>) -> Result<bool> {
        Ok(Self::filename(context)?.exists())
    }

    fn run(&self, context: &UnitContext<'_>) -> Result<()> {
        let path = Self::filename(context)?;
        fs::write(path, "foo\n").with_context(|| format!("writing {}", path.display()))
    }
}

struct ATaskThatFails;

impl WorkUnit for ATaskThatFails {
    fn run(&self, _context: &UnitContext<'_>) -> Result<()> {
        bail!("the value was rejected")
    }
}

struct TaskThatRequiresConfig;

impl WorkUnit for TaskThatRequiresConfig {
    fn requires(&self, context: &UnitContext<'_>) -> Result<Vec<TaskRequest>> {
        let config = context.config("RequiredConfig")?;
        if config.str("required_test_param") == Some("A") {
            return Ok(vec![TaskRequest::new("SubTaskThatFails")]);
        }
        Ok(Vec::new())
    }

    fn run(&self, _context: &UnitContext<'_>) -> Result<()> {
        Ok(())
    }
}

struct SubTaskThatFails;

impl WorkUnit for SubTaskThatFails {
    fn run(&self, _context: &UnitContext<'_>) -> Result<()> {
        bail!("the subtask failed")
    }
}

struct Daily;

impl WorkUnit for Daily {
    fn complete(&self, context: &UnitContext<'_>) -> Result<bool> {
        Ok(has_memory_output(&context.task_id()))
    }

    fn run(&self, context: &UnitContext<'_>) -> Result<()> {
        memory_outputs().insert(context.task_id());
        Ok(())
    }
}
