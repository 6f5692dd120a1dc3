//! The invocation state machine behind the `taskrun` binaries.
//!
//! An invocation moves through `Start -> Resolve -> Bind -> Construct ->
//! Delegate` and ends in `Done` or `Failed`. Resolution and binding problems
//! never reach the engine: they are printed as a usage line plus one
//! paragraph and exit with status 2. Failures inside work units come back in
//! the [`RunReport`] and are reported with the unit's own message.

use std::{
    fmt,
    io::Write,
    path::PathBuf,
};

use indexmap::IndexMap;
use taskrun_engine::{
    Catalog, Executor, FailureKind, LocalScheduler, RunOptions, RunReport, TaskRequest, builtins, default_lock_dir,
    deps, summary,
};
use taskrun_registry::{
    ArgumentBinder, BindError, BoundInstance, CommandLineValues, ConfigError, ConfigFile, DefinitionRecord,
    GlobalOptions, GrammarScope, LookupError, ResolveError, Resolver, bind_instance,
};
use thiserror::Error;
use tracing::{debug, info};

use crate::{logging, modules::ModuleLoader};

pub const PROGRAM: &str = "taskrun";

/// Exit status for resolve, bind and usage errors.
pub const USAGE_EXIT_CODE: i32 = 2;
/// Exit status when `--module` cannot be loaded.
pub const MODULE_LOAD_EXIT_CODE: i32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Start,
    Resolve,
    Bind,
    Construct,
    Delegate,
    Done,
    Failed,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Start => "start",
            Phase::Resolve => "resolve",
            Phase::Bind => "bind",
            Phase::Construct => "construct",
            Phase::Delegate => "delegate",
            Phase::Done => "done",
            Phase::Failed => "failed",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error)]
pub enum InvocationError {
    #[error(transparent)]
    Resolve(#[from] ResolveError),

    #[error(transparent)]
    Bind(#[from] BindError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Could not load module '{module}': {reason}")]
    ModuleLoad { module: String, reason: String },

    #[error("{unit} failed: {cause}")]
    ExecutionFailure { unit: String, cause: String },

    #[error("Could not schedule the dependencies of {unit}: {cause}")]
    Scheduling { unit: String, cause: String },

    #[error("Another process is already running these tasks")]
    AlreadyRunning,
}

impl From<LookupError> for InvocationError {
    fn from(error: LookupError) -> Self {
        match error {
            LookupError::Resolve(error) => InvocationError::Resolve(error),
            LookupError::Bind(error) => InvocationError::Bind(error),
        }
    }
}

impl InvocationError {
    pub fn exit_code(&self, codes: &ExitCodes) -> i32 {
        match self {
            InvocationError::Resolve(_) | InvocationError::Bind(_) | InvocationError::Config(_) => USAGE_EXIT_CODE,
            InvocationError::ModuleLoad { .. } => MODULE_LOAD_EXIT_CODE,
            InvocationError::ExecutionFailure { .. } => codes.task_failed,
            InvocationError::Scheduling { .. } => codes.scheduling_error,
            InvocationError::AlreadyRunning => codes.already_running,
        }
    }

    /// Whether the usage line belongs above the message.
    fn is_usage_error(&self) -> bool {
        matches!(
            self,
            InvocationError::Resolve(_) | InvocationError::Bind(_) | InvocationError::Config(_)
        )
    }

    /// Maps a finished run to the error it ends the invocation with, if any.
    pub fn from_report(report: &RunReport) -> Option<Self> {
        if report.lock_held {
            return Some(InvocationError::AlreadyRunning);
        }
        if let Some(failure) = report
            .failures
            .iter()
            .find(|failure| failure.error_kind == FailureKind::Scheduling)
        {
            return Some(InvocationError::Scheduling {
                unit: failure.unit.clone(),
                cause: failure.message.clone(),
            });
        }
        report
            .first_execution_failure()
            .map(|failure| InvocationError::ExecutionFailure {
                unit: failure.unit.clone(),
                cause: failure.message.clone(),
            })
    }
}

/// Exit statuses read from the `retcode` configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitCodes {
    pub task_failed: i32,
    pub already_running: i32,
    pub scheduling_error: i32,
}

impl Default for ExitCodes {
    fn default() -> Self {
        Self {
            task_failed: 1,
            already_running: 1,
            scheduling_error: 1,
        }
    }
}

impl ExitCodes {
    pub fn from_config(retcode: &BoundInstance) -> Self {
        let defaults = Self::default();
        let read = |name: &str, fallback: i32| {
            retcode
                .int(name)
                .and_then(|code| i32::try_from(code).ok())
                .unwrap_or(fallback)
        };
        Self {
            task_failed: read("task_failed", defaults.task_failed),
            already_running: read("already_running", defaults.already_running),
            scheduling_error: read("scheduling_error", defaults.scheduling_error),
        }
    }
}

/// Knobs for callers embedding the orchestrator.
#[derive(Debug, Clone, Default)]
pub struct InvocationOptions {
    /// Task run when the command line names none
    pub default_target: Option<String>,
    pub force_local_scheduler: bool,
    pub no_lock: bool,
    /// Configuration file to read instead of the default location; a missing
    /// file is an empty configuration
    pub config_path: Option<PathBuf>,
}

/// How an invocation ended.
#[derive(Debug)]
pub struct InvocationOutcome {
    pub phase: Phase,
    /// Phase the invocation was in when it failed
    pub failed_in: Option<Phase>,
    pub exit_code: i32,
    pub report: Option<RunReport>,
    pub error: Option<InvocationError>,
}

impl InvocationOutcome {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Run,
    Tree,
}

/// Drives one invocation against a catalog.
pub struct Orchestrator {
    loader: Box<dyn ModuleLoader>,
    executor: Box<dyn Executor>,
    options: InvocationOptions,
}

impl Orchestrator {
    pub fn new(loader: impl ModuleLoader + 'static) -> Self {
        Self {
            loader: Box::new(loader),
            executor: Box::new(LocalScheduler),
            options: InvocationOptions::default(),
        }
    }

    pub fn with_executor(mut self, executor: impl Executor + 'static) -> Self {
        self.executor = Box::new(executor);
        self
    }

    pub fn with_options(mut self, options: InvocationOptions) -> Self {
        self.options = options;
        self
    }

    /// Runs the task named on the command line.
    ///
    /// Help and the summary go to `out`; errors go to `err`.
    pub fn run(&self, catalog: &mut Catalog, args: &[String], out: &mut dyn Write, err: &mut dyn Write) -> InvocationOutcome {
        self.invoke(catalog, args, Mode::Run, out, err)
    }

    /// Prints the dependency tree of the task named on the command line
    /// instead of running it.
    pub fn print_tree(
        &self,
        catalog: &mut Catalog,
        args: &[String],
        out: &mut dyn Write,
        err: &mut dyn Write,
    ) -> InvocationOutcome {
        self.invoke(catalog, args, Mode::Tree, out, err)
    }

    /// Runs task requests without a command line.
    ///
    /// Parameters not named in a request come from the configuration file or
    /// their defaults. Unit failures are in the returned report.
    pub fn build(&self, catalog: &mut Catalog, requests: &[TaskRequest]) -> Result<RunReport, InvocationError> {
        self.prepare(catalog)?;
        let catalog = &*catalog;
        catalog.configs().install_command_line(CommandLineValues::new(None));
        self.setup_logging(catalog)?;

        let mut roots = Vec::with_capacity(requests.len());
        for request in requests {
            let root = catalog.bind(request)?;
            construct_configs(catalog, root.record())?;
            roots.push(root);
        }
        let options = self.run_options(catalog, &GlobalOptions::default())?;
        info!(roots = roots.len(), "delegating built tasks");
        Ok(self.executor.execute(catalog, roots, &options))
    }

    fn invoke(
        &self,
        catalog: &mut Catalog,
        args: &[String],
        mode: Mode,
        out: &mut dyn Write,
        err: &mut dyn Write,
    ) -> InvocationOutcome {
        let mut phase = Phase::Start;
        let result = self.advance(catalog, args, mode, out, &mut phase);
        let report = match result {
            Ok(report) => report,
            Err(error) => return self.fail(catalog, phase, error, None, err),
        };
        match report.as_ref().and_then(InvocationError::from_report) {
            Some(error) => self.fail(catalog, Phase::Delegate, error, report, err),
            None => {
                debug!(phase = %Phase::Done, "invocation finished");
                InvocationOutcome {
                    phase: Phase::Done,
                    failed_in: None,
                    exit_code: 0,
                    report,
                    error: None,
                }
            }
        }
    }

    /// Moves through the phases, recording the current one in `phase`.
    fn advance(
        &self,
        catalog: &mut Catalog,
        args: &[String],
        mode: Mode,
        out: &mut dyn Write,
        phase: &mut Phase,
    ) -> Result<Option<RunReport>, InvocationError> {
        self.prepare(catalog)?;
        if let Some(module) = ArgumentBinder::scan_module(args) {
            self.loader
                .load(&module, catalog)
                .map_err(|error| InvocationError::ModuleLoad {
                    module: module.clone(),
                    reason: format!("{error:#}"),
                })?;
            debug!(module = %module, "loaded module");
        }
        let catalog = &*catalog;
        let binder = ArgumentBinder::new(catalog.registry(), PROGRAM);

        *phase = Phase::Resolve;
        let requested = binder.scan_target(args);
        let primary = match Resolver::new(catalog.registry())
            .resolve(requested.as_deref(), self.options.default_target.as_deref())
        {
            Ok(record) => Some(record),
            Err(ResolveError::NoTargetSpecified) if wants_help(args) => None,
            Err(error) => return Err(error.into()),
        };

        *phase = Phase::Bind;
        let parsed = binder.parse(args, primary.as_deref())?;
        if parsed.globals.help || parsed.globals.help_all {
            let scope = if parsed.globals.help_all {
                GrammarScope::All
            } else {
                GrammarScope::Primary
            };
            emit(out, format_args!("{}", binder.help(primary.as_deref(), scope)));
            return Ok(None);
        }
        let Some(primary) = primary else {
            return Err(ResolveError::NoTargetSpecified.into());
        };
        catalog.configs().install_command_line(parsed.values);
        self.setup_logging(catalog)?;
        debug!(phase = %phase, task = %primary.name, "bound command line");

        *phase = Phase::Construct;
        let root = bind_instance(&primary, &IndexMap::new(), &catalog.configs().sources())?;
        construct_configs(catalog, &primary)?;
        debug!(phase = %phase, task = %root.task_id(), "constructed instance");

        *phase = Phase::Delegate;
        match mode {
            Mode::Tree => {
                let tree = deps::render_tree(catalog, &root).map_err(|error| InvocationError::Scheduling {
                    unit: root.task_id(),
                    cause: format!("{error:#}"),
                })?;
                emit(out, format_args!("{tree}"));
                Ok(None)
            }
            Mode::Run => {
                let options = self.run_options(catalog, &parsed.globals)?;
                info!(task = %root.task_id(), local_scheduler = options.local_scheduler, "delegating");
                let report = self.executor.execute(catalog, vec![root], &options);
                self.print_summary(catalog, &report, out);
                Ok(Some(report))
            }
        }
    }

    /// Registers the built-in definitions and reads the configuration file.
    fn prepare(&self, catalog: &mut Catalog) -> Result<(), InvocationError> {
        builtins::register(catalog).map_err(|error| InvocationError::ModuleLoad {
            module: "builtins".to_string(),
            reason: error.to_string(),
        })?;
        let config_file = match &self.options.config_path {
            Some(path) if path.exists() => ConfigFile::load_from(path)?,
            Some(_) => ConfigFile::default(),
            None => ConfigFile::load()?,
        };
        catalog.configs().set_config_file(config_file);
        Ok(())
    }

    fn setup_logging(&self, catalog: &Catalog) -> Result<(), InvocationError> {
        let core = catalog.config(builtins::CORE)?;
        logging::setup(core.str("log_level").unwrap_or("info"));
        Ok(())
    }

    fn run_options(&self, catalog: &Catalog, globals: &GlobalOptions) -> Result<RunOptions, InvocationError> {
        let core = catalog.config(builtins::CORE)?;
        let worker = catalog.config(builtins::WORKER)?;
        let host = core.str("default_scheduler_host").unwrap_or("localhost");
        let port = core.int("default_scheduler_port").unwrap_or(8082);
        Ok(RunOptions {
            local_scheduler: globals.local_scheduler || self.options.force_local_scheduler,
            no_lock: globals.no_lock || self.options.no_lock,
            lock_dir: core.str("lock_pid_dir").map(PathBuf::from).unwrap_or_else(default_lock_dir),
            scheduler_address: format!("{host}:{port}"),
            check_complete_on_run: worker.bool("check_complete_on_run").unwrap_or(false),
        })
    }

    fn print_summary(&self, catalog: &Catalog, report: &RunReport, out: &mut dyn Write) {
        let Ok(settings) = catalog.config(builtins::EXECUTION_SUMMARY) else {
            return;
        };
        if !settings.bool("enabled").unwrap_or(true) {
            return;
        }
        let length = usize::try_from(settings.int("summary_length").unwrap_or(5)).unwrap_or(0);
        emit(out, format_args!("{}", summary::render(report, &catalog.all_configs(), length)));
    }

    fn fail(
        &self,
        catalog: &Catalog,
        phase: Phase,
        error: InvocationError,
        report: Option<RunReport>,
        err: &mut dyn Write,
    ) -> InvocationOutcome {
        if error.is_usage_error() {
            let usage = ArgumentBinder::new(catalog.registry(), PROGRAM).usage();
            emit(err, format_args!("{}\n", usage.trim_end()));
        }
        emit(err, format_args!("error: {error}\n"));

        let codes = catalog
            .config(builtins::RETCODE)
            .map(|retcode| ExitCodes::from_config(&retcode))
            .unwrap_or_default();
        let exit_code = error.exit_code(&codes);
        debug!(phase = %phase, exit_code, "invocation failed");
        InvocationOutcome {
            phase: Phase::Failed,
            failed_in: Some(phase),
            exit_code,
            report,
            error: Some(error),
        }
    }
}

/// Writes to an output stream. The invocation outcome does not depend on
/// whether the stream is still open.
fn emit(stream: &mut dyn Write, text: fmt::Arguments<'_>) {
    if let Err(error) = stream.write_fmt(text) {
        debug!(error = %error, "could not write output");
    }
}

/// Binds every configuration singleton the definition reads.
fn construct_configs(catalog: &Catalog, record: &DefinitionRecord) -> Result<(), InvocationError> {
    for config_name in &record.uses {
        catalog.config(config_name)?;
    }
    Ok(())
}

fn wants_help(args: &[String]) -> bool {
    args.iter()
        .take_while(|token| *token != "--")
        .any(|token| token == "--help" || token == "--help-all")
}

#[cfg(test)]
mod tests {
    use super::*;
    use taskrun_engine::UnitFailure;

    #[test]
    fn exit_codes_follow_the_error_kind() {
        let codes = ExitCodes {
            task_failed: 4,
            already_running: 5,
            scheduling_error: 6,
        };
        assert_eq!(InvocationError::from(ResolveError::NoTargetSpecified).exit_code(&codes), 2);
        let module = InvocationError::ModuleLoad {
            module: "nope".into(),
            reason: "missing".into(),
        };
        assert_eq!(module.exit_code(&codes), 3);
        assert_eq!(InvocationError::AlreadyRunning.exit_code(&codes), 5);
    }

    #[test]
    fn scheduling_failures_win_over_execution_failures() {
        let mut report = RunReport::default();
        report.failures.push(UnitFailure {
            unit: "A()".into(),
            error_kind: FailureKind::Error,
            message: "boom".into(),
        });
        report.failures.push(UnitFailure {
            unit: "B()".into(),
            error_kind: FailureKind::Scheduling,
            message: "no task named 'C'".into(),
        });
        let error = InvocationError::from_report(&report).unwrap();
        assert!(matches!(error, InvocationError::Scheduling { ref unit, .. } if unit == "B()"));
        assert!(InvocationError::from_report(&RunReport::default()).is_none());
    }

    #[test]
    fn help_is_not_looked_for_after_the_separator() {
        let args: Vec<String> = ["SomeTask", "--", "--help"].iter().map(ToString::to_string).collect();
        assert!(!wants_help(&args));
        assert!(wants_help(&["--help-all".to_string()]));
    }
}
