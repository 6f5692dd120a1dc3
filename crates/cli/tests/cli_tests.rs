use std::{
    fs,
    io::{self, Write},
    path::PathBuf,
};

use taskrun::{InvocationError, InvocationOptions, InvocationOutcome, Orchestrator, Phase, modules};
use taskrun_engine::{Catalog, TaskOutcome, TaskRequest};
use taskrun_registry::CONFIG_PATH_ENV;

struct Invocation {
    outcome: InvocationOutcome,
    stdout: String,
    stderr: String,
}

fn args(tokens: &[&str]) -> Vec<String> {
    tokens.iter().map(ToString::to_string).collect()
}

fn options(config_path: PathBuf) -> InvocationOptions {
    InvocationOptions {
        force_local_scheduler: true,
        no_lock: true,
        config_path: Some(config_path),
        ..InvocationOptions::default()
    }
}

fn invoke_in(catalog: &mut Catalog, options: InvocationOptions, tokens: &[&str]) -> Invocation {
    let orchestrator = Orchestrator::new(modules::shipped()).with_options(options);
    let mut stdout = Vec::new();
    let mut stderr = Vec::new();
    let outcome = orchestrator.run(catalog, &args(tokens), &mut stdout, &mut stderr);
    Invocation {
        outcome,
        stdout: String::from_utf8_lossy(&stdout).into_owned(),
        stderr: String::from_utf8_lossy(&stderr).into_owned(),
    }
}

fn invoke(tokens: &[&str]) -> Invocation {
    let dir = tempfile::tempdir().unwrap();
    invoke_in(&mut Catalog::new(), options(dir.path().join("absent.json")), tokens)
}

#[test]
fn runs_a_task_from_the_demo_module() {
    let run = invoke(&["--module", "demo", "SomeTask", "--n", "4101"]);
    assert!(run.outcome.success(), "{}", run.stderr);
    assert_eq!(run.outcome.phase, Phase::Done);
    assert!(modules::demo::has_memory_output("SomeTask(n=4101)"));
    assert!(run.stdout.contains("* 1 ran successfully:"), "{}", run.stdout);
    assert!(run.stdout.contains(":) because there were no failed tasks"), "{}", run.stdout);
}

#[test]
fn same_name_at_two_sites_is_ambiguous() {
    let run = invoke(&["--module", "demo", "AmbiguousClass"]);
    assert_eq!(run.outcome.exit_code, 2);
    assert_eq!(run.outcome.failed_in, Some(Phase::Resolve));
    assert!(run.stderr.contains("Ambiguous task name 'AmbiguousClass'"), "{}", run.stderr);
    assert!(run.stderr.starts_with("Usage: taskrun"), "{}", run.stderr);
    assert!(run.outcome.report.is_none());
}

#[test]
fn redeclaration_in_place_stays_runnable_across_reloads() {
    let dir = tempfile::tempdir().unwrap();
    let mut catalog = Catalog::new();
    let first = invoke_in(&mut catalog, options(dir.path().join("absent.json")), &["--module", "demo", "TaskWithSameName"]);
    assert!(first.outcome.success(), "{}", first.stderr);
    let names = catalog.registry().len();

    let second = invoke_in(&mut catalog, options(dir.path().join("absent.json")), &["--module", "demo", "TaskWithSameName"]);
    assert!(second.outcome.success(), "{}", second.stderr);
    assert_eq!(catalog.registry().len(), names);
}

#[test]
fn help_all_lists_qualified_flags_only() {
    let run = invoke(&["--module", "demo", "--help-all"]);
    assert!(run.outcome.success(), "{}", run.stderr);
    assert!(run.stdout.contains("--FooBaseClass-x"), "{}", run.stdout);
    assert!(!run.stdout.contains("--x"), "{}", run.stdout);
    assert!(run.stdout.contains("--RequiredConfig-required-test-param"), "{}", run.stdout);
}

#[test]
fn help_for_a_task_shows_bare_and_qualified_flags() {
    let run = invoke(&["--module", "demo", "FooBaseClass", "--help"]);
    assert!(run.outcome.success(), "{}", run.stderr);
    assert!(run.stdout.contains("--FooBaseClass-x"), "{}", run.stdout);
    assert!(run.stdout.lines().any(|line| line.trim_start().starts_with("--x ")), "{}", run.stdout);
}

#[test]
fn subclass_help_offers_the_inherited_parameter() {
    let run = invoke(&["--module", "demo", "FooSubClass", "--help"]);
    assert!(run.outcome.success(), "{}", run.stderr);
    assert!(run.stdout.lines().any(|line| line.trim_start().starts_with("--x ")), "{}", run.stdout);
    assert!(run.stdout.contains("--FooBaseClass-x"), "{}", run.stdout);
}

#[test]
fn plain_help_is_short_and_help_all_is_longer() {
    let short = invoke(&["--help"]);
    let long = invoke(&["--help-all"]);
    assert!(short.outcome.success() && long.outcome.success());
    assert!(short.stdout.lines().count() <= 15, "{}", short.stdout);
    assert!(long.stdout.lines().count() > short.stdout.lines().count(), "{}", long.stdout);
}

#[test]
fn misspelled_task_gets_a_suggestion() {
    let run = invoke(&["RangeDaili"]);
    assert_eq!(run.outcome.exit_code, 2);
    assert!(run.stderr.contains("Did you mean 'RangeDaily'?"), "{}", run.stderr);
    assert!(matches!(run.outcome.error, Some(InvocationError::Resolve(_))));
}

#[test]
fn missing_target_is_reported() {
    let run = invoke(&[]);
    assert_eq!(run.outcome.exit_code, 2);
    assert!(run.stderr.contains("No task specified"), "{}", run.stderr);
}

#[test]
fn default_target_applies_when_none_is_named() {
    let dir = tempfile::tempdir().unwrap();
    let options = InvocationOptions {
        default_target: Some("FooBaseClass".to_string()),
        ..options(dir.path().join("absent.json"))
    };
    let run = invoke_in(&mut Catalog::new(), options, &["--module", "demo", "--FooBaseClass-x", "chosen"]);
    assert!(run.outcome.success(), "{}", run.stderr);
    let report = run.outcome.report.unwrap();
    assert_eq!(report.outcome("FooBaseClass(x=chosen)"), Some(TaskOutcome::Completed));
}

#[test]
fn unknown_flag_fails_binding() {
    let run = invoke(&["--module", "demo", "SomeTask", "--n", "1", "--bogus"]);
    assert_eq!(run.outcome.exit_code, 2);
    assert_eq!(run.outcome.failed_in, Some(Phase::Bind));
    assert!(run.stderr.contains("Unrecognized argument '--bogus'"), "{}", run.stderr);
}

#[test]
fn invalid_value_names_the_flag() {
    let run = invoke(&["--module", "demo", "SomeTask", "--n", "many"]);
    assert_eq!(run.outcome.exit_code, 2);
    assert!(run.stderr.contains("'--n'"), "{}", run.stderr);
}

#[test]
fn unknown_module_is_a_module_load_error() {
    let run = invoke(&["--module", "nope", "SomeTask"]);
    assert_eq!(run.outcome.exit_code, 3);
    assert!(run.stderr.contains("Could not load module 'nope'"), "{}", run.stderr);
    assert!(!run.stderr.contains("No task named"), "{}", run.stderr);
}

#[test]
fn failure_report_carries_only_the_unit_message() {
    let run = invoke(&["--module", "demo", "ATaskThatFails"]);
    assert_eq!(run.outcome.exit_code, 1);
    assert_eq!(run.outcome.failed_in, Some(Phase::Delegate));
    assert_eq!(
        run.stderr.trim_end(),
        "error: ATaskThatFails() failed: the value was rejected"
    );
    assert!(run.stdout.contains("ATaskThatFails() (Error): the value was rejected"), "{}", run.stdout);
    assert!(!run.stdout.contains("orchestrator") && !run.stdout.contains(".rs:"), "{}", run.stdout);
}

#[test]
fn configuration_values_from_the_command_line_reach_units_and_summary() {
    let run = invoke(&[
        "--module",
        "demo",
        "TaskThatRequiresConfig",
        "--RequiredConfig-required-test-param",
        "B",
    ]);
    assert!(run.outcome.success(), "{}", run.stderr);
    assert!(
        run.stdout.contains("RequiredConfig.required_test_param=B (command line)"),
        "{}",
        run.stdout
    );

    let failing = invoke(&[
        "--module",
        "demo",
        "TaskThatRequiresConfig",
        "--RequiredConfig-required-test-param",
        "A",
    ]);
    assert_eq!(failing.outcome.exit_code, 1);
    let report = failing.outcome.report.unwrap();
    assert_eq!(report.outcome("SubTaskThatFails()"), Some(TaskOutcome::Failed));
    assert_eq!(report.outcome("TaskThatRequiresConfig()"), Some(TaskOutcome::UpstreamFailed));
}

#[test]
fn configuration_values_apply_without_a_declared_requirement() {
    let run = invoke(&[
        "--module",
        "demo",
        "SomeTask",
        "--n",
        "4103",
        "--RequiredConfig-required-test-param",
        "Z",
    ]);
    assert!(run.outcome.success(), "{}", run.stderr);
    assert!(modules::demo::has_memory_output("SomeTask(n=4103)"));
    assert!(
        run.stdout.contains("RequiredConfig.required_test_param=Z (command line)"),
        "{}",
        run.stdout
    );
}

#[test]
fn missing_required_configuration_fails_construction() {
    let run = invoke(&["--module", "demo", "TaskThatRequiresConfig"]);
    assert_eq!(run.outcome.exit_code, 2);
    assert_eq!(run.outcome.failed_in, Some(Phase::Construct));
    assert!(
        run.stderr.contains("'--RequiredConfig-required-test-param'"),
        "{}",
        run.stderr
    );
}

#[test]
fn configuration_file_supplies_values_and_exit_codes() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("taskrun.json");
    fs::write(
        &path,
        r#"{ "RequiredConfig": { "required-test-param": "B" }, "retcode": { "task_failed": 7 } }"#,
    )
    .unwrap();

    let run = invoke_in(&mut Catalog::new(), options(path.clone()), &["--module", "demo", "TaskThatRequiresConfig"]);
    assert!(run.outcome.success(), "{}", run.stderr);
    assert!(
        run.stdout.contains("RequiredConfig.required_test_param=B (config file)"),
        "{}",
        run.stdout
    );

    let failing = invoke_in(&mut Catalog::new(), options(path), &["--module", "demo", "ATaskThatFails"]);
    assert_eq!(failing.outcome.exit_code, 7);
}

#[test]
fn configuration_file_path_comes_from_the_environment() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("taskrun.yaml");
    fs::write(&path, "execution_summary:\n  enabled: false\n").unwrap();

    temp_env::with_var(CONFIG_PATH_ENV, Some(path.as_os_str()), || {
        let options = InvocationOptions {
            force_local_scheduler: true,
            no_lock: true,
            ..InvocationOptions::default()
        };
        let run = invoke_in(&mut Catalog::new(), options, &["--module", "demo", "FooBaseClass"]);
        assert!(run.outcome.success(), "{}", run.stderr);
        assert!(run.stdout.is_empty(), "{}", run.stdout);
    });
}

#[test]
fn range_daily_runs_one_task_per_day() {
    let run = invoke(&[
        "--module",
        "demo",
        "RangeDaily",
        "--of",
        "Daily",
        "--start",
        "2031-03-01",
        "--stop",
        "2031-03-04",
    ]);
    assert!(run.outcome.success(), "{}", run.stderr);
    let report = run.outcome.report.unwrap();
    for day in ["2031-03-01", "2031-03-02", "2031-03-03"] {
        assert_eq!(report.outcome(&format!("Daily(date={day})")), Some(TaskOutcome::Completed));
    }
    assert_eq!(report.tasks.len(), 4);
}

#[test]
fn unknown_requirement_is_a_scheduling_error() {
    let run = invoke(&[
        "--module",
        "demo",
        "RangeDaily",
        "--of",
        "Weekly",
        "--start",
        "2031-04-01",
        "--stop",
        "2031-04-02",
    ]);
    assert_eq!(run.outcome.exit_code, 1);
    assert!(matches!(run.outcome.error, Some(InvocationError::Scheduling { .. })));
    assert!(run.stdout.contains("scheduling failed"), "{}", run.stdout);
}

#[test]
fn build_runs_requests_without_a_command_line() {
    let dir = tempfile::tempdir().unwrap();
    let mut catalog = Catalog::new();
    modules::demo::register(&mut catalog).unwrap();
    let orchestrator = Orchestrator::new(modules::shipped()).with_options(options(dir.path().join("absent.json")));

    let report = orchestrator
        .build(
            &mut catalog,
            &[TaskRequest::new("SomeTask").with("n", 4102), TaskRequest::new("FooSubClass")],
        )
        .unwrap();
    assert!(report.success());
    assert!(modules::demo::has_memory_output("SomeTask(n=4102)"));
    assert_eq!(report.outcome("FooSubClass(x=foo_base_default)"), Some(TaskOutcome::Completed));

    let error = orchestrator
        .build(&mut catalog, &[TaskRequest::new("TaskThatRequiresConfig")])
        .unwrap_err();
    assert!(matches!(error, InvocationError::Bind(_)));
}

#[test]
fn dependency_tree_is_printed_instead_of_running() {
    let dir = tempfile::tempdir().unwrap();
    let orchestrator = Orchestrator::new(modules::shipped()).with_options(options(dir.path().join("absent.json")));
    let mut stdout = Vec::new();
    let mut stderr = Vec::new();
    let outcome = orchestrator.print_tree(
        &mut Catalog::new(),
        &args(&["--module", "demo", "RangeDaily", "--of", "Daily", "--start", "2031-05-01", "--stop", "2031-05-03"]),
        &mut stdout,
        &mut stderr,
    );
    assert!(outcome.success());
    let tree = String::from_utf8(stdout).unwrap();
    assert!(tree.contains("├── Daily(date=2031-05-01) [PENDING]"), "{tree}");
    assert!(tree.contains("└── Daily(date=2031-05-02) [PENDING]"), "{tree}");
    assert!(!modules::demo::has_memory_output("Daily(date=2031-05-01)"));
}

/// An output stream whose reader has gone away.
struct ClosedStream;

impl Write for ClosedStream {
    fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
        Err(io::Error::from(io::ErrorKind::BrokenPipe))
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[test]
fn closed_output_streams_do_not_change_the_outcome() {
    let dir = tempfile::tempdir().unwrap();
    let orchestrator = Orchestrator::new(modules::shipped()).with_options(options(dir.path().join("absent.json")));

    let outcome = orchestrator.run(
        &mut Catalog::new(),
        &args(&["--module", "demo", "SomeTask", "--n", "4104"]),
        &mut ClosedStream,
        &mut ClosedStream,
    );
    assert!(outcome.success());
    assert!(modules::demo::has_memory_output("SomeTask(n=4104)"));

    let failed = orchestrator.run(
        &mut Catalog::new(),
        &args(&["--module", "demo", "NoSuchTask"]),
        &mut ClosedStream,
        &mut ClosedStream,
    );
    assert_eq!(failed.exit_code, 2);
    assert_eq!(failed.failed_in, Some(Phase::Resolve));
}
