//! Definitions every process carries.
//!
//! Registration is idempotent: each declaration has a fixed site, so calling
//! [`register`] again replaces the records in place.

use anyhow::{Result, anyhow, bail};
use chrono::{Local, NaiveDate};
use taskrun_registry::{Declaration, ParamSpec, RegistryError};
use tracing::info;

use crate::{Catalog, TaskRequest, UnitContext, WorkUnit};

pub const CORE: &str = "core";
pub const WORKER: &str = "worker";
pub const EXECUTION_SUMMARY: &str = "execution_summary";
pub const RETCODE: &str = "retcode";

pub const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

pub fn register(catalog: &mut Catalog) -> Result<(), RegistryError> {
    catalog.register_config(
        Declaration::config(CORE)
            .describe("Process-wide settings")
            .param(
                ParamSpec::choice("log_level", LOG_LEVELS)
                    .default("info")
                    .describe("Log level, overridden by RUST_LOG"),
            )
            .param(ParamSpec::str("lock_pid_dir").optional().describe("Directory for process lock files"))
            .param(ParamSpec::str("default_scheduler_host").default("localhost"))
            .param(ParamSpec::int("default_scheduler_port").default(8082)),
    )?;
    catalog.register_config(
        Declaration::config(WORKER).param(
            ParamSpec::bool("check_complete_on_run").describe("Fail tasks that are still incomplete after running"),
        ),
    )?;
    catalog.register_config(
        Declaration::config(EXECUTION_SUMMARY)
            .param(ParamSpec::bool("enabled").default(true).describe("Print the summary after a run"))
            .param(ParamSpec::int("summary_length").default(5).describe("Tasks listed per outcome group")),
    )?;
    catalog.register_config(
        Declaration::config(RETCODE)
            .describe("Process exit codes")
            .param(ParamSpec::int("task_failed").default(1))
            .param(ParamSpec::int("already_running").default(1))
            .param(ParamSpec::int("scheduling_error").default(1)),
    )?;

    let range_base = catalog.register_task(
        Declaration::task("RangeBase")
            .describe("Requires one instance of another task per point of a range")
            .param(ParamSpec::str("of").describe("Name of the task to require"))
            .param(ParamSpec::str("param_name").default("date").describe("Parameter of `of` that receives each point"))
            .param(ParamSpec::bool("reverse").describe("Require the latest points first"))
            .param(ParamSpec::int("task_limit").default(50).describe("Most instances to require")),
        AbstractRange,
    )?;
    catalog.register_task(
        Declaration::task("RangeDaily")
            .extends(&range_base)
            .describe("Requires one instance of `of` per day in [start, stop)")
            .param(ParamSpec::date("start").describe("First day"))
            .param(ParamSpec::date("stop").optional().describe("Day after the last day, today when unset")),
        RangeDaily,
    )?;
    Ok(())
}

struct AbstractRange;

impl WorkUnit for AbstractRange {
    fn requires(&self, context: &UnitContext<'_>) -> Result<Vec<TaskRequest>> {
        bail!("{} has no points of its own; use RangeDaily", context.instance().name())
    }

    fn run(&self, _context: &UnitContext<'_>) -> Result<()> {
        Ok(())
    }
}

struct RangeDaily;

impl RangeDaily {
    fn days(context: &UnitContext<'_>) -> Result<Vec<NaiveDate>> {
        let instance = context.instance();
        let start = instance.date("start").ok_or_else(|| anyhow!("a start date is required"))?;
        let stop = instance.date("stop").unwrap_or_else(|| Local::now().date_naive());
        if stop < start {
            bail!("stop {stop} is before start {start}");
        }
        let mut days: Vec<NaiveDate> = start.iter_days().take_while(|day| *day < stop).collect();
        if instance.bool("reverse").unwrap_or(false) {
            days.reverse();
        }
        let limit = usize::try_from(instance.int("task_limit").unwrap_or(50)).unwrap_or(0);
        days.truncate(limit);
        Ok(days)
    }
}

impl WorkUnit for RangeDaily {
    fn requires(&self, context: &UnitContext<'_>) -> Result<Vec<TaskRequest>> {
        let instance = context.instance();
        let of = instance.str("of").ok_or_else(|| anyhow!("the task to require is not set"))?;
        let param_name = instance.str("param_name").unwrap_or("date");
        Ok(Self::days(context)?
            .into_iter()
            .map(|day| TaskRequest::new(of).with(param_name, day))
            .collect())
    }

    fn run(&self, context: &UnitContext<'_>) -> Result<()> {
        info!(range = %context.task_id(), "every day in the range is complete");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use taskrun_registry::{LookupError, ParamValue};

    use super::*;
    use crate::{LocalScheduler, RunOptions, TaskOutcome, executor::Executor};

    struct Daily;

    impl WorkUnit for Daily {
        fn run(&self, _context: &UnitContext<'_>) -> Result<()> {
            Ok(())
        }
    }

    fn catalog() -> Catalog {
        let mut catalog = Catalog::new();
        register(&mut catalog).unwrap();
        catalog
            .register_task(Declaration::task("Daily").param(ParamSpec::date("date")), Daily)
            .unwrap();
        catalog
    }

    fn range(start: &str, stop: &str) -> TaskRequest {
        TaskRequest::new("RangeDaily")
            .with("of", "Daily")
            .with("start", NaiveDate::parse_from_str(start, "%Y-%m-%d").unwrap())
            .with("stop", NaiveDate::parse_from_str(stop, "%Y-%m-%d").unwrap())
    }

    #[test]
    fn range_daily_requires_one_instance_per_day() {
        let catalog = catalog();
        let instance = catalog.bind(&range("2012-06-01", "2012-06-04")).unwrap();
        let requests = RangeDaily.requires(&UnitContext::new(&instance, &catalog)).unwrap();
        let days: Vec<String> = requests.iter().map(ToString::to_string).collect();
        assert_eq!(days, vec!["Daily(date=2012-06-01)", "Daily(date=2012-06-02)", "Daily(date=2012-06-03)"]);
    }

    #[test]
    fn range_daily_runs_every_day_then_itself() {
        let catalog = catalog();
        let root = catalog.bind(&range("2012-06-01", "2012-06-03")).unwrap();
        let report = LocalScheduler.execute(
            &catalog,
            vec![root],
            &RunOptions {
                no_lock: true,
                ..RunOptions::default()
            },
        );
        assert!(report.success());
        assert_eq!(report.outcome("Daily(date=2012-06-02)"), Some(TaskOutcome::Completed));
        assert_eq!(report.tasks.len(), 3);
    }

    #[test]
    fn reverse_and_limit_shape_the_range() {
        let catalog = catalog();
        let request = range("2012-06-01", "2012-06-10").with("reverse", true).with("task_limit", 2);
        let instance = catalog.bind(&request).unwrap();
        let requests = RangeDaily.requires(&UnitContext::new(&instance, &catalog)).unwrap();
        assert_eq!(
            requests[0].overrides.get("date"),
            Some(&ParamValue::Date(NaiveDate::from_ymd_opt(2012, 6, 9).unwrap()))
        );
        assert_eq!(requests.len(), 2);
    }

    #[test]
    fn registration_is_idempotent() {
        let mut catalog = catalog();
        let before = catalog.registry().len();
        register(&mut catalog).unwrap();
        assert_eq!(catalog.registry().len(), before);
        let summary: Arc<_> = catalog.config(EXECUTION_SUMMARY).unwrap();
        assert_eq!(summary.bool("enabled"), Some(true));
        assert!(matches!(catalog.config("RangeDaily"), Err(LookupError::Resolve(_))));
    }
}
