//! # Taskrun Engine
//!
//! Pairs task definitions with their behavior and runs bound instances
//! in-process.
//!
//! ## Usage
//!
//! ```rust
//! use taskrun_engine::{Catalog, Executor, LocalScheduler, RunOptions, TaskRequest, UnitContext, WorkUnit};
//! use taskrun_registry::{Declaration, ParamSpec};
//!
//! struct Greet;
//!
//! impl WorkUnit for Greet {
//!     fn run(&self, context: &UnitContext<'_>) -> anyhow::Result<()> {
//!         println!("hello {}", context.instance().str("name").unwrap_or("world"));
//!         Ok(())
//!     }
//! }
//!
//! let mut catalog = Catalog::new();
//! catalog.register_task(Declaration::task("Greet").param(ParamSpec::str("name").default("world")), Greet)?;
//! let root = catalog.bind(&TaskRequest::new("Greet").with("name", "taskrun"))?;
//! let options = RunOptions { no_lock: true, ..RunOptions::default() };
//! let report = LocalScheduler.execute(&catalog, vec![root], &options);
//! assert!(report.success());
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! ## Architecture
//!
//! - **`catalog`**: definitions, work units and configuration singletons
//! - **`unit`**: the `WorkUnit` trait and task requests
//! - **`executor`**: dependency planning and the local scheduler
//! - **`summary`** / **`deps`**: post-run summary and dependency tree rendering
//! - **`builtins`**: configuration and range definitions every process carries

pub mod builtins;
pub mod catalog;
pub mod deps;
pub mod executor;
pub mod report;
pub mod summary;
pub mod unit;

pub use catalog::Catalog;
pub use executor::{Executor, LocalScheduler, LockError, ProcessLock, RunOptions, default_lock_dir};
pub use report::{FailureKind, RunReport, TaskOutcome, TaskReport, UnitFailure};
pub use unit::{NoopUnit, TaskRequest, UnitContext, WorkUnit};
