//! # Taskrun
//!
//! Command-line front end: loads modules, resolves the task named on the
//! command line, binds its parameters and hands it to the local scheduler.

pub mod logging;
pub mod modules;
pub mod orchestrator;

pub use modules::{ModuleLoader, StaticModules};
pub use orchestrator::{
    ExitCodes, InvocationError, InvocationOptions, InvocationOutcome, Orchestrator, PROGRAM, Phase,
};
