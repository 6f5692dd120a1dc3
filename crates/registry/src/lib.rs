//! Registry crate for task and configuration definitions.
//!
//! This crate holds the process-wide definition registry and everything that
//! turns an argument vector into bound instances: flag naming, name
//! resolution, the Clap-backed argument binder and the configuration store.

pub mod binder;
pub mod clap_builder;
pub mod config;
pub mod config_store;
pub mod errors;
pub mod instance;
pub mod models;
pub mod namespace;
pub mod resolver;

pub use binder::{ArgumentBinder, BindingSources, CommandLineValues, GlobalOptions, ParsedCommandLine, bind_instance};
pub use config::{CONFIG_PATH_ENV, ConfigError, ConfigFile, default_config_path};
pub use config_store::ConfigStore;
pub use errors::{BindError, LookupError, RegistryError, ResolveError};
pub use instance::{BoundInstance, ValueSource};
pub use models::{Declaration, DefinitionRecord, DefinitionRegistry, Registration};
pub use namespace::{FlagEntry, FlagTable, FlagTarget, GrammarScope, Namespacer, RESERVED_FLAGS};
pub use resolver::{MAX_SUGGESTION_DISTANCE, Resolver};
pub use taskrun_types::{
    DateInterval, DefinitionId, DefinitionKind, ParamKind, ParamSpec, ParamValue, ParameterDescriptor, Provenance,
};
