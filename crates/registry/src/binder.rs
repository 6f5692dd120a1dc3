//! Two-pass command-line binding.
//!
//! The first pass only finds the positional task name, so the primary
//! definition can be resolved before a grammar exists. The second pass parses
//! the whole argument vector with Clap against the grammar built for that
//! primary. Binding then assigns every parameter a value from, in order, a
//! programmatic override, the command line, the configuration file, the
//! declared default.

use std::sync::Arc;

use clap::parser::ValueSource as ClapValueSource;
use indexmap::IndexMap;
use taskrun_types::{DefinitionId, ParamValue, ParameterDescriptor};
use tracing::debug;

use crate::{
    BindError, BoundInstance, ConfigFile, DefinitionRecord, DefinitionRegistry, ValueSource,
    clap_builder::{self, HELP_ALL_ID, HELP_ID, LOCAL_SCHEDULER_ID, MODULE_ID, NO_LOCK_ID, TARGET_ID},
    namespace::{FlagTarget, GrammarScope, Namespacer, RESERVED_FLAGS},
};

/// Flags that belong to the invocation rather than to a definition.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GlobalOptions {
    pub help: bool,
    pub help_all: bool,
    pub module: Option<String>,
    pub local_scheduler: bool,
    pub no_lock: bool,
}

/// Parameter values typed on the command line.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CommandLineValues {
    primary: Option<DefinitionId>,
    bare: IndexMap<String, ParamValue>,
    /// owner name -> parameter name -> value
    qualified: IndexMap<String, IndexMap<String, ParamValue>>,
}

impl CommandLineValues {
    pub fn new(primary: Option<DefinitionId>) -> Self {
        Self {
            primary,
            ..Self::default()
        }
    }

    pub fn primary(&self) -> Option<DefinitionId> {
        self.primary
    }

    pub fn insert_bare(&mut self, parameter: &str, value: ParamValue) {
        self.bare.insert(parameter.to_string(), value);
    }

    pub fn insert_qualified(&mut self, owner: &str, parameter: &str, value: ParamValue) {
        self.qualified
            .entry(owner.to_string())
            .or_default()
            .insert(parameter.to_string(), value);
    }

    /// The command-line value for a parameter of `record`. A bare flag only
    /// applies to the primary definition and wins over the qualified flag.
    pub fn value_for(&self, record: &DefinitionRecord, descriptor: &ParameterDescriptor) -> Option<&ParamValue> {
        let bare = (self.primary == Some(record.id))
            .then(|| self.bare.get(&descriptor.name))
            .flatten();
        bare.or_else(|| {
            if !descriptor.is_global {
                return None;
            }
            self.qualified.get(&descriptor.owner_name)?.get(&descriptor.name)
        })
    }

    pub fn is_empty(&self) -> bool {
        self.bare.is_empty() && self.qualified.is_empty()
    }
}

/// Everything binding reads besides programmatic overrides.
#[derive(Debug, Clone, Default)]
pub struct BindingSources {
    pub command_line: CommandLineValues,
    pub config_file: ConfigFile,
}

/// Result of the second pass.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedCommandLine {
    pub globals: GlobalOptions,
    pub target: Option<String>,
    pub values: CommandLineValues,
}

/// Parses argument vectors against the grammar of a registry.
pub struct ArgumentBinder<'registry> {
    registry: &'registry DefinitionRegistry,
    program: &'static str,
}

impl<'registry> ArgumentBinder<'registry> {
    pub fn new(registry: &'registry DefinitionRegistry, program: &'static str) -> Self {
        Self { registry, program }
    }

    /// Finds `--module <name>` (or `--module=<name>`) before any module is
    /// loaded.
    pub fn scan_module(args: &[String]) -> Option<String> {
        let mut tokens = args.iter();
        while let Some(token) = tokens.next() {
            if token == "--" {
                return None;
            }
            if let Some(value) = token.strip_prefix("--module=") {
                return Some(value.to_string());
            }
            if token == "--module" {
                return tokens.next().cloned();
            }
        }
        None
    }

    /// First pass: the first token that is neither a flag nor the value of a
    /// value-taking flag.
    ///
    /// Unknown flags are assumed to take no value; the second pass reports
    /// them.
    pub fn scan_target(&self, args: &[String]) -> Option<String> {
        let table = Namespacer::new(self.registry).flag_table(None, GrammarScope::All);
        let takes_value = |flag: &str| {
            flag == MODULE_ID
                || table
                    .lookup(flag)
                    .is_some_and(|entry| entry.descriptor.kind.takes_value())
        };

        let mut tokens = args.iter();
        while let Some(token) = tokens.next() {
            if token == "--" {
                return tokens.next().cloned();
            }
            if let Some(flag) = token.strip_prefix("--") {
                if !flag.contains('=') && takes_value(flag) {
                    tokens.next();
                }
                continue;
            }
            if token.starts_with('-') {
                continue;
            }
            return Some(token.clone());
        }
        None
    }

    /// Second pass: parse the whole vector with every qualified flag plus the
    /// primary's bare flags.
    pub fn parse(&self, args: &[String], primary: Option<&DefinitionRecord>) -> Result<ParsedCommandLine, BindError> {
        let table = Namespacer::new(self.registry).flag_table(primary, GrammarScope::All);
        let matches = clap_builder::build_grammar(self.program, &table, primary)
            .try_get_matches_from(args.iter())
            .map_err(|error| clap_builder::map_clap_error(&error))?;

        let globals = GlobalOptions {
            help: matches.get_flag(HELP_ID),
            help_all: matches.get_flag(HELP_ALL_ID),
            module: matches.get_one::<String>(MODULE_ID).cloned(),
            local_scheduler: matches.get_flag(LOCAL_SCHEDULER_ID),
            no_lock: matches.get_flag(NO_LOCK_ID),
        };
        let target = matches.get_one::<String>(TARGET_ID).cloned();

        let mut values = CommandLineValues::new(primary.map(|record| record.id));
        for entry in table.entries() {
            if matches.value_source(&entry.flag) != Some(ClapValueSource::CommandLine) {
                continue;
            }
            let Some(raw) = matches.get_one::<String>(&entry.flag) else {
                continue;
            };
            let descriptor = &entry.descriptor;
            let value = descriptor
                .kind
                .parse(raw)
                .map_err(|error| BindError::InvalidParameterValue {
                    flag: format!("--{}", entry.flag),
                    value: raw.clone(),
                    reason: error.to_string(),
                })?;
            match entry.target {
                FlagTarget::Bare => values.insert_bare(&descriptor.name, value),
                FlagTarget::Qualified => values.insert_qualified(&descriptor.owner_name, &descriptor.name, value),
            }
        }

        debug!(target = ?target, explicit = !values.is_empty(), "parsed command line");
        Ok(ParsedCommandLine { globals, target, values })
    }

    /// Renders help for the primary alone or for every registered definition.
    pub fn help(&self, primary: Option<&DefinitionRecord>, scope: GrammarScope) -> String {
        let table = Namespacer::new(self.registry).flag_table(primary, scope);
        clap_builder::render_help(clap_builder::build_grammar(self.program, &table, primary))
    }

    /// One-line usage shown above resolve and bind errors.
    pub fn usage(&self) -> String {
        let table = Namespacer::new(self.registry).flag_table(None, GrammarScope::Primary);
        let mut command = clap_builder::build_grammar(self.program, &table, None);
        command.render_usage().to_string()
    }
}

/// Binds every parameter of `record`.
///
/// Overrides naming a parameter the definition lacks are rejected, as are
/// overrides whose type does not fit the parameter.
pub fn bind_instance(
    record: &Arc<DefinitionRecord>,
    overrides: &IndexMap<String, ParamValue>,
    sources: &BindingSources,
) -> Result<BoundInstance, BindError> {
    if let Some(unknown) = overrides.keys().find(|name| record.parameter(name).is_none()) {
        return Err(BindError::UnknownParameter {
            definition: record.name.clone(),
            parameter: unknown.clone(),
        });
    }

    let is_primary = sources.command_line.primary() == Some(record.id);
    let mut instance = BoundInstance::new(Arc::clone(record));
    for descriptor in &record.parameters {
        let (value, source) = if let Some(value) = overrides.get(&descriptor.name) {
            if !descriptor.kind.accepts(value) {
                return Err(BindError::InvalidParameterValue {
                    flag: display_flag(descriptor, is_primary),
                    value: value.to_string(),
                    reason: format!("expected {}", descriptor.kind),
                });
            }
            (value.clone(), ValueSource::Override)
        } else if let Some(value) = sources.command_line.value_for(record, descriptor) {
            (value.clone(), ValueSource::CommandLine)
        } else if let Some(value) = config_file_value(descriptor, &sources.config_file)? {
            (value, ValueSource::ConfigFile)
        } else if let Some(default) = &descriptor.default {
            (default.clone(), ValueSource::Default)
        } else if !descriptor.required {
            (ParamValue::Null, ValueSource::Unset)
        } else {
            return Err(BindError::MissingRequiredParameter {
                flag: display_flag(descriptor, is_primary),
            });
        };
        instance.set(&descriptor.name, value, source);
    }
    Ok(instance)
}

fn config_file_value(descriptor: &ParameterDescriptor, config_file: &ConfigFile) -> Result<Option<ParamValue>, BindError> {
    if !descriptor.is_global {
        return Ok(None);
    }
    let Some(raw) = config_file.raw_value(&descriptor.owner_name, &descriptor.name) else {
        return Ok(None);
    };
    descriptor
        .kind
        .parse(&raw)
        .map(Some)
        .map_err(|error| BindError::InvalidParameterValue {
            flag: format!("[{}] {}", descriptor.owner_name, descriptor.name),
            value: raw,
            reason: error.to_string(),
        })
}

/// The flag an operator would type to supply the parameter.
fn display_flag(descriptor: &ParameterDescriptor, is_primary: bool) -> String {
    let bare = descriptor.bare_flag();
    if (is_primary && !RESERVED_FLAGS.contains(&bare.as_str())) || !descriptor.is_global {
        format!("--{bare}")
    } else {
        format!("--{}", descriptor.qualified_flag())
    }
}
