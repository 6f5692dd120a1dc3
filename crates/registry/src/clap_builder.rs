use clap::{
    Arg, ArgAction, Command as ClapCommand,
    error::{ContextKind, ContextValue, ErrorKind},
};

use crate::{
    BindError, DefinitionRecord,
    namespace::{FlagEntry, FlagTable, FlagTarget},
};

pub(crate) const TARGET_ID: &str = "TASK";
pub(crate) const HELP_ID: &str = "help";
pub(crate) const HELP_ALL_ID: &str = "help-all";
pub(crate) const MODULE_ID: &str = "module";
pub(crate) const LOCAL_SCHEDULER_ID: &str = "local-scheduler";
pub(crate) const NO_LOCK_ID: &str = "no-lock";

/// Builds the Clap grammar for one invocation from a flag table.
///
/// The grammar always carries the global flags and the optional task
/// positional; every table entry becomes a long flag grouped under a heading
/// named after the definition it belongs to. Clap is used for tokenizing and
/// help rendering only: defaults and required checks are applied by the binder
/// so that configuration values can sit between the two.
///
/// # Arguments
///
/// * `program` - Name shown in the usage line
/// * `table` - Flags computed by the namespacer
/// * `primary` - The selected definition, used to label bare flags
///
/// # Returns
///
/// A ClapCommand ready for `try_get_matches_from` or `render_help`.
pub fn build_grammar(program: &'static str, table: &FlagTable, primary: Option<&DefinitionRecord>) -> ClapCommand {
    let mut root = create_root_command(program);
    for entry in table.entries() {
        root = root.arg(build_flag_argument(entry, primary));
    }
    root
}

/// Renders the short help for a grammar as plain text.
pub fn render_help(mut command: ClapCommand) -> String {
    command.render_help().to_string()
}

/// Creates the root command with the invocation's own flags.
///
/// The global flags are:
///
/// - `--module` - Module to load before resolving the task
/// - `--local-scheduler` - Run in-process
/// - `--no-lock` - Skip the process lock
/// - `--help` / `--help-all` - Help for the selected task or for everything
fn create_root_command(program: &'static str) -> ClapCommand {
    ClapCommand::new(program)
        .no_binary_name(true)
        .disable_help_flag(true)
        .disable_version_flag(true)
        .args_override_self(true)
        .arg(
            Arg::new(TARGET_ID)
                .index(1)
                .value_name("TASK")
                .help("Name of the task to run")
                .action(ArgAction::Set),
        )
        .arg(
            Arg::new(MODULE_ID)
                .long(MODULE_ID)
                .value_name("MODULE")
                .help("Load the named module before resolving the task")
                .action(ArgAction::Set),
        )
        .arg(
            Arg::new(LOCAL_SCHEDULER_ID)
                .long(LOCAL_SCHEDULER_ID)
                .help("Run in-process without a central scheduler")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new(NO_LOCK_ID)
                .long(NO_LOCK_ID)
                .help("Do not take the process lock")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new(HELP_ID)
                .long(HELP_ID)
                .help("Print help for the selected task")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new(HELP_ALL_ID)
                .long(HELP_ALL_ID)
                .help("Print help for every registered definition")
                .action(ArgAction::SetTrue),
        )
}

/// Builds a single flag argument for a parameter.
///
/// Boolean parameters take an optional `=value` so that a bare `--flag` means
/// true without swallowing the following token; every other kind consumes the
/// next token. Numeric kinds accept leading minus signs.
fn build_flag_argument(entry: &FlagEntry, primary: Option<&DefinitionRecord>) -> Arg {
    let kind = &entry.descriptor.kind;
    let mut arg = Arg::new(entry.flag.clone())
        .long(entry.flag.clone())
        .value_name(kind.value_name())
        .action(ArgAction::Set)
        .help(generate_help_text(entry))
        .help_heading(help_heading(entry, primary));

    arg = if kind.takes_value() {
        arg.allow_negative_numbers(matches!(kind, taskrun_types::ParamKind::Int | taskrun_types::ParamKind::Float))
    } else {
        arg.num_args(0..=1).require_equals(true).default_missing_value("true")
    };
    arg
}

fn help_heading(entry: &FlagEntry, primary: Option<&DefinitionRecord>) -> String {
    let owner = match (entry.target, primary) {
        (FlagTarget::Bare, Some(primary)) => primary.name.as_str(),
        _ => entry.descriptor.owner_name.as_str(),
    };
    format!("{owner} parameters")
}

/// Generates help text for a flag from the parameter's description, falling
/// back to its type, and appends the default or the required marker.
fn generate_help_text(entry: &FlagEntry) -> String {
    entry.descriptor.help_text()
}

/// Maps a Clap parse failure onto the binder's error taxonomy.
pub(crate) fn map_clap_error(error: &clap::Error) -> BindError {
    let context_text = |kind: ContextKind| match error.get(kind) {
        Some(ContextValue::String(text)) => Some(text.clone()),
        Some(ContextValue::Strings(texts)) => texts.first().cloned(),
        _ => None,
    };
    // Clap renders the argument with its value name ("--n <INT>").
    let flag = context_text(ContextKind::InvalidArg)
        .and_then(|rendered| rendered.split_whitespace().next().map(str::to_string))
        .unwrap_or_default();

    match error.kind() {
        ErrorKind::UnknownArgument => BindError::UnrecognizedArgument { flag },
        ErrorKind::MissingRequiredArgument => BindError::MissingRequiredParameter { flag },
        other => BindError::InvalidParameterValue {
            flag,
            value: context_text(ContextKind::InvalidValue).unwrap_or_default(),
            reason: other.as_str().unwrap_or("invalid usage").to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use taskrun_types::ParamSpec;

    use super::*;
    use crate::{Declaration, DefinitionRegistry, GrammarScope, Namespacer};

    fn streams_table() -> (FlagTable, std::sync::Arc<DefinitionRecord>) {
        let mut registry = DefinitionRegistry::new();
        let record = registry
            .register(Declaration::task("Streams").param(ParamSpec::int("n").default(3)))
            .unwrap()
            .record;
        let table = Namespacer::new(&registry).flag_table(Some(&record), GrammarScope::All);
        (table, record)
    }

    #[test]
    fn flags_are_grouped_under_their_owner() {
        let (table, record) = streams_table();
        let help = render_help(build_grammar("taskrun", &table, Some(&record)));
        assert!(help.contains("Streams parameters"), "{help}");
        assert!(help.contains("--Streams-n <INT>"), "{help}");
        assert!(help.contains("--n <INT>"), "{help}");
    }

    #[test]
    fn rebuilt_grammars_parse_the_same_flags() {
        let (table, record) = streams_table();
        for value in ["4", "-2"] {
            let matches = build_grammar("taskrun", &table, Some(&record))
                .try_get_matches_from(["Streams", "--Streams-n", value])
                .unwrap();
            assert_eq!(matches.get_one::<String>("Streams-n").map(String::as_str), Some(value));
            assert_eq!(matches.get_one::<String>(TARGET_ID).map(String::as_str), Some("Streams"));
        }
    }
}
