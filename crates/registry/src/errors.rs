//! Error taxonomy for registration, resolution and binding.
//!
//! Every message renders as a single operator-facing paragraph; none of them
//! carries internal detail beyond the names, flags and declaration sites the
//! operator needs to correct the invocation.

use taskrun_types::Provenance;
use thiserror::Error;

/// Rejected declarations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("invalid declaration of '{name}': {reason}")]
    InvalidDeclaration { name: String, reason: String },
}

/// Failures while turning a requested name into a single definition.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolveError {
    #[error("{}", not_found_message(name, suggestion.as_deref()))]
    NotFound { name: String, suggestion: Option<String> },

    #[error(
        "Ambiguous task name '{name}': it is declared {} times ({}). Rename one of the declarations or load only the module that defines the one you mean.",
        candidates.len(),
        candidates.iter().map(ToString::to_string).collect::<Vec<_>>().join("; ")
    )]
    AmbiguousDefinition { name: String, candidates: Vec<Provenance> },

    #[error("'{name}' is a configuration definition and cannot be run as a task")]
    NotRunnable { name: String },

    #[error("No task specified")]
    NoTargetSpecified,
}

fn not_found_message(name: &str, suggestion: Option<&str>) -> String {
    match suggestion {
        Some(suggestion) => format!("No task named '{name}' is registered. Did you mean '{suggestion}'?"),
        None => format!("No task named '{name}' is registered. Use --module to load the module that declares it, or --help-all to list known tasks."),
    }
}

/// Failures while parsing the argument vector or binding parameter values.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BindError {
    #[error("Unrecognized argument '{flag}'")]
    UnrecognizedArgument { flag: String },

    #[error("Missing value for required parameter '{flag}'")]
    MissingRequiredParameter { flag: String },

    #[error("Invalid value '{value}' for '{flag}': {reason}")]
    InvalidParameterValue { flag: String, value: String, reason: String },

    #[error("'{definition}' has no parameter named '{parameter}'")]
    UnknownParameter { definition: String, parameter: String },
}

impl BindError {
    /// The flag (or parameter) the error is about.
    pub fn flag(&self) -> &str {
        match self {
            BindError::UnrecognizedArgument { flag }
            | BindError::MissingRequiredParameter { flag }
            | BindError::InvalidParameterValue { flag, .. } => flag,
            BindError::UnknownParameter { parameter, .. } => parameter,
        }
    }
}

/// Resolution followed by binding, as done for configuration singletons and
/// programmatic task requests.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LookupError {
    #[error(transparent)]
    Resolve(#[from] ResolveError),

    #[error(transparent)]
    Bind(#[from] BindError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_mentions_suggestion() {
        let error = ResolveError::NotFound {
            name: "RangeDaili".into(),
            suggestion: Some("RangeDaily".into()),
        };
        assert_eq!(error.to_string(), "No task named 'RangeDaili' is registered. Did you mean 'RangeDaily'?");
    }

    #[test]
    fn ambiguous_lists_every_site() {
        let error = ResolveError::AmbiguousDefinition {
            name: "AmbiguousClass".into(),
            candidates: vec![
                Provenance::new("src/demo.rs:40:5").with_module("demo"),
                Provenance::new("src/demo.rs:44:5").with_module("demo"),
            ],
        };
        let message = error.to_string();
        assert!(message.contains("declared 2 times"), "{message}");
        assert!(message.contains("src/demo.rs:40:5") && message.contains("src/demo.rs:44:5"), "{message}");
        assert!(!message.contains('\n'));
    }

    #[test]
    fn bind_errors_expose_their_flag() {
        let error = BindError::MissingRequiredParameter { flag: "--n".into() };
        assert_eq!(error.flag(), "--n");
        assert_eq!(error.to_string(), "Missing value for required parameter '--n'");
    }
}
