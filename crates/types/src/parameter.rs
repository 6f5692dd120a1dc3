use heck::ToKebabCase;
use serde::{Deserialize, Serialize};

use crate::{DefinitionId, ParamKind, ParamValue};

/// A parameter as written in a declaration, before it has an owner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParamSpec {
    /// Identifier of the slot (e.g., "n", "required_test_param")
    pub name: String,
    /// Value type and string parsing contract
    pub kind: ParamKind,
    /// Value used when nothing else supplies one
    #[serde(default)]
    pub default: Option<ParamValue>,
    /// Whether the value may come from a qualified flag or the configuration file
    #[serde(default = "default_true")]
    pub is_global: bool,
    /// Bind to null instead of failing when no value is found
    #[serde(default)]
    pub optional: bool,
    /// Human-readable description shown in help output
    #[serde(default)]
    pub description: Option<String>,
}

fn default_true() -> bool {
    true
}

impl ParamSpec {
    pub fn new(name: impl Into<String>, kind: ParamKind) -> Self {
        let default = match kind {
            ParamKind::Bool => Some(ParamValue::Bool(false)),
            _ => None,
        };
        Self {
            name: name.into(),
            kind,
            default,
            is_global: true,
            optional: false,
            description: None,
        }
    }

    pub fn str(name: impl Into<String>) -> Self {
        Self::new(name, ParamKind::Str)
    }

    pub fn int(name: impl Into<String>) -> Self {
        Self::new(name, ParamKind::Int)
    }

    pub fn float(name: impl Into<String>) -> Self {
        Self::new(name, ParamKind::Float)
    }

    pub fn bool(name: impl Into<String>) -> Self {
        Self::new(name, ParamKind::Bool)
    }

    pub fn date(name: impl Into<String>) -> Self {
        Self::new(name, ParamKind::Date)
    }

    pub fn date_interval(name: impl Into<String>) -> Self {
        Self::new(name, ParamKind::DateInterval)
    }

    pub fn choice<I, S>(name: impl Into<String>, choices: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(name, ParamKind::Choice(choices.into_iter().map(Into::into).collect()))
    }

    pub fn default(mut self, value: impl Into<ParamValue>) -> Self {
        self.default = Some(value.into());
        self
    }

    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    /// Restricts the parameter to the primary definition's bare flag,
    /// programmatic overrides and its default.
    pub fn local_only(mut self) -> Self {
        self.is_global = false;
        self
    }

    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// A parameter attached to the definition that declared it.
///
/// Subclasses share the ancestor's descriptor, so `owner` and `owner_name`
/// always name the declaring definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterDescriptor {
    pub name: String,
    pub owner: DefinitionId,
    pub owner_name: String,
    pub kind: ParamKind,
    pub default: Option<ParamValue>,
    pub is_global: bool,
    pub required: bool,
    pub description: Option<String>,
}

impl ParameterDescriptor {
    pub fn from_spec(spec: &ParamSpec, owner: DefinitionId, owner_name: &str) -> Self {
        Self {
            name: spec.name.clone(),
            owner,
            owner_name: owner_name.to_string(),
            kind: spec.kind.clone(),
            default: spec.default.clone(),
            is_global: spec.is_global,
            required: spec.default.is_none() && !spec.optional,
            description: spec.description.clone(),
        }
    }

    /// Flag spelling of the parameter name without any namespace.
    pub fn bare_flag(&self) -> String {
        self.name.to_kebab_case()
    }

    /// Flag spelling namespaced by the declaring definition.
    pub fn qualified_flag(&self) -> String {
        format!("{}-{}", self.owner_name, self.bare_flag())
    }

    pub fn help_text(&self) -> String {
        let mut text = self.description.clone().unwrap_or_else(|| format!("type: {}", self.kind));
        match &self.default {
            Some(default) if !default.is_null() => text.push_str(&format!(" [default: {default}]")),
            _ if self.required => text.push_str(" [required]"),
            _ => {}
        }
        text
    }
}

/// Returns true for names usable as definition or parameter identifiers.
pub fn is_valid_identifier(name: &str) -> bool {
    let mut characters = name.chars();
    match characters.next() {
        Some(first) if first.is_ascii_alphabetic() || first == '_' => {}
        _ => return false,
    }
    characters.all(|character| character.is_ascii_alphanumeric() || character == '_')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_use_kebab_case_and_owner_name() {
        let spec = ParamSpec::str("required_test_param");
        let descriptor = ParameterDescriptor::from_spec(&spec, DefinitionId(7), "RequiredConfig");
        assert_eq!(descriptor.bare_flag(), "required-test-param");
        assert_eq!(descriptor.qualified_flag(), "RequiredConfig-required-test-param");
        assert!(descriptor.required);
    }

    #[test]
    fn bool_and_optional_parameters_are_not_required() {
        let flag = ParameterDescriptor::from_spec(&ParamSpec::bool("dry_run"), DefinitionId(1), "Deploy");
        assert!(!flag.required);
        assert_eq!(flag.default, Some(ParamValue::Bool(false)));

        let optional = ParameterDescriptor::from_spec(&ParamSpec::date("start").optional(), DefinitionId(1), "Deploy");
        assert!(!optional.required);
        assert_eq!(optional.default, None);
    }

    #[test]
    fn help_text_mentions_default_or_requirement() {
        let with_default = ParameterDescriptor::from_spec(&ParamSpec::str("x").default("foo_base_default"), DefinitionId(1), "FooBaseClass");
        assert_eq!(with_default.help_text(), "type: str [default: foo_base_default]");
        let required = ParameterDescriptor::from_spec(&ParamSpec::int("n").describe("Partition number"), DefinitionId(2), "SomeTask");
        assert_eq!(required.help_text(), "Partition number [required]");
    }

    #[test]
    fn identifiers_reject_dashes_and_leading_digits() {
        assert!(is_valid_identifier("FooBaseClass"));
        assert!(is_valid_identifier("_private"));
        assert!(!is_valid_identifier("foo-bar"));
        assert!(!is_valid_identifier("1st"));
        assert!(!is_valid_identifier(""));
    }
}
