//! Parameter kinds and the values they parse into.
//!
//! Every parameter declares a [`ParamKind`]. The kind owns the contract for
//! turning operator-typed strings (command-line flags, configuration file
//! scalars) into a typed [`ParamValue`], and the value's `Display` is the
//! inverse used in task ids and summaries.

use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::DateInterval;

/// Error produced when a raw string does not satisfy a parameter kind.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseValueError {
    #[error("expected {expected}, got '{value}'")]
    Malformed { expected: &'static str, value: String },

    #[error("'{value}' is not one of: {}", choices.join(", "))]
    NotAChoice { value: String, choices: Vec<String> },

    #[error("'{value}' is out of range: {reason}")]
    OutOfRange { value: String, reason: String },
}

/// The type of a parameter slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ParamKind {
    Str,
    Int,
    Float,
    Bool,
    Date,
    DateInterval,
    Choice(Vec<String>),
}

impl ParamKind {
    /// Parses operator input into a typed value.
    pub fn parse(&self, raw: &str) -> Result<ParamValue, ParseValueError> {
        match self {
            ParamKind::Str => Ok(ParamValue::Str(raw.to_string())),
            ParamKind::Int => raw.trim().parse::<i64>().map(ParamValue::Int).map_err(|_| ParseValueError::Malformed {
                expected: "an integer",
                value: raw.to_string(),
            }),
            ParamKind::Float => raw.trim().parse::<f64>().map(ParamValue::Float).map_err(|_| ParseValueError::Malformed {
                expected: "a number",
                value: raw.to_string(),
            }),
            ParamKind::Bool => parse_bool(raw).map(ParamValue::Bool),
            ParamKind::Date => NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
                .map(ParamValue::Date)
                .map_err(|_| ParseValueError::Malformed {
                    expected: "a date (YYYY-MM-DD)",
                    value: raw.to_string(),
                }),
            ParamKind::DateInterval => raw.parse::<DateInterval>().map(ParamValue::DateInterval),
            ParamKind::Choice(choices) => {
                if choices.iter().any(|choice| choice == raw) {
                    Ok(ParamValue::Str(raw.to_string()))
                } else {
                    Err(ParseValueError::NotAChoice {
                        value: raw.to_string(),
                        choices: choices.clone(),
                    })
                }
            }
        }
    }

    /// Placeholder shown next to a flag in help output.
    pub fn value_name(&self) -> &'static str {
        match self {
            ParamKind::Str => "STR",
            ParamKind::Int => "INT",
            ParamKind::Float => "FLOAT",
            ParamKind::Bool => "BOOL",
            ParamKind::Date => "DATE",
            ParamKind::DateInterval => "INTERVAL",
            ParamKind::Choice(_) => "CHOICE",
        }
    }

    /// Whether the flag for this kind consumes the following token.
    pub fn takes_value(&self) -> bool {
        !matches!(self, ParamKind::Bool)
    }

    /// Checks that an already-typed value fits this kind. Used for defaults and
    /// programmatic overrides, which bypass string parsing.
    pub fn accepts(&self, value: &ParamValue) -> bool {
        match (self, value) {
            (_, ParamValue::Null) => true,
            (ParamKind::Str, ParamValue::Str(_)) => true,
            (ParamKind::Int, ParamValue::Int(_)) => true,
            (ParamKind::Float, ParamValue::Float(_) | ParamValue::Int(_)) => true,
            (ParamKind::Bool, ParamValue::Bool(_)) => true,
            (ParamKind::Date, ParamValue::Date(_)) => true,
            (ParamKind::DateInterval, ParamValue::DateInterval(_)) => true,
            (ParamKind::Choice(choices), ParamValue::Str(value)) => choices.contains(value),
            _ => false,
        }
    }
}

impl fmt::Display for ParamKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamKind::Str => f.write_str("str"),
            ParamKind::Int => f.write_str("int"),
            ParamKind::Float => f.write_str("float"),
            ParamKind::Bool => f.write_str("bool"),
            ParamKind::Date => f.write_str("date"),
            ParamKind::DateInterval => f.write_str("date-interval"),
            ParamKind::Choice(choices) => write!(f, "one of {}", choices.join("|")),
        }
    }
}

fn parse_bool(raw: &str) -> Result<bool, ParseValueError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" => Ok(false),
        _ => Err(ParseValueError::Malformed {
            expected: "a boolean (true/false)",
            value: raw.to_string(),
        }),
    }
}

/// A concrete parameter value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Date(NaiveDate),
    DateInterval(DateInterval),
    Str(String),
}

impl ParamValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            ParamValue::Str(value) => Some(value.as_str()),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            ParamValue::Int(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            ParamValue::Float(value) => Some(*value),
            ParamValue::Int(value) => Some(*value as f64),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ParamValue::Bool(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_date(&self) -> Option<NaiveDate> {
        match self {
            ParamValue::Date(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_date_interval(&self) -> Option<DateInterval> {
        match self {
            ParamValue::DateInterval(value) => Some(*value),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, ParamValue::Null)
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::Null => f.write_str("None"),
            ParamValue::Bool(value) => write!(f, "{value}"),
            ParamValue::Int(value) => write!(f, "{value}"),
            ParamValue::Float(value) => write!(f, "{value}"),
            ParamValue::Date(value) => write!(f, "{}", value.format("%Y-%m-%d")),
            ParamValue::DateInterval(value) => write!(f, "{value}"),
            ParamValue::Str(value) => f.write_str(value),
        }
    }
}

impl From<&str> for ParamValue {
    fn from(value: &str) -> Self {
        ParamValue::Str(value.to_string())
    }
}

impl From<String> for ParamValue {
    fn from(value: String) -> Self {
        ParamValue::Str(value)
    }
}

impl From<i64> for ParamValue {
    fn from(value: i64) -> Self {
        ParamValue::Int(value)
    }
}

impl From<i32> for ParamValue {
    fn from(value: i32) -> Self {
        ParamValue::Int(i64::from(value))
    }
}

impl From<f64> for ParamValue {
    fn from(value: f64) -> Self {
        ParamValue::Float(value)
    }
}

impl From<bool> for ParamValue {
    fn from(value: bool) -> Self {
        ParamValue::Bool(value)
    }
}

impl From<NaiveDate> for ParamValue {
    fn from(value: NaiveDate) -> Self {
        ParamValue::Date(value)
    }
}

impl From<DateInterval> for ParamValue {
    fn from(value: DateInterval) -> Self {
        ParamValue::DateInterval(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn int_kind_rejects_words() {
        assert_eq!(ParamKind::Int.parse(" 42 "), Ok(ParamValue::Int(42)));
        let error = ParamKind::Int.parse("forty-two").unwrap_err();
        assert!(error.to_string().contains("expected an integer"), "{error}");
    }

    #[test]
    fn bool_kind_accepts_common_spellings() {
        assert_eq!(ParamKind::Bool.parse("YES"), Ok(ParamValue::Bool(true)));
        assert_eq!(ParamKind::Bool.parse("0"), Ok(ParamValue::Bool(false)));
        assert!(ParamKind::Bool.parse("maybe").is_err());
        assert!(!ParamKind::Bool.takes_value());
    }

    #[test]
    fn choice_kind_lists_allowed_values() {
        let kind = ParamKind::Choice(vec!["debug".into(), "info".into()]);
        assert_eq!(kind.parse("info"), Ok(ParamValue::Str("info".into())));
        let error = kind.parse("loud").unwrap_err();
        assert_eq!(error.to_string(), "'loud' is not one of: debug, info");
    }

    #[test]
    fn display_matches_input_forms() {
        let date = ParamKind::Date.parse("2015-03-04").unwrap();
        assert_eq!(date.to_string(), "2015-03-04");
        let interval = ParamKind::DateInterval.parse("2012-06").unwrap();
        assert_eq!(interval.to_string(), "2012-06");
        assert_eq!(ParamValue::Null.to_string(), "None");
    }

    #[test]
    fn accepts_checks_typed_values() {
        assert!(ParamKind::Float.accepts(&ParamValue::Int(3)));
        assert!(!ParamKind::Int.accepts(&ParamValue::Str("3".into())));
        assert!(ParamKind::Date.accepts(&ParamValue::Null));
    }
}
