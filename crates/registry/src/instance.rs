use std::{fmt, sync::Arc};

use chrono::NaiveDate;
use indexmap::IndexMap;
use serde::Serialize;
use taskrun_types::{DateInterval, DefinitionId, ParamValue};

use crate::DefinitionRecord;

/// Where a bound value came from, highest priority first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ValueSource {
    /// Passed programmatically, e.g. by a task's dependency request
    Override,
    CommandLine,
    ConfigFile,
    Default,
    /// Optional parameter with nothing to bind
    Unset,
}

impl ValueSource {
    /// Whether an operator chose this value rather than the declaration.
    pub fn is_explicit(&self) -> bool {
        matches!(self, ValueSource::Override | ValueSource::CommandLine | ValueSource::ConfigFile)
    }
}

impl fmt::Display for ValueSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ValueSource::Override => "override",
            ValueSource::CommandLine => "command line",
            ValueSource::ConfigFile => "config file",
            ValueSource::Default => "default",
            ValueSource::Unset => "unset",
        };
        f.write_str(label)
    }
}

/// A definition paired with a value for every one of its parameters.
#[derive(Debug, Clone)]
pub struct BoundInstance {
    record: Arc<DefinitionRecord>,
    values: IndexMap<String, ParamValue>,
    sources: IndexMap<String, ValueSource>,
}

impl BoundInstance {
    pub(crate) fn new(record: Arc<DefinitionRecord>) -> Self {
        Self {
            record,
            values: IndexMap::new(),
            sources: IndexMap::new(),
        }
    }

    pub(crate) fn set(&mut self, name: &str, value: ParamValue, source: ValueSource) {
        self.values.insert(name.to_string(), value);
        self.sources.insert(name.to_string(), source);
    }

    pub fn record(&self) -> &Arc<DefinitionRecord> {
        &self.record
    }

    pub fn name(&self) -> &str {
        &self.record.name
    }

    pub fn definition_id(&self) -> DefinitionId {
        self.record.id
    }

    /// Stable identifier: `Name(param=value, ...)` over every parameter in
    /// declaration order.
    pub fn task_id(&self) -> String {
        let rendered: Vec<String> = self.values.iter().map(|(name, value)| format!("{name}={value}")).collect();
        format!("{}({})", self.record.name, rendered.join(", "))
    }

    pub fn get(&self, name: &str) -> Option<&ParamValue> {
        self.values.get(name)
    }

    pub fn source(&self, name: &str) -> Option<ValueSource> {
        self.sources.get(name).copied()
    }

    pub fn str(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(ParamValue::as_str)
    }

    pub fn int(&self, name: &str) -> Option<i64> {
        self.get(name).and_then(ParamValue::as_int)
    }

    pub fn float(&self, name: &str) -> Option<f64> {
        self.get(name).and_then(ParamValue::as_float)
    }

    pub fn bool(&self, name: &str) -> Option<bool> {
        self.get(name).and_then(ParamValue::as_bool)
    }

    pub fn date(&self, name: &str) -> Option<NaiveDate> {
        self.get(name).and_then(ParamValue::as_date)
    }

    pub fn date_interval(&self, name: &str) -> Option<DateInterval> {
        self.get(name).and_then(ParamValue::as_date_interval)
    }

    /// Values in parameter order.
    pub fn values(&self) -> impl Iterator<Item = (&str, &ParamValue, ValueSource)> {
        self.values.iter().map(|(name, value)| {
            let source = self.sources.get(name).copied().unwrap_or(ValueSource::Unset);
            (name.as_str(), value, source)
        })
    }

    /// Values an operator or caller chose explicitly.
    pub fn explicit_values(&self) -> impl Iterator<Item = (&str, &ParamValue, ValueSource)> {
        self.values().filter(|(_, _, source)| source.is_explicit())
    }
}

impl fmt::Display for BoundInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.task_id())
    }
}
