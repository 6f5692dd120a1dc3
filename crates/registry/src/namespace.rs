//! Flag naming for definition parameters.
//!
//! Every global parameter is reachable as `--<Owner>-<param>`, where the owner
//! is the definition that declared it (an ancestor for inherited parameters).
//! The primary definition of an invocation additionally exposes each of its
//! parameters as a bare `--<param>` unless that spelling collides with a
//! global flag or with a qualified flag already in the grammar.

use std::{collections::HashMap, sync::Arc};

use taskrun_types::ParameterDescriptor;
use tracing::debug;

use crate::{DefinitionRecord, DefinitionRegistry};

/// Flags owned by the invocation itself. Parameters never shadow them.
pub const RESERVED_FLAGS: &[&str] = &["help", "help-all", "module", "local-scheduler", "no-lock"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlagTarget {
    /// `--<Owner>-<param>`, shared by every definition that inherits the parameter
    Qualified,
    /// `--<param>`, only for the primary definition
    Bare,
}

#[derive(Debug, Clone)]
pub struct FlagEntry {
    /// Flag spelling without the leading dashes
    pub flag: String,
    pub target: FlagTarget,
    pub descriptor: Arc<ParameterDescriptor>,
}

/// Which parameters a grammar exposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GrammarScope {
    /// The primary definition's own and inherited parameters only
    Primary,
    /// Every registered definition, plus the primary's bare flags
    All,
}

/// Typed grammar table: flag spelling to parameter slot.
#[derive(Debug, Clone, Default)]
pub struct FlagTable {
    entries: Vec<FlagEntry>,
    index: HashMap<String, usize>,
}

impl FlagTable {
    fn insert(&mut self, entry: FlagEntry) -> bool {
        if self.index.contains_key(&entry.flag) {
            return false;
        }
        self.index.insert(entry.flag.clone(), self.entries.len());
        self.entries.push(entry);
        true
    }

    pub fn lookup(&self, flag: &str) -> Option<&FlagEntry> {
        self.index.get(flag).map(|position| &self.entries[*position])
    }

    pub fn contains(&self, flag: &str) -> bool {
        self.index.contains_key(flag)
    }

    pub fn entries(&self) -> &[FlagEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Computes flag tables over a registry.
pub struct Namespacer<'registry> {
    registry: &'registry DefinitionRegistry,
}

impl<'registry> Namespacer<'registry> {
    pub fn new(registry: &'registry DefinitionRegistry) -> Self {
        Self { registry }
    }

    /// Builds the flag table for an invocation.
    ///
    /// Qualified flags are deduplicated by spelling; when two records share a
    /// name the first registered one supplies the descriptor.
    pub fn flag_table(&self, primary: Option<&DefinitionRecord>, scope: GrammarScope) -> FlagTable {
        let mut qualified = FlagTable::default();
        for record in self.registry.records() {
            add_qualified(&mut qualified, record);
        }
        if let Some(primary) = primary {
            add_qualified(&mut qualified, primary);
        }

        let bare = match primary {
            Some(primary) => exposed_bare_flags(primary, &qualified),
            None => Vec::new(),
        };

        match (scope, primary) {
            (GrammarScope::All, _) => {
                let mut table = qualified;
                for entry in bare {
                    table.insert(entry);
                }
                table
            }
            (GrammarScope::Primary, None) => FlagTable::default(),
            (GrammarScope::Primary, Some(primary)) => {
                let mut table = FlagTable::default();
                for descriptor in &primary.parameters {
                    if let Some(entry) = bare.iter().find(|entry| entry.descriptor.name == descriptor.name) {
                        table.insert(entry.clone());
                    }
                    let entry = qualified_entry(descriptor);
                    if descriptor.is_global && !RESERVED_FLAGS.contains(&entry.flag.as_str()) {
                        table.insert(entry);
                    }
                }
                table
            }
        }
    }

    /// Flag spellings the primary definition accepts for one of its parameters,
    /// bare spelling first.
    pub fn flags_for(&self, primary: &DefinitionRecord, parameter: &str) -> Vec<String> {
        self.flag_table(Some(primary), GrammarScope::Primary)
            .entries()
            .iter()
            .filter(|entry| entry.descriptor.name == parameter)
            .map(|entry| format!("--{}", entry.flag))
            .collect()
    }
}

fn qualified_entry(descriptor: &Arc<ParameterDescriptor>) -> FlagEntry {
    FlagEntry {
        flag: descriptor.qualified_flag(),
        target: FlagTarget::Qualified,
        descriptor: Arc::clone(descriptor),
    }
}

fn add_qualified(table: &mut FlagTable, record: &DefinitionRecord) {
    for descriptor in record.parameters.iter().filter(|descriptor| descriptor.is_global) {
        let entry = qualified_entry(descriptor);
        if RESERVED_FLAGS.contains(&entry.flag.as_str()) {
            continue;
        }
        table.insert(entry);
    }
}

fn exposed_bare_flags(primary: &DefinitionRecord, qualified: &FlagTable) -> Vec<FlagEntry> {
    primary
        .parameters
        .iter()
        .filter_map(|descriptor| {
            let flag = descriptor.bare_flag();
            if RESERVED_FLAGS.contains(&flag.as_str()) || qualified.contains(&flag) {
                debug!(definition = %primary.name, flag = %flag, "bare flag collides with an existing flag; only the qualified form is exposed");
                return None;
            }
            Some(FlagEntry {
                flag,
                target: FlagTarget::Bare,
                descriptor: Arc::clone(descriptor),
            })
        })
        .collect()
}
