//! Name resolution with "did you mean" suggestions.

use std::sync::Arc;

use crate::{DefinitionRecord, DefinitionRegistry, ResolveError};

/// Largest edit distance still worth suggesting.
pub const MAX_SUGGESTION_DISTANCE: usize = 5;

/// Turns a requested task name into the single runnable definition it denotes.
pub struct Resolver<'registry> {
    registry: &'registry DefinitionRegistry,
}

impl<'registry> Resolver<'registry> {
    pub fn new(registry: &'registry DefinitionRegistry) -> Self {
        Self { registry }
    }

    /// Resolves the requested name, falling back to the caller's default.
    ///
    /// An explicitly requested name always wins over the default target.
    pub fn resolve(&self, requested: Option<&str>, default_target: Option<&str>) -> Result<Arc<DefinitionRecord>, ResolveError> {
        let Some(name) = requested.or(default_target) else {
            return Err(ResolveError::NoTargetSpecified);
        };

        let record = self.registry.resolve(name).map_err(|error| match error {
            ResolveError::NotFound { name, .. } => ResolveError::NotFound {
                suggestion: self.suggest(&name),
                name,
            },
            other => other,
        })?;

        if record.is_config() {
            return Err(ResolveError::NotRunnable { name: record.name.clone() });
        }
        Ok(record)
    }

    /// Closest registered task name by Levenshtein distance.
    ///
    /// Candidates must be within [`MAX_SUGGESTION_DISTANCE`] edits and closer
    /// than their own length; ties go to the earliest registered name.
    pub fn suggest(&self, name: &str) -> Option<String> {
        self.registry
            .records()
            .filter(|record| !record.is_config())
            .map(|record| (strsim::levenshtein(name, &record.name), record.name.as_str()))
            .filter(|(distance, candidate)| *distance <= MAX_SUGGESTION_DISTANCE && *distance < candidate.chars().count())
            .min_by_key(|(distance, _)| *distance)
            .map(|(_, candidate)| candidate.to_string())
    }
}
