use std::{panic::Location, sync::Arc};

use indexmap::IndexMap;
use taskrun_types::{DefinitionId, DefinitionKind, ParamSpec, ParameterDescriptor, Provenance, is_valid_identifier};
use tracing::{debug, warn};

use crate::{RegistryError, ResolveError};

/// A registered work-unit or configuration definition.
///
/// Records are immutable once registered. The parameter sequence is already
/// flattened: inherited descriptors first (shared with the ancestor), then the
/// definition's own declarations.
#[derive(Debug, Clone)]
pub struct DefinitionRecord {
    pub id: DefinitionId,
    pub name: String,
    pub kind: DefinitionKind,
    pub provenance: Provenance,
    pub parameters: Vec<Arc<ParameterDescriptor>>,
    /// Names of configuration definitions this definition reads
    pub uses: Vec<String>,
    pub parent: Option<Arc<DefinitionRecord>>,
    pub description: Option<String>,
}

impl DefinitionRecord {
    pub fn parameter(&self, name: &str) -> Option<&Arc<ParameterDescriptor>> {
        self.parameters.iter().find(|descriptor| descriptor.name == name)
    }

    /// Parameters declared by this definition itself.
    pub fn own_parameters(&self) -> impl Iterator<Item = &Arc<ParameterDescriptor>> {
        self.parameters.iter().filter(move |descriptor| descriptor.owner == self.id)
    }

    /// Parent, grandparent, and so on.
    pub fn ancestors(&self) -> impl Iterator<Item = &DefinitionRecord> {
        std::iter::successors(self.parent.as_deref(), |record| record.parent.as_deref())
    }

    pub fn is_config(&self) -> bool {
        self.kind == DefinitionKind::Config
    }

    /// Whether this definition is, or inherits from, a definition called `name`.
    pub fn is_a(&self, name: &str) -> bool {
        self.name == name || self.ancestors().any(|ancestor| ancestor.name == name)
    }
}

/// Builder describing a definition before it is registered.
///
/// The declaration site defaults to the source location of the call that
/// created the builder, so re-running the same declaration replaces the earlier
/// record while a second declaration elsewhere makes the name ambiguous.
#[derive(Debug, Clone)]
pub struct Declaration {
    name: String,
    kind: DefinitionKind,
    site: String,
    parent: Option<Arc<DefinitionRecord>>,
    params: Vec<ParamSpec>,
    uses: Vec<String>,
    description: Option<String>,
}

impl Declaration {
    #[track_caller]
    pub fn task(name: impl Into<String>) -> Self {
        Self::new(name.into(), DefinitionKind::Task, Location::caller())
    }

    #[track_caller]
    pub fn config(name: impl Into<String>) -> Self {
        Self::new(name.into(), DefinitionKind::Config, Location::caller())
    }

    fn new(name: String, kind: DefinitionKind, location: &Location<'_>) -> Self {
        Self {
            name,
            kind,
            site: format!("{}:{}:{}", location.file(), location.line(), location.column()),
            parent: None,
            params: Vec::new(),
            uses: Vec::new(),
            description: None,
        }
    }

    /// Inherit the parent's parameters and configuration dependencies.
    pub fn extends(mut self, parent: &Arc<DefinitionRecord>) -> Self {
        self.parent = Some(Arc::clone(parent));
        self
    }

    pub fn param(mut self, spec: ParamSpec) -> Self {
        self.params.push(spec);
        self
    }

    /// Declare a dependency on a configuration definition, constructed before
    /// the task runs.
    pub fn uses(mut self, config_name: impl Into<String>) -> Self {
        self.uses.push(config_name.into());
        self
    }

    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Replace the source-location site with an explicit slot key. Declarations
    /// sharing a slot replace each other instead of becoming ambiguous.
    pub fn slot(mut self, key: impl Into<String>) -> Self {
        self.site = format!("slot:{}", key.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> DefinitionKind {
        self.kind
    }
}

/// Outcome of [`DefinitionRegistry::register`].
#[derive(Debug, Clone)]
pub struct Registration {
    pub record: Arc<DefinitionRecord>,
    /// Identity of the record this registration replaced in place, if any
    pub replaced: Option<DefinitionId>,
}

/// Process-wide table from definition name to the records declared under it.
#[derive(Debug, Default)]
pub struct DefinitionRegistry {
    entries: IndexMap<String, Vec<Arc<DefinitionRecord>>>,
    next_id: u64,
    loading_module: Option<String>,
}

impl DefinitionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Name of the module whose declarations are being registered; stamped on
    /// each record's provenance.
    pub fn set_loading_module(&mut self, module: Option<String>) {
        self.loading_module = module;
    }

    /// Registers a declaration.
    ///
    /// A record already registered under the same name with the same
    /// declaration site is replaced in place (its position is kept). Any other
    /// existing record under the name stays, and the name becomes ambiguous.
    pub fn register(&mut self, declaration: Declaration) -> Result<Registration, RegistryError> {
        validate_declaration(&declaration)?;

        self.next_id += 1;
        let id = DefinitionId(self.next_id);
        let mut provenance = Provenance::new(declaration.site.clone());
        if let Some(module) = &self.loading_module {
            provenance = provenance.with_module(module.clone());
        }

        let parameters = flatten_parameters(id, &declaration);
        let mut uses: Vec<String> = declaration
            .parent
            .as_ref()
            .map(|parent| parent.uses.clone())
            .unwrap_or_default();
        for config_name in &declaration.uses {
            if !uses.contains(config_name) {
                uses.push(config_name.clone());
            }
        }

        let record = Arc::new(DefinitionRecord {
            id,
            name: declaration.name.clone(),
            kind: declaration.kind,
            provenance,
            parameters,
            uses,
            parent: declaration.parent,
            description: declaration.description,
        });

        let slot = self.entries.entry(record.name.clone()).or_default();
        if let Some(existing) = slot.iter_mut().find(|existing| existing.provenance.same_site(&record.provenance)) {
            let replaced = existing.id;
            *existing = Arc::clone(&record);
            debug!(name = %record.name, id = %id, replaced = %replaced, "replaced definition declared at the same site");
            return Ok(Registration {
                record,
                replaced: Some(replaced),
            });
        }

        slot.push(Arc::clone(&record));
        if slot.len() > 1 {
            warn!(name = %record.name, count = slot.len(), "definition name is declared at more than one site");
        } else {
            debug!(name = %record.name, id = %id, kind = ?record.kind, "registered definition");
        }
        Ok(Registration { record, replaced: None })
    }

    /// Returns the sole live record for `name`.
    pub fn resolve(&self, name: &str) -> Result<Arc<DefinitionRecord>, ResolveError> {
        match self.entries.get(name).map(Vec::as_slice) {
            None | Some([]) => Err(ResolveError::NotFound {
                name: name.to_string(),
                suggestion: None,
            }),
            Some([record]) => Ok(Arc::clone(record)),
            Some(records) => Err(ResolveError::AmbiguousDefinition {
                name: name.to_string(),
                candidates: records.iter().map(|record| record.provenance.clone()).collect(),
            }),
        }
    }

    /// Every registered name, in registration order.
    pub fn all_names(&self) -> Vec<&str> {
        self.entries.keys().map(String::as_str).collect()
    }

    /// Every live record, in registration order.
    pub fn records(&self) -> impl Iterator<Item = &Arc<DefinitionRecord>> {
        self.entries.values().flatten()
    }

    pub fn configurations(&self) -> impl Iterator<Item = &Arc<DefinitionRecord>> {
        self.records().filter(|record| record.is_config())
    }

    pub fn get(&self, id: DefinitionId) -> Option<&Arc<DefinitionRecord>> {
        self.records().find(|record| record.id == id)
    }

    pub fn len(&self) -> usize {
        self.entries.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Forgets every record. Identities keep increasing across resets.
    pub fn reset(&mut self) {
        self.entries.clear();
        self.loading_module = None;
    }
}

fn validate_declaration(declaration: &Declaration) -> Result<(), RegistryError> {
    let invalid = |reason: String| RegistryError::InvalidDeclaration {
        name: declaration.name.clone(),
        reason,
    };
    if !is_valid_identifier(&declaration.name) {
        return Err(invalid("definition names must be identifiers".to_string()));
    }
    let mut seen: Vec<&str> = Vec::with_capacity(declaration.params.len());
    for spec in &declaration.params {
        if !is_valid_identifier(&spec.name) {
            return Err(invalid(format!("parameter '{}' is not an identifier", spec.name)));
        }
        if seen.contains(&spec.name.as_str()) {
            return Err(invalid(format!("parameter '{}' is declared twice", spec.name)));
        }
        if let Some(default) = &spec.default
            && !spec.kind.accepts(default)
        {
            return Err(invalid(format!("default '{}' does not fit parameter '{}' of type {}", default, spec.name, spec.kind)));
        }
        seen.push(&spec.name);
    }
    Ok(())
}

/// Inherited descriptors first, then own declarations; a redeclared name takes
/// over the inherited slot with new ownership.
fn flatten_parameters(id: DefinitionId, declaration: &Declaration) -> Vec<Arc<ParameterDescriptor>> {
    let mut parameters: Vec<Arc<ParameterDescriptor>> = declaration
        .parent
        .as_ref()
        .map(|parent| parent.parameters.clone())
        .unwrap_or_default();

    for spec in &declaration.params {
        let descriptor = Arc::new(ParameterDescriptor::from_spec(spec, id, &declaration.name));
        match parameters.iter_mut().find(|existing| existing.name == spec.name) {
            Some(existing) => *existing = descriptor,
            None => parameters.push(descriptor),
        }
    }
    parameters
}
