//! Definitions paired with their behavior.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard},
};

use once_cell::sync::Lazy;
use taskrun_registry::{
    BoundInstance, ConfigStore, Declaration, DefinitionId, DefinitionKind, DefinitionRecord, DefinitionRegistry, LookupError,
    RegistryError, ResolveError, bind_instance,
};
use tracing::debug;

use crate::{TaskRequest, WorkUnit};

static CATALOG: Lazy<Mutex<Catalog>> = Lazy::new(|| Mutex::new(Catalog::new()));

/// The process-wide catalog that modules register into.
pub fn global() -> MutexGuard<'static, Catalog> {
    CATALOG.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// The definition registry, the work unit of every task definition and the
/// configuration singletons.
#[derive(Default)]
pub struct Catalog {
    registry: DefinitionRegistry,
    units: HashMap<DefinitionId, Arc<dyn WorkUnit>>,
    configs: ConfigStore,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn registry(&self) -> &DefinitionRegistry {
        &self.registry
    }

    pub fn configs(&self) -> &ConfigStore {
        &self.configs
    }

    /// Name of the module whose registrations follow.
    pub fn set_loading_module(&mut self, module: Option<String>) {
        self.registry.set_loading_module(module);
    }

    /// Registers a task definition with its behavior. Redeclaring at the same
    /// site replaces both.
    pub fn register_task(
        &mut self,
        declaration: Declaration,
        unit: impl WorkUnit + 'static,
    ) -> Result<Arc<DefinitionRecord>, RegistryError> {
        if declaration.kind() != DefinitionKind::Task {
            return Err(RegistryError::InvalidDeclaration {
                name: declaration.name().to_string(),
                reason: "configuration definitions carry no work unit".to_string(),
            });
        }
        let registration = self.registry.register(declaration)?;
        if let Some(replaced) = registration.replaced {
            self.units.remove(&replaced);
        }
        self.units.insert(registration.record.id, Arc::new(unit));
        Ok(registration.record)
    }

    pub fn register_config(&mut self, declaration: Declaration) -> Result<Arc<DefinitionRecord>, RegistryError> {
        if declaration.kind() != DefinitionKind::Config {
            return Err(RegistryError::InvalidDeclaration {
                name: declaration.name().to_string(),
                reason: "task definitions need a work unit".to_string(),
            });
        }
        Ok(self.registry.register(declaration)?.record)
    }

    pub fn unit(&self, id: DefinitionId) -> Option<Arc<dyn WorkUnit>> {
        self.units.get(&id).cloned()
    }

    /// Resolves and binds a task request against the installed sources.
    pub fn bind(&self, request: &TaskRequest) -> Result<BoundInstance, LookupError> {
        let record = self.registry.resolve(&request.name)?;
        if record.is_config() {
            return Err(ResolveError::NotRunnable { name: record.name.clone() }.into());
        }
        Ok(bind_instance(&record, &request.overrides, &self.configs.sources())?)
    }

    /// The configuration singleton named `name`.
    pub fn config(&self, name: &str) -> Result<Arc<BoundInstance>, LookupError> {
        self.configs.get(&self.registry, name)
    }

    /// Constructs every configuration singleton that binds, for reporting.
    ///
    /// Singletons with unsatisfied required parameters are skipped.
    pub fn all_configs(&self) -> Vec<Arc<BoundInstance>> {
        self.registry
            .configurations()
            .filter_map(|record| match self.configs.instance(record) {
                Ok(instance) => Some(instance),
                Err(error) => {
                    debug!(config = %record.name, error = %error, "configuration not constructed for the summary");
                    None
                }
            })
            .collect()
    }

    /// Forgets every definition, work unit and singleton.
    pub fn reset(&mut self) {
        self.registry.reset();
        self.units.clear();
        self.configs.reset();
    }
}
