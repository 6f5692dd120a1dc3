//! Process-wide configuration singletons.
//!
//! A configuration definition is bound at most once per store from the
//! installed command-line values and configuration file; later lookups return
//! the cached instance. Work units read singletons through a shared reference.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard},
};

use indexmap::IndexMap;
use tracing::debug;

use crate::{
    BindError, BindingSources, BoundInstance, CommandLineValues, ConfigFile, DefinitionRecord, DefinitionRegistry,
    LookupError, ResolveError, bind_instance,
};

#[derive(Debug, Default)]
struct StoreState {
    sources: BindingSources,
    instances: HashMap<taskrun_types::DefinitionId, Arc<BoundInstance>>,
}

#[derive(Debug, Default)]
pub struct ConfigStore {
    state: Mutex<StoreState>,
}

impl ConfigStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, StoreState> {
        // A panicking work unit must not take configuration down with it.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Replaces the command-line values and drops cached singletons so they
    /// are rebound against the new values.
    pub fn install_command_line(&self, values: CommandLineValues) {
        let mut state = self.lock();
        state.sources.command_line = values;
        state.instances.clear();
    }

    pub fn set_config_file(&self, config_file: ConfigFile) {
        let mut state = self.lock();
        state.sources.config_file = config_file;
        state.instances.clear();
    }

    /// Snapshot of the installed sources, for binding task instances.
    pub fn sources(&self) -> BindingSources {
        self.lock().sources.clone()
    }

    /// The singleton for a configuration record, bound on first use.
    pub fn instance(&self, record: &Arc<DefinitionRecord>) -> Result<Arc<BoundInstance>, BindError> {
        let mut state = self.lock();
        if let Some(instance) = state.instances.get(&record.id) {
            return Ok(Arc::clone(instance));
        }
        let instance = Arc::new(bind_instance(record, &IndexMap::new(), &state.sources)?);
        debug!(config = %record.name, "constructed configuration singleton");
        state.instances.insert(record.id, Arc::clone(&instance));
        Ok(instance)
    }

    /// Resolves a configuration by name and returns its singleton.
    pub fn get(&self, registry: &DefinitionRegistry, name: &str) -> Result<Arc<BoundInstance>, LookupError> {
        let record = registry.resolve(name)?;
        if !record.is_config() {
            return Err(ResolveError::NotRunnable { name: record.name.clone() }.into());
        }
        Ok(self.instance(&record)?)
    }

    /// Singletons constructed so far.
    pub fn constructed(&self) -> Vec<Arc<BoundInstance>> {
        self.lock().instances.values().cloned().collect()
    }

    /// Forgets sources and cached singletons.
    pub fn reset(&self) {
        *self.lock() = StoreState::default();
    }
}

#[cfg(test)]
mod tests {
    use taskrun_types::{ParamSpec, ParamValue};

    use super::*;
    use crate::Declaration;

    fn registry() -> DefinitionRegistry {
        let mut registry = DefinitionRegistry::new();
        registry
            .register(Declaration::config("core").param(ParamSpec::str("log_level").default("info")))
            .unwrap();
        registry.register(Declaration::task("SomeTask")).unwrap();
        registry
    }

    #[test]
    fn singletons_are_cached_until_sources_change() {
        let registry = registry();
        let store = ConfigStore::new();

        let first = store.get(&registry, "core").unwrap();
        assert!(Arc::ptr_eq(&first, &store.get(&registry, "core").unwrap()));
        assert_eq!(first.str("log_level"), Some("info"));

        let mut values = CommandLineValues::new(None);
        values.insert_qualified("core", "log_level", ParamValue::from("debug"));
        store.install_command_line(values);
        assert_eq!(store.get(&registry, "core").unwrap().str("log_level"), Some("debug"));
    }

    #[test]
    fn tasks_are_not_configuration() {
        let registry = registry();
        let store = ConfigStore::new();
        assert!(matches!(
            store.get(&registry, "SomeTask"),
            Err(LookupError::Resolve(ResolveError::NotRunnable { .. }))
        ));
    }

    #[test]
    fn reset_forgets_everything() {
        let registry = registry();
        let store = ConfigStore::new();
        store.set_config_file(ConfigFile::default().with_value("core", "log_level", "warn"));
        assert_eq!(store.get(&registry, "core").unwrap().str("log_level"), Some("warn"));

        store.reset();
        assert!(store.constructed().is_empty());
        assert_eq!(store.get(&registry, "core").unwrap().str("log_level"), Some("info"));
    }
}
