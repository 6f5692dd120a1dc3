//! Modules that `--module <name>` can load before arguments are parsed.
//!
//! A module is a registration function run against the catalog with the
//! loading module recorded, so every definition it declares carries the
//! module name in its provenance.

use anyhow::{Result, bail};
use indexmap::IndexMap;
use taskrun_engine::Catalog;
use taskrun_registry::RegistryError;

pub mod demo;

pub type RegisterFn = fn(&mut Catalog) -> Result<(), RegistryError>;

/// Loads definitions by module name.
pub trait ModuleLoader {
    fn load(&self, name: &str, catalog: &mut Catalog) -> Result<()>;
}

/// Modules compiled into the binary.
#[derive(Debug, Clone, Default)]
pub struct StaticModules {
    modules: IndexMap<&'static str, RegisterFn>,
}

impl StaticModules {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_module(mut self, name: &'static str, register: RegisterFn) -> Self {
        self.modules.insert(name, register);
        self
    }

    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.modules.keys().copied()
    }
}

impl ModuleLoader for StaticModules {
    fn load(&self, name: &str, catalog: &mut Catalog) -> Result<()> {
        let Some(register) = self.modules.get(name) else {
            let known: Vec<&str> = self.names().collect();
            if known.is_empty() {
                bail!("no module named '{name}' is available");
            }
            bail!("no module named '{name}' is available (known modules: {})", known.join(", "));
        };
        catalog.set_loading_module(Some(name.to_string()));
        let result = register(catalog);
        catalog.set_loading_module(None);
        Ok(result?)
    }
}

/// Modules shipped with the `taskrun` binary.
pub fn shipped() -> StaticModules {
    StaticModules::new().with_module(demo::MODULE, demo::register)
}
