use std::fmt;

use serde::{Deserialize, Serialize};

/// Opaque identity assigned to a definition record when it is registered.
///
/// Identities are never reused within a process, so a replaced record and its
/// replacement always differ even though they share a name and a site.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DefinitionId(pub u64);

impl fmt::Display for DefinitionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Whether a definition is a runnable task or a configuration singleton.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DefinitionKind {
    Task,
    Config,
}

/// Where a definition was declared.
///
/// `site` is the identity-bearing part: the source location of the declaring
/// call, or an explicit slot key chosen by the declarer. `module` names the
/// module that was being loaded at the time and is informational only.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Provenance {
    pub site: String,
    pub module: Option<String>,
}

impl Provenance {
    pub fn new(site: impl Into<String>) -> Self {
        Self {
            site: site.into(),
            module: None,
        }
    }

    pub fn with_module(mut self, module: impl Into<String>) -> Self {
        self.module = Some(module.into());
        self
    }

    /// Two provenances describe the same declaration when their sites match.
    pub fn same_site(&self, other: &Provenance) -> bool {
        self.site == other.site
    }
}

impl fmt::Display for Provenance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.module {
            Some(module) => write!(f, "module '{}' at {}", module, self.site),
            None => f.write_str(&self.site),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn site_equality_ignores_module() {
        let first = Provenance::new("src/demo.rs:10:5").with_module("demo");
        let second = Provenance::new("src/demo.rs:10:5");
        assert!(first.same_site(&second));
        assert_eq!(first.to_string(), "module 'demo' at src/demo.rs:10:5");
    }
}
