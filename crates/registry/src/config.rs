//! Configuration file holding per-definition parameter values.
//!
//! The file maps definition names to sections of `parameter: value` pairs:
//!
//! ```json
//! { "core": { "log_level": "debug" }, "RequiredConfig": { "required-test-param": "A" } }
//! ```
//!
//! Keys may use the parameter name or its flag spelling. YAML is accepted for
//! `.yaml`/`.yml` paths.

use std::{
    env,
    path::{Path, PathBuf},
};

use dirs_next::{config_dir, home_dir};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Environment variable overriding the configuration file location.
pub const CONFIG_PATH_ENV: &str = "TASKRUN_CONFIG_PATH";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read configuration file {}: {source}", path.display())]
    Io { path: PathBuf, source: std::io::Error },

    #[error("could not parse configuration file {}: {reason}", path.display())]
    Parse { path: PathBuf, reason: String },
}

#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConfigFile {
    pub sections: IndexMap<String, IndexMap<String, Value>>,
}

impl ConfigFile {
    /// Loads the file at [`default_config_path`]; a missing file is an empty
    /// configuration.
    pub fn load() -> Result<Self, ConfigError> {
        let path = default_config_path();
        if !path.exists() {
            return Ok(ConfigFile::default());
        }
        Self::load_from(&path)
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let is_yaml = matches!(path.extension().and_then(|extension| extension.to_str()), Some("yaml" | "yml"));
        let parsed = if is_yaml {
            serde_yaml::from_str::<ConfigFile>(&content).map_err(|error| error.to_string())
        } else {
            serde_json::from_str::<ConfigFile>(&content).map_err(|error| error.to_string())
        };
        parsed.map_err(|reason| ConfigError::Parse {
            path: path.to_path_buf(),
            reason,
        })
    }

    pub fn with_value(mut self, section: &str, key: &str, value: impl Into<Value>) -> Self {
        self.sections
            .entry(section.to_string())
            .or_default()
            .insert(key.to_string(), value.into());
        self
    }

    /// The raw string for `section.parameter`, looked up by parameter name
    /// and then by flag spelling. Scalars are stringified; null is absent.
    pub fn raw_value(&self, section: &str, parameter: &str) -> Option<String> {
        let entries = self.sections.get(section)?;
        let value = entries
            .get(parameter)
            .or_else(|| entries.get(&parameter.replace('_', "-")))?;
        match value {
            Value::Null => None,
            Value::String(text) => Some(text.clone()),
            Value::Bool(flag) => Some(flag.to_string()),
            Value::Number(number) => Some(number.to_string()),
            other => Some(other.to_string()),
        }
    }
}

/// Get the default path for the configuration file.
pub fn default_config_path() -> PathBuf {
    if let Ok(path) = env::var(CONFIG_PATH_ENV)
        && !path.trim().is_empty()
    {
        return expand_tilde(&path);
    }

    config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("taskrun")
        .join("config.json")
}

fn expand_tilde(path: &str) -> PathBuf {
    match (path.strip_prefix("~/"), home_dir()) {
        (Some(rest), Some(home)) => home.join(rest),
        _ => PathBuf::from(path),
    }
}
