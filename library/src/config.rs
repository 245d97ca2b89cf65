//! Engine configuration, stored as TOML.

use std::fs;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

const CONFIG_FILE_NAME: &str = "engine.toml";

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct CacheConfig {
    /// Total cost budget of the value cache, in approximate bytes
    pub memory_budget: usize,
    /// Number of independently locked value cache shards
    pub shards: usize,
    /// Capacity of the cross-request hash memo; 0 disables it
    pub hash_cache_entries: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            memory_budget: 512 * 1024 * 1024,
            shards: 16,
            hash_cache_entries: 64 * 1024,
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Default)]
#[serde(default)]
pub struct EvaluationConfig {
    /// Recompute cache hits and check reads against `affects`
    pub verify: bool,
    /// Worker threads for `Graph::get_values`; 0 uses the global rayon pool
    pub threads: usize,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Default)]
#[serde(default)]
pub struct EngineConfig {
    pub cache: CacheConfig,
    pub evaluation: EvaluationConfig,
}

impl EngineConfig {
    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        let config: EngineConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path)?;
        Self::from_toml(&text)
    }

    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)?;
        }
        fs::write(path, self.to_toml()?)?;
        info!("Engine config saved to {}", path.display());
        Ok(())
    }

    /// Loads `engine.toml` from the user config directory, falling back to
    /// defaults when it is missing or unreadable.
    pub fn load_or_default() -> Self {
        let Some(path) = default_config_path() else {
            return Self::default();
        };
        if !path.exists() {
            return Self::default();
        }
        match Self::load(&path) {
            Ok(config) => config,
            Err(e) => {
                warn!(
                    "Failed to load {}, using defaults: {}",
                    path.display(),
                    e
                );
                Self::default()
            }
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.cache.shards == 0 {
            return Err(ConfigError::Invalid("cache.shards must be > 0".to_string()));
        }
        Ok(())
    }

    pub(crate) fn shard_count(&self) -> NonZeroUsize {
        NonZeroUsize::new(self.cache.shards).unwrap_or(NonZeroUsize::MIN)
    }
}

pub fn default_config_path() -> Option<PathBuf> {
    ProjectDirs::from("me", "liesegang", "nodegraph")
        .map(|dirs| dirs.config_dir().join(CONFIG_FILE_NAME))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = EngineConfig::from_toml("[evaluation]\nverify = true\n").unwrap();
        assert!(config.evaluation.verify);
        assert_eq!(config.cache, CacheConfig::default());
    }

    #[test]
    fn test_zero_shards_rejected() {
        let err = EngineConfig::from_toml("[cache]\nshards = 0\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn test_malformed_toml_is_a_parse_error() {
        let err = EngineConfig::from_toml("[cache\n").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_save_and_load() {
        let dir = std::env::temp_dir().join(format!("nodegraph-config-{}", uuid::Uuid::new_v4()));
        let path = dir.join(CONFIG_FILE_NAME);
        let mut config = EngineConfig::default();
        config.cache.memory_budget = 1024;
        config.evaluation.threads = 2;
        config.save(&path).unwrap();
        assert_eq!(EngineConfig::load(&path).unwrap(), config);
        std::fs::remove_dir_all(&dir).unwrap();
    }
}
