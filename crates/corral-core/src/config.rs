//! Engine configuration loaded from `corral.yaml`.
//!
//! Configuration covers engine-wide defaults only (page sizes, cache
//! behavior). Per-request knobs travel inside the query spec itself.

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

use crate::spec::DEFAULT_LIMIT;

/// Errors raised while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_yaml::Error),
}

/// Engine-wide settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Project name, informational only.
    pub project: Option<String>,

    /// Page size applied when a request does not ask for one.
    pub default_limit: i64,

    /// Hard ceiling on requested page sizes. Folded into validation when a
    /// request does not carry its own `maxLimit` rule.
    pub max_limit: Option<i64>,

    /// Cache behavior.
    pub cache: CacheSettings,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            project: None,
            default_limit: DEFAULT_LIMIT,
            max_limit: None,
            cache: CacheSettings::default(),
        }
    }
}

/// Cache layer settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheSettings {
    /// Master switch; a disabled cache treats every get as a miss.
    pub enabled: bool,

    /// TTL applied when a request's cache directive does not carry one.
    pub default_ttl_secs: u64,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            default_ttl_secs: 300,
        }
    }
}

impl EngineConfig {
    /// Load configuration from a YAML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_yaml(&contents)
    }

    /// Parse configuration from a YAML string.
    pub fn from_yaml(contents: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(contents)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_engine_conventions() {
        let config = EngineConfig::default();
        assert_eq!(config.default_limit, 10);
        assert!(config.max_limit.is_none());
        assert!(config.cache.enabled);
        assert_eq!(config.cache.default_ttl_secs, 300);
    }

    #[test]
    fn partial_yaml_fills_in_defaults() {
        let config = EngineConfig::from_yaml(
            "project: demo\nmax_limit: 200\ncache:\n  default_ttl_secs: 30\n",
        )
        .unwrap();
        assert_eq!(config.project.as_deref(), Some("demo"));
        assert_eq!(config.max_limit, Some(200));
        assert_eq!(config.default_limit, 10);
        assert!(config.cache.enabled);
        assert_eq!(config.cache.default_ttl_secs, 30);
    }

    #[test]
    fn malformed_yaml_is_a_parse_error() {
        let err = EngineConfig::from_yaml("default_limit: [not a number").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }
}
