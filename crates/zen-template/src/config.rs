//! Template engine configuration

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{EngineError, Result};

const KNOWN_KEYS: &[&str] = &[
    "cache_enabled",
    "cache_ttl",
    "cache_size",
    "strict_mode",
    "enable_ai",
    "default_delims",
    "workspace_root",
];

/// Variable delimiters of the template language
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Delimiters {
    pub left: String,
    pub right: String,
}

impl Default for Delimiters {
    fn default() -> Self {
        Self {
            left: "{{".to_string(),
            right: "}}".to_string(),
        }
    }
}

/// Configuration for [`TemplateEngine`](crate::TemplateEngine)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TemplateConfig {
    pub cache_enabled: bool,

    /// How long a compiled template stays valid
    #[serde(with = "humantime_serde")]
    pub cache_ttl: Duration,

    /// Maximum number of compiled templates kept in memory
    pub cache_size: usize,

    /// Undefined variables are errors and output formats are validated
    pub strict_mode: bool,

    /// Reserved; accepted for compatibility and exposed through `zenConfig`
    pub enable_ai: bool,

    pub default_delims: Delimiters,

    pub workspace_root: PathBuf,
}

impl Default for TemplateConfig {
    fn default() -> Self {
        Self {
            cache_enabled: true,
            cache_ttl: Duration::from_secs(30 * 60),
            cache_size: 100,
            strict_mode: false,
            enable_ai: false,
            default_delims: Delimiters::default(),
            workspace_root: PathBuf::from("."),
        }
    }
}

impl TemplateConfig {
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&content).map_err(|e| match e {
            EngineError::InvalidConfig { message } => EngineError::InvalidConfig {
                message: format!("{}: {}", path.display(), message),
            },
            other => other,
        })
    }

    /// Parse configuration from YAML text, warning on unknown keys
    pub fn from_yaml_str(content: &str) -> Result<Self> {
        let value: serde_yaml::Value =
            serde_yaml::from_str(content).map_err(|e| EngineError::InvalidConfig {
                message: e.to_string(),
            })?;

        match &value {
            serde_yaml::Value::Null => return Ok(Self::default()),
            serde_yaml::Value::Mapping(map) => {
                for key in map.keys() {
                    let name = key.as_str().unwrap_or("<non-string key>");
                    if !KNOWN_KEYS.contains(&name) {
                        tracing::warn!(key = name, "ignoring unknown template configuration key");
                    }
                }
            }
            _ => {
                return Err(EngineError::InvalidConfig {
                    message: "configuration must be a mapping".to_string(),
                });
            }
        }

        serde_yaml::from_value(value).map_err(|e| EngineError::InvalidConfig {
            message: e.to_string(),
        })
    }

    pub fn validate(&self) -> Result<()> {
        let Delimiters { left, right } = &self.default_delims;
        if left.trim().is_empty() || right.trim().is_empty() {
            return Err(EngineError::InvalidConfig {
                message: "default_delims must both be non-empty".to_string(),
            });
        }
        if left == right {
            return Err(EngineError::InvalidConfig {
                message: format!("default_delims cannot both be '{}'", left),
            });
        }
        if self.cache_enabled && self.cache_size == 0 {
            return Err(EngineError::InvalidConfig {
                message: "cache_size must be greater than zero when caching is enabled"
                    .to_string(),
            });
        }
        Ok(())
    }

    /// Flattened view served by the `zenConfig(key)` template function
    pub fn settings(&self) -> BTreeMap<String, JsonValue> {
        let mut settings = BTreeMap::new();
        settings.insert("cache_enabled".into(), self.cache_enabled.into());
        settings.insert("cache_ttl_seconds".into(), self.cache_ttl.as_secs().into());
        settings.insert("cache_size".into(), self.cache_size.into());
        settings.insert("strict_mode".into(), self.strict_mode.into());
        settings.insert("enable_ai".into(), self.enable_ai.into());
        settings.insert("delims_left".into(), self.default_delims.left.clone().into());
        settings.insert("delims_right".into(), self.default_delims.right.clone().into());
        settings.insert(
            "workspace_root".into(),
            self.workspace_root.display().to_string().into(),
        );
        settings
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = TemplateConfig::default();
        assert!(config.cache_enabled);
        assert_eq!(config.cache_ttl, Duration::from_secs(1800));
        assert_eq!(config.cache_size, 100);
        assert!(!config.strict_mode);
        assert_eq!(config.default_delims.left, "{{");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_yaml() {
        let config = TemplateConfig::from_yaml_str(
            "cache_ttl: 5m\nstrict_mode: true\ndefault_delims:\n  left: \"[[\"\n  right: \"]]\"\nbogus: 1\n",
        )
        .unwrap();
        assert_eq!(config.cache_ttl, Duration::from_secs(300));
        assert!(config.strict_mode);
        assert_eq!(config.default_delims.right, "]]");
        assert_eq!(config.cache_size, 100);

        assert_eq!(TemplateConfig::from_yaml_str("").unwrap(), TemplateConfig::default());
        assert!(TemplateConfig::from_yaml_str("- a").is_err());
        assert!(TemplateConfig::from_yaml_str("cache_ttl: soon").is_err());
    }

    #[test]
    fn test_validate() {
        let mut config = TemplateConfig::default();
        config.default_delims.left = "}}".to_string();
        let err = config.validate().unwrap_err();
        assert_eq!(err.code(), "configuration_error");

        let config = TemplateConfig {
            cache_size: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_settings() {
        let settings = TemplateConfig::default().settings();
        assert_eq!(settings["cache_ttl_seconds"], 1800);
        assert_eq!(settings["strict_mode"], false);
        assert_eq!(settings["workspace_root"], ".");
    }
}
