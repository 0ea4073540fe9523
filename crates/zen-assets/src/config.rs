//! Asset client configuration
//!
//! Loaded from the `assets:` YAML document. The recognized keys form a closed
//! set; anything else is ignored with a warning.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{AssetError, Result};

/// Auth providers understood by the credential layer
pub const SUPPORTED_PROVIDERS: &[&str] = &["github", "gitlab", "none"];

const KNOWN_KEYS: &[&str] = &[
    "repository_url",
    "branch",
    "cache_path",
    "cache_size_mb",
    "default_ttl",
    "auth_provider",
    "sync_timeout_seconds",
    "max_concurrent_ops",
    "integrity_checks_enabled",
    "prefetch_enabled",
];

/// Environment variables that override file values
pub const ENV_REPOSITORY_URL: &str = "ZEN_ASSETS_REPOSITORY_URL";
pub const ENV_BRANCH: &str = "ZEN_ASSETS_BRANCH";
pub const ENV_CACHE_PATH: &str = "ZEN_ASSETS_CACHE_PATH";
pub const ENV_AUTH_PROVIDER: &str = "ZEN_ASSETS_AUTH_PROVIDER";

/// Configuration for [`AssetClient`](crate::AssetClient)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AssetConfig {
    /// Remote catalog location (`https://`, `file://` or an absolute path)
    pub repository_url: String,

    pub branch: String,

    /// Cache directory; a leading `~` is expanded to the home directory
    pub cache_path: String,

    pub cache_size_mb: u64,

    /// TTL applied to cache entries written by the client
    #[serde(with = "humantime_serde")]
    pub default_ttl: Duration,

    pub auth_provider: String,

    pub sync_timeout_seconds: u64,

    pub max_concurrent_ops: usize,

    pub integrity_checks_enabled: bool,

    pub prefetch_enabled: bool,
}

impl Default for AssetConfig {
    fn default() -> Self {
        Self {
            repository_url: "https://github.com/zen-workspace/zen-assets".to_string(),
            branch: "main".to_string(),
            cache_path: "~/.zen/cache/assets".to_string(),
            cache_size_mb: 100,
            default_ttl: Duration::from_secs(24 * 60 * 60),
            auth_provider: "github".to_string(),
            sync_timeout_seconds: 30,
            max_concurrent_ops: 3,
            integrity_checks_enabled: true,
            prefetch_enabled: true,
        }
    }
}

impl AssetConfig {
    /// Load configuration from a YAML file
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&content).map_err(|e| match e {
            AssetError::InvalidConfig { message } => AssetError::InvalidConfig {
                message: format!("{}: {}", path.display(), message),
            },
            other => other,
        })
    }

    /// Parse configuration from YAML text, warning on unknown keys
    pub fn from_yaml_str(content: &str) -> Result<Self> {
        let value: serde_yaml::Value =
            serde_yaml::from_str(content).map_err(|e| AssetError::InvalidConfig {
                message: e.to_string(),
            })?;

        match &value {
            serde_yaml::Value::Null => return Ok(Self::default()),
            serde_yaml::Value::Mapping(map) => {
                for key in map.keys() {
                    let name = key.as_str().unwrap_or("<non-string key>");
                    if !KNOWN_KEYS.contains(&name) {
                        tracing::warn!(key = name, "ignoring unknown asset configuration key");
                    }
                }
            }
            _ => {
                return Err(AssetError::InvalidConfig {
                    message: "configuration must be a mapping".to_string(),
                });
            }
        }

        serde_yaml::from_value(value).map_err(|e| AssetError::InvalidConfig {
            message: e.to_string(),
        })
    }

    /// Apply `ZEN_ASSETS_*` overrides from the process environment
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary lookup (the environment in production)
    pub fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(url) = get(ENV_REPOSITORY_URL) {
            self.repository_url = url;
        }
        if let Some(branch) = get(ENV_BRANCH) {
            self.branch = branch;
        }
        if let Some(path) = get(ENV_CACHE_PATH) {
            self.cache_path = path;
        }
        if let Some(provider) = get(ENV_AUTH_PROVIDER) {
            self.auth_provider = provider;
        }
        self
    }

    /// Check the configuration for values the client cannot work with
    pub fn validate(&self) -> Result<()> {
        let url = self.repository_url.trim();
        if url.is_empty() {
            return Err(AssetError::InvalidConfig {
                message: "repository_url is required".to_string(),
            });
        }
        if (url.starts_with("http://") || url.starts_with("https://"))
            && url::Url::parse(url).is_err()
        {
            return Err(AssetError::InvalidRepositoryUrl {
                url: url.to_string(),
                reason: "not a valid URL".to_string(),
            });
        }

        let provider = self.auth_provider.trim().to_ascii_lowercase();
        if !SUPPORTED_PROVIDERS.contains(&provider.as_str()) {
            return Err(AssetError::UnsupportedProvider {
                provider: self.auth_provider.clone(),
            });
        }

        if self.cache_size_mb == 0 {
            return Err(AssetError::InvalidConfig {
                message: "cache_size_mb must be greater than zero".to_string(),
            });
        }
        if self.sync_timeout_seconds == 0 {
            return Err(AssetError::InvalidConfig {
                message: "sync_timeout_seconds must be greater than zero".to_string(),
            });
        }
        Ok(())
    }

    /// Cache directory with `~` expanded
    pub fn expanded_cache_path(&self) -> PathBuf {
        expand_home(&self.cache_path)
    }

    /// Cache limit in bytes
    pub fn cache_size_bytes(&self) -> u64 {
        self.cache_size_mb.saturating_mul(1024 * 1024)
    }

    pub fn sync_timeout(&self) -> Duration {
        Duration::from_secs(self.sync_timeout_seconds)
    }

    /// Normalized provider name
    pub fn provider(&self) -> String {
        self.auth_provider.trim().to_ascii_lowercase()
    }
}

/// Expand a leading `~` to the user's home directory
pub fn expand_home(path: &str) -> PathBuf {
    if path == "~" {
        if let Some(home) = dirs::home_dir() {
            return home;
        }
    } else if let Some(rest) = path.strip_prefix("~/")
        && let Some(home) = dirs::home_dir()
    {
        return home.join(rest);
    }
    PathBuf::from(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AssetConfig::default();
        assert_eq!(config.branch, "main");
        assert_eq!(config.cache_size_mb, 100);
        assert_eq!(config.default_ttl, Duration::from_secs(86400));
        assert_eq!(config.auth_provider, "github");
        assert_eq!(config.sync_timeout_seconds, 30);
        assert_eq!(config.max_concurrent_ops, 3);
        assert!(config.integrity_checks_enabled);
        assert!(config.prefetch_enabled);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_partial_yaml() {
        let config = AssetConfig::from_yaml_str(
            "repository_url: https://example.com/assets\ndefault_ttl: 2h\ncache_size_mb: 5\nsurprise: true\n",
        )
        .unwrap();
        assert_eq!(config.repository_url, "https://example.com/assets");
        assert_eq!(config.default_ttl, Duration::from_secs(7200));
        assert_eq!(config.cache_size_bytes(), 5 * 1024 * 1024);
        assert_eq!(config.branch, "main");
    }

    #[test]
    fn test_empty_yaml_is_default() {
        assert_eq!(AssetConfig::from_yaml_str("").unwrap(), AssetConfig::default());
    }

    #[test]
    fn test_non_mapping_rejected() {
        let err = AssetConfig::from_yaml_str("- a\n- b\n").unwrap_err();
        assert_eq!(err.code(), "configuration_error");
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = AssetConfig {
            auth_provider: "bitbucket".to_string(),
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(AssetError::UnsupportedProvider { .. })
        ));

        config.auth_provider = "GitLab".to_string();
        assert!(config.validate().is_ok());

        config.cache_size_mb = 0;
        assert_eq!(config.validate().unwrap_err().code(), "configuration_error");

        config.cache_size_mb = 1;
        config.sync_timeout_seconds = 0;
        assert!(config.validate().is_err());

        config.sync_timeout_seconds = 1;
        config.repository_url = "  ".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_overrides() {
        let config = AssetConfig::default().with_overrides(|key| match key {
            ENV_REPOSITORY_URL => Some("file:///srv/assets".to_string()),
            ENV_BRANCH => Some("develop".to_string()),
            ENV_AUTH_PROVIDER => Some("".to_string()),
            _ => None,
        });
        assert_eq!(config.repository_url, "file:///srv/assets");
        assert_eq!(config.branch, "develop");
        assert_eq!(config.auth_provider, "github");
    }

    #[test]
    fn test_expand_home() {
        assert_eq!(expand_home("/tmp/cache"), PathBuf::from("/tmp/cache"));
        if let Some(home) = dirs::home_dir() {
            assert_eq!(expand_home("~/x"), home.join("x"));
        }
    }
}
