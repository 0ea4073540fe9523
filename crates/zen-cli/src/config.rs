//! `zen` configuration file
//!
//! One YAML file with an `assets:` section ([`AssetConfig`]) and a
//! `templates:` section ([`TemplateConfig`]). Without `--config`, the file
//! `<workspace>/.zen/config.yaml` is used when it exists.

use std::path::{Path, PathBuf};
use zen_assets::AssetConfig;
use zen_template::TemplateConfig;

use crate::error::{CliError, Result};

pub const CONFIG_FILE: &str = ".zen/config.yaml";

const SECTIONS: &[&str] = &["assets", "templates"];

#[derive(Debug, Clone, Default)]
pub struct ZenConfig {
    pub assets: AssetConfig,
    pub templates: TemplateConfig,
}

impl ZenConfig {
    /// Resolve, read and finish the configuration for `workspace`
    ///
    /// An explicit path must exist; the workspace default is optional.
    pub fn load(explicit: Option<&Path>, workspace: &Path) -> Result<Self> {
        let config = match explicit {
            Some(path) => Self::read(path)?,
            None => {
                let default = workspace.join(CONFIG_FILE);
                if default.is_file() {
                    Self::read(&default)?
                } else {
                    tracing::debug!(path = %default.display(), "no configuration file, using defaults");
                    Self::default()
                }
            }
        };
        Ok(config.finish(workspace))
    }

    fn read(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| CliError::Config {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        Self::from_yaml_str(&content).map_err(|e| CliError::Config {
            path: path.display().to_string(),
            message: e.to_string(),
        })
    }

    pub fn from_yaml_str(content: &str) -> Result<Self> {
        let value: serde_yaml::Value =
            serde_yaml::from_str(content).map_err(|e| config_error(e.to_string()))?;

        let map = match value {
            serde_yaml::Value::Null => return Ok(Self::default()),
            serde_yaml::Value::Mapping(map) => map,
            _ => return Err(config_error("configuration must be a mapping")),
        };

        for key in map.keys() {
            let name = key.as_str().unwrap_or("<non-string key>");
            if !SECTIONS.contains(&name) {
                tracing::warn!(key = name, "ignoring unknown configuration section");
            }
        }

        let section = |name: &str| -> Result<String> {
            match map.get(name) {
                Some(v) => serde_yaml::to_string(v).map_err(|e| config_error(e.to_string())),
                None => Ok(String::new()),
            }
        };

        Ok(Self {
            assets: AssetConfig::from_yaml_str(&section("assets")?)?,
            templates: TemplateConfig::from_yaml_str(&section("templates")?)?,
        })
    }

    /// Apply environment overrides and anchor the template root at `workspace`
    fn finish(mut self, workspace: &Path) -> Self {
        self.assets = self.assets.with_env_overrides();
        self.templates.workspace_root = resolve_root(workspace, &self.templates.workspace_root);
        self
    }
}

fn resolve_root(workspace: &Path, root: &Path) -> PathBuf {
    if root.is_absolute() {
        root.to_path_buf()
    } else if root == Path::new(".") {
        workspace.to_path_buf()
    } else {
        workspace.join(root)
    }
}

fn config_error(message: impl Into<String>) -> CliError {
    CliError::Config {
        path: CONFIG_FILE.to_string(),
        message: message.into(),
    }
}
