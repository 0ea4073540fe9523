//! Asset catalog types
//!
//! An [`AssetRecord`] is one row of the catalog produced from the remote
//! manifest. [`AssetContent`] is what a fetch hands back to a caller.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::fmt;
use std::str::FromStr;

use crate::checksum::compute_checksum;
use crate::error::{CoreError, Result};

/// Kind of distributed artifact
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssetType {
    /// Document template rendered by the template engine
    #[default]
    Template,
    /// AI prompt
    Prompt,
    /// Tool (MCP) manifest
    Mcp,
    /// JSON schema
    Schema,
}

impl AssetType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Template => "template",
            Self::Prompt => "prompt",
            Self::Mcp => "mcp",
            Self::Schema => "schema",
        }
    }

    /// Map a manifest `format` tag to an asset type.
    ///
    /// Every published format (markdown, yaml, json, prompt, ...) is rendered
    /// through the template engine.
    pub fn from_format(_format: &str) -> Self {
        Self::Template
    }
}

impl fmt::Display for AssetType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AssetType {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "template" => Ok(Self::Template),
            "prompt" => Ok(Self::Prompt),
            "mcp" => Ok(Self::Mcp),
            "schema" => Ok(Self::Schema),
            other => Err(CoreError::UnknownAssetType {
                value: other.to_string(),
            }),
        }
    }
}

/// Declared type of a template variable
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VariableType {
    #[default]
    #[serde(alias = "str")]
    String,
    #[serde(alias = "integer")]
    Int,
    #[serde(alias = "float64", alias = "number")]
    Float,
    #[serde(alias = "boolean")]
    Bool,
    #[serde(alias = "array", alias = "list")]
    Slice,
    #[serde(alias = "object")]
    Map,
    #[serde(alias = "interface{}")]
    Any,
}

impl VariableType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Int => "int",
            Self::Float => "float",
            Self::Bool => "bool",
            Self::Slice => "slice",
            Self::Map => "map",
            Self::Any => "any",
        }
    }

    /// Check whether a JSON value is acceptable for this type
    pub fn accepts(&self, value: &JsonValue) -> bool {
        match self {
            Self::String => value.is_string(),
            Self::Int => value.is_i64() || value.is_u64(),
            Self::Float => value.is_number(),
            Self::Bool => value.is_boolean(),
            Self::Slice => value.is_array(),
            Self::Map => value.is_object(),
            Self::Any => true,
        }
    }
}

impl fmt::Display for VariableType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for VariableType {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "string" | "str" => Ok(Self::String),
            "int" | "integer" | "int8" | "int16" | "int32" | "int64" | "uint" | "uint8"
            | "uint16" | "uint32" | "uint64" => Ok(Self::Int),
            "float" | "float32" | "float64" | "number" => Ok(Self::Float),
            "bool" | "boolean" => Ok(Self::Bool),
            "slice" | "array" | "list" => Ok(Self::Slice),
            "map" | "object" => Ok(Self::Map),
            "any" | "interface{}" | "" => Ok(Self::Any),
            other => Err(CoreError::UnknownVariableType {
                value: other.to_string(),
            }),
        }
    }
}

/// A variable declared by a template
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariableSpec {
    pub name: String,

    #[serde(rename = "type", default)]
    pub var_type: VariableType,

    #[serde(default)]
    pub required: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<JsonValue>,

    /// Constraint rule, e.g. `length:3-10` or `enum:a,b`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validation: Option<String>,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
}

impl VariableSpec {
    pub fn new(name: impl Into<String>, var_type: VariableType) -> Self {
        Self {
            name: name.into(),
            var_type,
            required: false,
            default: None,
            validation: None,
            description: String::new(),
        }
    }

    pub fn required(mut self, required: bool) -> Self {
        self.required = required;
        self
    }

    pub fn with_default(mut self, default: impl Into<JsonValue>) -> Self {
        self.default = Some(default.into());
        self
    }

    pub fn with_validation(mut self, rule: impl Into<String>) -> Self {
        self.validation = Some(rule.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

/// One row of the asset catalog
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetRecord {
    /// Catalog-wide unique name
    pub name: String,

    #[serde(rename = "type", default)]
    pub asset_type: AssetType,

    /// Output format tag selecting the post-processor
    #[serde(default = "default_format")]
    pub format: String,

    #[serde(default)]
    pub category: String,

    #[serde(default)]
    pub tags: Vec<String>,

    #[serde(default)]
    pub description: String,

    #[serde(default)]
    pub workflow_stages: Vec<String>,

    /// Logical path inside the remote catalog
    pub path: String,

    #[serde(default)]
    pub variables: Vec<VariableSpec>,

    /// Expected `sha256:<hex>` of the published bytes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checksum: Option<String>,

    pub updated_at: DateTime<Utc>,

    /// Command that produces this asset in the workflow CLI
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub command: String,

    /// Files the rendered output is expected to land in
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub output_paths: Vec<String>,
}

fn default_format() -> String {
    "markdown".to_string()
}

impl AssetRecord {
    /// Minimal record, mostly useful for tests and ad-hoc catalogs
    pub fn new(name: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            asset_type: AssetType::Template,
            format: default_format(),
            category: String::new(),
            tags: Vec::new(),
            description: String::new(),
            workflow_stages: Vec::new(),
            path: path.into(),
            variables: Vec::new(),
            checksum: None,
            updated_at: DateTime::<Utc>::UNIX_EPOCH,
            command: String::new(),
            output_paths: Vec::new(),
        }
    }

    /// Checksum to verify against, ignoring blank values
    pub fn expected_checksum(&self) -> Option<&str> {
        self.checksum
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty())
    }

    /// Case-insensitive tag membership
    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t.eq_ignore_ascii_case(tag))
    }
}

/// Result of fetching an asset
#[derive(Debug, Clone, PartialEq)]
pub struct AssetContent {
    pub metadata: Option<AssetRecord>,
    pub content: Vec<u8>,
    /// Always `sha256:<hex>` of `content`
    pub checksum: String,
    pub cached: bool,
    pub cache_age_seconds: i64,
}

impl AssetContent {
    /// Build fresh (uncached) content, computing the checksum
    pub fn new(content: Vec<u8>, metadata: Option<AssetRecord>) -> Self {
        let checksum = compute_checksum(&content);
        Self {
            metadata,
            content,
            checksum,
            cached: false,
            cache_age_seconds: 0,
        }
    }

    /// View content as UTF-8 text
    pub fn text(&self) -> Result<&str> {
        Ok(std::str::from_utf8(&self.content)?)
    }

    pub fn len(&self) -> usize {
        self.content.len()
    }

    pub fn is_empty(&self) -> bool {
        self.content.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_variable_type_aliases() {
        assert_eq!("str".parse::<VariableType>().unwrap(), VariableType::String);
        assert_eq!("integer".parse::<VariableType>().unwrap(), VariableType::Int);
        assert_eq!("int64".parse::<VariableType>().unwrap(), VariableType::Int);
        assert_eq!("number".parse::<VariableType>().unwrap(), VariableType::Float);
        assert_eq!("boolean".parse::<VariableType>().unwrap(), VariableType::Bool);
        assert_eq!("list".parse::<VariableType>().unwrap(), VariableType::Slice);
        assert_eq!("object".parse::<VariableType>().unwrap(), VariableType::Map);
        assert_eq!("interface{}".parse::<VariableType>().unwrap(), VariableType::Any);
        assert!("uuid".parse::<VariableType>().is_err());
    }

    #[test]
    fn test_variable_type_serde_aliases() {
        let spec: VariableSpec = serde_yaml::from_str("name: n\ntype: boolean\n").unwrap();
        assert_eq!(spec.var_type, VariableType::Bool);
        assert!(!spec.required);
    }

    #[test]
    fn test_asset_type_from_format() {
        assert_eq!(AssetType::from_format("markdown"), AssetType::Template);
        assert_eq!(AssetType::from_format("YAML"), AssetType::Template);
        assert_eq!(AssetType::from_format("json"), AssetType::Template);
    }

    #[test]
    fn test_expected_checksum_ignores_blank() {
        let mut record = AssetRecord::new("x", "t/x.md");
        assert_eq!(record.expected_checksum(), None);
        record.checksum = Some("  ".to_string());
        assert_eq!(record.expected_checksum(), None);
        record.checksum = Some("sha256:abc".to_string());
        assert_eq!(record.expected_checksum(), Some("sha256:abc"));
    }

    #[test]
    fn test_has_tag_case_insensitive() {
        let mut record = AssetRecord::new("x", "t/x.md");
        record.tags = vec!["Strategy".to_string()];
        assert!(record.has_tag("strategy"));
        assert!(!record.has_tag("api"));
    }

    #[test]
    fn test_content_checksum() {
        let content = AssetContent::new(b"hello".to_vec(), None);
        assert_eq!(
            content.checksum,
            "sha256:2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
        );
        assert_eq!(content.text().unwrap(), "hello");
        assert!(!content.cached);
    }
}
