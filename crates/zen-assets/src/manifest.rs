//! Catalog manifest parsing
//!
//! The manifest is a YAML document with a `schema_version`, a `generated`
//! timestamp, a `version` and an `activities` map. Each activity becomes one
//! [`AssetRecord`]; the map's order is the catalog order.

use chrono::{DateTime, NaiveDate, Utc};
use indexmap::IndexMap;
use serde::Deserialize;
use serde_json::Value as JsonValue;
use std::collections::HashMap;
use zen_core::{AssetRecord, AssetType, VariableSpec, VariableType};

use crate::error::{AssetError, ManifestIssue, Result};

/// A parsed manifest
#[derive(Debug, Clone, PartialEq)]
pub struct Manifest {
    pub schema_version: String,
    pub generated: Option<DateTime<Utc>>,
    pub version: String,
    pub records: Vec<AssetRecord>,
}

#[derive(Debug, Default, Deserialize)]
struct RawManifest {
    #[serde(default)]
    schema_version: Option<serde_yaml::Value>,
    #[serde(default)]
    generated: Option<serde_yaml::Value>,
    #[serde(default)]
    version: Option<serde_yaml::Value>,
    #[serde(default)]
    activities: Option<IndexMap<String, RawActivity>>,
}

#[derive(Debug, Default, Deserialize)]
struct RawActivity {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    command: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    format: Option<String>,
    #[serde(default)]
    category: Option<String>,
    #[serde(default)]
    workflow_stages: Vec<String>,
    #[serde(default)]
    tags: Vec<String>,
    #[serde(default)]
    assets: RawAssets,
    #[serde(default)]
    variables: Vec<RawVariable>,
    #[serde(default)]
    checksum: Option<String>,
    #[serde(default)]
    updated_at: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct RawAssets {
    #[serde(default)]
    template: Option<String>,
    #[serde(default)]
    prompt: Option<String>,
    #[serde(default)]
    output: OneOrMany,
}

#[derive(Debug, Default, Deserialize)]
#[serde(untagged)]
enum OneOrMany {
    #[default]
    None,
    One(String),
    Many(Vec<String>),
}

impl OneOrMany {
    fn into_vec(self) -> Vec<String> {
        match self {
            OneOrMany::None => Vec::new(),
            OneOrMany::One(s) => vec![s],
            OneOrMany::Many(v) => v,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct RawVariable {
    #[serde(default)]
    name: Option<String>,
    #[serde(rename = "type", default)]
    var_type: Option<String>,
    #[serde(default)]
    required: bool,
    #[serde(default)]
    default: Option<serde_yaml::Value>,
    #[serde(default)]
    validation: Option<String>,
    #[serde(default)]
    description: Option<String>,
}

/// Parses manifest bytes into catalog records
#[derive(Debug, Clone, Copy, Default)]
pub struct ManifestParser;

impl ManifestParser {
    /// Parse and validate a manifest
    ///
    /// Every validation problem is reported, each with the path of the
    /// offending field.
    pub fn parse(bytes: &[u8]) -> Result<Manifest> {
        let text = std::str::from_utf8(bytes).map_err(|e| invalid("", format!("not UTF-8: {}", e)))?;

        let value: serde_yaml::Value = serde_yaml::from_str(text)
            .map_err(|e| invalid("", format!("invalid YAML: {}", e)))?;

        let raw: RawManifest = match value {
            serde_yaml::Value::Null => RawManifest::default(),
            serde_yaml::Value::Mapping(_) => serde_yaml::from_value(value)
                .map_err(|e| invalid("", format!("unexpected structure: {}", e)))?,
            _ => return Err(invalid("", "manifest must be a mapping")),
        };

        let mut issues = Vec::new();

        let schema_version = raw
            .schema_version
            .as_ref()
            .and_then(scalar_to_string)
            .unwrap_or_default();
        if schema_version.trim().is_empty() {
            issues.push(ManifestIssue::new("schema_version", "is required"));
        }

        let generated = raw
            .generated
            .as_ref()
            .and_then(scalar_to_string)
            .filter(|s| !s.trim().is_empty())
            .and_then(|s| {
                let parsed = parse_timestamp(&s);
                if parsed.is_none() {
                    tracing::warn!(value = %s, "ignoring unparseable manifest 'generated' timestamp");
                }
                parsed
            });

        let version = raw
            .version
            .as_ref()
            .and_then(scalar_to_string)
            .unwrap_or_default();

        let mut records = Vec::new();
        let mut seen: HashMap<String, String> = HashMap::new();

        for (key, activity) in raw.activities.unwrap_or_default() {
            let prefix = format!("activities.{}", key);
            let before = issues.len();

            let name = required_field(&mut issues, &prefix, "name", activity.name.as_deref());
            let command =
                required_field(&mut issues, &prefix, "command", activity.command.as_deref());
            let description = required_field(
                &mut issues,
                &prefix,
                "description",
                activity.description.as_deref(),
            );

            if !name.is_empty() {
                if let Some(first) = seen.get(&name) {
                    issues.push(ManifestIssue::new(
                        format!("{}.name", prefix),
                        format!("duplicate name '{}' (also used by activities.{})", name, first),
                    ));
                } else {
                    seen.insert(name.clone(), key.clone());
                }
            }

            let mut variables = Vec::with_capacity(activity.variables.len());
            for (i, raw_var) in activity.variables.into_iter().enumerate() {
                let var_name = raw_var.name.as_deref().map(str::trim).unwrap_or_default().to_string();
                if var_name.is_empty() {
                    issues.push(ManifestIssue::new(
                        format!("{}.variables[{}].name", prefix, i),
                        "is required",
                    ));
                    continue;
                }
                variables.push(convert_variable(&prefix, &var_name, raw_var));
            }

            if issues.len() > before {
                continue;
            }

            let format = activity
                .format
                .map(|f| f.trim().to_string())
                .filter(|f| !f.is_empty())
                .unwrap_or_else(|| "markdown".to_string());

            let path = activity
                .assets
                .template
                .clone()
                .or_else(|| activity.assets.prompt.clone())
                .map(|p| p.trim().to_string())
                .filter(|p| !p.is_empty())
                .unwrap_or_else(|| format!("templates/{}.md.tmpl", key));

            let updated_at = activity
                .updated_at
                .as_deref()
                .and_then(parse_timestamp)
                .or(generated)
                .unwrap_or(DateTime::<Utc>::UNIX_EPOCH);

            records.push(AssetRecord {
                name,
                asset_type: AssetType::from_format(&format),
                format,
                category: activity.category.unwrap_or_default().trim().to_string(),
                tags: activity.tags,
                description,
                workflow_stages: activity.workflow_stages,
                path,
                variables,
                checksum: activity
                    .checksum
                    .map(|c| c.trim().to_string())
                    .filter(|c| !c.is_empty()),
                updated_at,
                command,
                output_paths: activity.assets.output.into_vec(),
            });
        }

        if !issues.is_empty() {
            return Err(AssetError::InvalidManifest { issues });
        }

        tracing::debug!(
            schema_version = %schema_version,
            version = %version,
            assets = records.len(),
            "parsed manifest"
        );

        Ok(Manifest {
            schema_version,
            generated,
            version,
            records,
        })
    }
}

fn invalid(path: &str, message: impl Into<String>) -> AssetError {
    AssetError::InvalidManifest {
        issues: vec![ManifestIssue::new(path, message)],
    }
}

fn required_field(
    issues: &mut Vec<ManifestIssue>,
    prefix: &str,
    field: &str,
    value: Option<&str>,
) -> String {
    let value = value.map(str::trim).unwrap_or_default();
    if value.is_empty() {
        issues.push(ManifestIssue::new(
            format!("{}.{}", prefix, field),
            "is required",
        ));
    }
    value.to_string()
}

fn convert_variable(prefix: &str, name: &str, raw: RawVariable) -> VariableSpec {
    let type_name = raw.var_type.unwrap_or_default();
    let var_type = type_name.parse::<VariableType>().unwrap_or_else(|_| {
        tracing::warn!(
            variable = %format!("{}.{}", prefix, name),
            declared = %type_name,
            "unknown variable type, accepting any value"
        );
        VariableType::Any
    });

    let default = raw.default.and_then(|v| match v {
        serde_yaml::Value::Null => None,
        other => yaml_to_json(&other),
    });

    VariableSpec {
        name: name.to_string(),
        var_type,
        required: raw.required,
        default,
        validation: raw
            .validation
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty()),
        description: raw.description.unwrap_or_default(),
    }
}

fn yaml_to_json(value: &serde_yaml::Value) -> Option<JsonValue> {
    match serde_json::to_value(value) {
        Ok(json) => Some(json),
        Err(e) => {
            tracing::warn!(error = %e, "dropping variable default that has no JSON form");
            None
        }
    }
}

fn scalar_to_string(value: &serde_yaml::Value) -> Option<String> {
    match value {
        serde_yaml::Value::String(s) => Some(s.clone()),
        serde_yaml::Value::Number(n) => Some(n.to_string()),
        serde_yaml::Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Parse an RFC 3339 timestamp or a bare `YYYY-MM-DD` date
pub fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
}
