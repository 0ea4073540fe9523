//! Template metadata extraction
//!
//! Two sources are recognized, in order:
//!
//! 1. A YAML frontmatter block: `---` on the first line, closed by another
//!    `---` line. The block is removed from the template body.
//! 2. `@key: value` directives in the leading comment lines (`{# #}`,
//!    `<!-- -->`, `/* */`, `#`, `//`, `--`). The body is left untouched.
//!
//! A variable directive reads `@variable: name:type:required[:default]:description`.

use serde::Serialize;
use serde_json::Value as JsonValue;
use serde_yaml::Value as YamlValue;
use std::str::FromStr;
use zen_core::{VariableSpec, VariableType};

use crate::error::{EngineError, Result};

const KNOWN_KEYS: &[&str] = &[
    "name",
    "description",
    "category",
    "version",
    "author",
    "tags",
    "created",
    "updated",
    "variables",
];

const BLOCK_COMMENTS: &[(&str, &str)] = &[("{#", "#}"), ("<!--", "-->"), ("/*", "*/")];
const LINE_COMMENTS: &[&str] = &["//", "--", "#"];

/// Descriptive fields declared by a template
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TemplateMetadata {
    pub name: String,
    pub description: String,
    pub category: String,
    pub version: String,
    pub author: String,
    pub tags: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated: Option<String>,
    pub variables: Vec<VariableSpec>,
}

/// Metadata plus the renderable body
#[derive(Debug, Clone, PartialEq)]
pub struct Extracted {
    pub metadata: TemplateMetadata,
    pub body: String,
}

/// Pull metadata out of `content`
///
/// `template` only names the template in errors.
pub fn extract_metadata(template: &str, content: &str) -> Result<Extracted> {
    if let Some((block, body)) = split_frontmatter(content)
        && let Some(metadata) = parse_frontmatter(template, block)?
    {
        return Ok(Extracted {
            metadata,
            body: body.to_string(),
        });
    }

    Ok(Extracted {
        metadata: parse_directives(template, content)?,
        body: content.to_string(),
    })
}

// ============ Frontmatter ============

/// Split `---\n<yaml>\n---\n<body>`; `None` if there is no closed block
fn split_frontmatter(content: &str) -> Option<(&str, &str)> {
    let rest = content
        .strip_prefix("---\n")
        .or_else(|| content.strip_prefix("---\r\n"))?;

    let mut offset = 0;
    for line in rest.split_inclusive('\n') {
        if line.trim_end() == "---" {
            return Some((&rest[..offset], &rest[offset + line.len()..]));
        }
        offset += line.len();
    }
    None
}

/// `Ok(None)` when the block is not metadata (e.g. a YAML document marker)
fn parse_frontmatter(template: &str, block: &str) -> Result<Option<TemplateMetadata>> {
    let Ok(YamlValue::Mapping(map)) = serde_yaml::from_str::<YamlValue>(block) else {
        return Ok(None);
    };
    let has_known_key = map
        .keys()
        .filter_map(YamlValue::as_str)
        .any(|k| KNOWN_KEYS.contains(&k));
    if !has_known_key {
        return Ok(None);
    }

    let field = |key: &str| map.get(key).and_then(scalar_string);
    let mut metadata = TemplateMetadata {
        name: field("name").unwrap_or_default(),
        description: field("description").unwrap_or_default(),
        category: field("category").unwrap_or_default(),
        version: field("version").unwrap_or_default(),
        author: field("author").unwrap_or_default(),
        created: field("created"),
        updated: field("updated"),
        ..Default::default()
    };

    metadata.tags = match map.get("tags") {
        Some(YamlValue::Sequence(items)) => items.iter().filter_map(scalar_string).collect(),
        Some(other) => scalar_string(other).map(|s| split_tags(&s)).unwrap_or_default(),
        None => Vec::new(),
    };

    if let Some(variables) = map.get("variables")
        && !variables.is_null()
    {
        metadata.variables = serde_yaml::from_value(variables.clone()).map_err(|e| {
            EngineError::InvalidMetadata {
                name: template.to_string(),
                message: format!("variables: {}", e),
            }
        })?;
    }

    Ok(Some(metadata))
}

fn scalar_string(value: &YamlValue) -> Option<String> {
    match value {
        YamlValue::String(s) => Some(s.trim().to_string()),
        YamlValue::Number(n) => Some(n.to_string()),
        YamlValue::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn split_tags(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

// ============ Directives ============

fn parse_directives(template: &str, content: &str) -> Result<TemplateMetadata> {
    let mut metadata = TemplateMetadata::default();
    let mut closing: Option<&str> = None;

    for line in content.lines() {
        let mut rest = line.trim();

        if closing.is_none() {
            if rest.is_empty() {
                continue;
            }
            if let Some((open, close)) = BLOCK_COMMENTS.iter().find(|(o, _)| rest.starts_with(o)) {
                rest = &rest[open.len()..];
                closing = Some(close);
            } else if let Some(marker) = LINE_COMMENTS.iter().find(|m| rest.starts_with(*m)) {
                rest = &rest[marker.len()..];
            } else {
                break;
            }
        }

        if let Some(close) = closing
            && let Some(pos) = rest.find(close)
        {
            rest = &rest[..pos];
            closing = None;
        }

        let rest = rest.trim().trim_start_matches('*').trim();
        if let Some(directive) = rest.strip_prefix('@') {
            apply_directive(template, &mut metadata, directive)?;
        }
    }

    Ok(metadata)
}

fn apply_directive(template: &str, metadata: &mut TemplateMetadata, directive: &str) -> Result<()> {
    let Some((key, value)) = directive.split_once(':') else {
        return Ok(());
    };
    let value = value.trim();

    match key.trim().to_ascii_lowercase().as_str() {
        "name" => metadata.name = value.to_string(),
        "description" => metadata.description = value.to_string(),
        "category" => metadata.category = value.to_string(),
        "version" => metadata.version = value.to_string(),
        "author" => metadata.author = value.to_string(),
        "tags" => metadata.tags = split_tags(value),
        "created" => metadata.created = Some(value.to_string()),
        "updated" => metadata.updated = Some(value.to_string()),
        "variable" => metadata.variables.push(parse_variable(template, value)?),
        other => tracing::debug!(template, key = other, "ignoring unknown template directive"),
    }
    Ok(())
}

/// Parse `name:type:required[:default]:description`
///
/// A default containing `:` must be double-quoted, as in
/// `url:string:false:"https://x.io":Base URL`. The description may contain
/// colons freely.
pub fn parse_variable(template: &str, value: &str) -> Result<VariableSpec> {
    let invalid = |message: String| EngineError::InvalidMetadata {
        name: template.to_string(),
        message,
    };

    let parts: Vec<&str> = value.splitn(4, ':').map(str::trim).collect();
    if parts.len() < 3 || parts[0].is_empty() {
        return Err(invalid(format!(
            "variable directive '{}' must be name:type:required[:default]:description",
            value
        )));
    }

    let var_type = VariableType::from_str(parts[1])
        .map_err(|e| invalid(format!("variable '{}': {}", parts[0], e)))?;
    let required = parse_required(parts[2]).ok_or_else(|| {
        invalid(format!(
            "variable '{}': required flag '{}' is not a boolean",
            parts[0], parts[2]
        ))
    })?;

    let mut spec = VariableSpec::new(parts[0], var_type).required(required);
    let Some(rest) = parts.get(3) else {
        return Ok(spec);
    };

    let (default, description) = if let Some(quoted) = rest.strip_prefix('"') {
        let end = quoted
            .find('"')
            .ok_or_else(|| invalid(format!("variable '{}': unterminated quoted default", parts[0])))?;
        let after = quoted[end + 1..].trim_start();
        let description = match after.strip_prefix(':') {
            Some(description) => description,
            None if after.is_empty() => "",
            None => {
                return Err(invalid(format!(
                    "variable '{}': expected ':' after quoted default",
                    parts[0]
                )));
            }
        };
        (Some(&quoted[..end]), description.trim())
    } else {
        match rest.split_once(':') {
            Some((default, description)) => {
                let description = description.trim();
                if description.starts_with("//") {
                    return Err(invalid(format!(
                        "variable '{}': default '{}:{}' contains ':', quote it",
                        parts[0],
                        default.trim(),
                        description
                    )));
                }
                let default = default.trim();
                ((!default.is_empty()).then_some(default), description)
            }
            None => (None, *rest),
        }
    };

    if let Some(default) = default {
        spec.default = Some(typed_default(default, var_type));
    }
    spec.description = description.to_string();
    Ok(spec)
}

fn parse_required(value: &str) -> Option<bool> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "yes" | "required" | "1" => Some(true),
        "false" | "no" | "optional" | "0" | "" => Some(false),
        _ => None,
    }
}

fn typed_default(raw: &str, var_type: VariableType) -> JsonValue {
    let parsed = match var_type {
        VariableType::Int => raw.parse::<i64>().ok().map(JsonValue::from),
        VariableType::Float => raw.parse::<f64>().ok().map(JsonValue::from),
        VariableType::Bool => raw.parse::<bool>().ok().map(JsonValue::from),
        VariableType::Slice | VariableType::Map => serde_json::from_str(raw).ok(),
        VariableType::String | VariableType::Any => None,
    };
    parsed.unwrap_or_else(|| JsonValue::String(raw.to_string()))
}
