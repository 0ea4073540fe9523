//! `zen template render` - render a catalog template with variables

use console::style;
use serde_json::Value as JsonValue;
use std::path::{Path, PathBuf};
use zen_core::{VariableType, Vars};
use zen_template::{Template, TemplateEngine};

use super::Context;
use crate::error::{CliError, Result};
use crate::util::short_checksum;

/// Where the rendered document goes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Destination {
    Stdout,
    File(PathBuf),
    /// The template's first declared output path under the workspace root
    Declared,
}

pub struct RenderArgs<'a> {
    pub name: &'a str,
    pub vars: &'a [String],
    pub vars_file: Option<&'a Path>,
    pub destination: Destination,
    pub strict: bool,
}

pub async fn render(ctx: &Context, args: RenderArgs<'_>) -> Result<()> {
    let mut config = ctx.config.templates.clone();
    if args.strict {
        config.strict_mode = true;
    }
    let root = config.workspace_root.clone();

    let client = ctx.client()?;
    let engine = TemplateEngine::builder(config, client).build()?;

    let template = engine.load_template(args.name, &ctx.token).await?;
    let mut vars = match args.vars_file {
        Some(path) => load_vars_file(path)?,
        None => Vars::new(),
    };
    for pair in args.vars {
        let (key, raw) = split_pair(pair)?;
        set_var(&mut vars, key, typed_value(&template, key, raw))?;
    }

    let output = engine.render_asset(args.name, &vars, &ctx.token).await?;

    let target = match args.destination {
        Destination::Stdout => {
            print!("{}", output.content);
            return Ok(());
        }
        Destination::File(path) => path,
        Destination::Declared => match output.output_paths.first() {
            Some(relative) => root.join(relative),
            None => {
                return Err(CliError::input_with_help(
                    format!("template '{}' declares no output path", args.name),
                    "pass --out <path> instead",
                ));
            }
        },
    };

    output.write_to(&target)?;
    println!(
        "{} Rendered {} ({}) to {} {}",
        style("✓").green().bold(),
        output.name,
        output.format,
        target.display(),
        style(short_checksum(&output.checksum)).dim()
    );
    Ok(())
}

/// Read a YAML or JSON mapping of variables
fn load_vars_file(path: &Path) -> Result<Vars> {
    let content = std::fs::read_to_string(path)?;
    let value: JsonValue = serde_yaml::from_str(&content).map_err(|e| {
        CliError::input(format!("cannot parse {}: {}", path.display(), e))
    })?;
    match value {
        JsonValue::Object(map) => Ok(map),
        JsonValue::Null => Ok(Vars::new()),
        _ => Err(CliError::input(format!(
            "{} must contain a mapping of variable names to values",
            path.display()
        ))),
    }
}

fn split_pair(pair: &str) -> Result<(&str, &str)> {
    match pair.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => Ok((key.trim(), value)),
        _ => Err(CliError::input_with_help(
            format!("invalid --var '{}'", pair),
            "expected key=value",
        )),
    }
}

/// Declared string variables keep the raw text; anything else is parsed as a scalar
fn typed_value(template: &Template, key: &str, raw: &str) -> JsonValue {
    let declared = template.variables.iter().find(|v| v.name == key);
    match declared.map(|v| v.var_type) {
        Some(VariableType::String) => JsonValue::String(raw.to_string()),
        _ => parse_scalar(raw),
    }
}

fn parse_scalar(raw: &str) -> JsonValue {
    match raw {
        "true" => JsonValue::Bool(true),
        "false" => JsonValue::Bool(false),
        "null" => JsonValue::Null,
        _ => {
            if let Ok(n) = raw.parse::<i64>() {
                JsonValue::Number(n.into())
            } else if let Some(n) = raw
                .parse::<f64>()
                .ok()
                .and_then(serde_json::Number::from_f64)
            {
                JsonValue::Number(n)
            } else if raw.starts_with('[') || raw.starts_with('{') {
                serde_json::from_str(raw).unwrap_or_else(|_| JsonValue::String(raw.to_string()))
            } else {
                JsonValue::String(raw.to_string())
            }
        }
    }
}

/// Set `a.b.c` as nested maps, replacing non-map intermediates
fn set_var(vars: &mut Vars, key: &str, value: JsonValue) -> Result<()> {
    let mut parts = key.split('.').peekable();
    let mut current = vars;
    while let Some(part) = parts.next() {
        if part.is_empty() {
            return Err(CliError::input(format!("invalid variable name '{}'", key)));
        }
        if parts.peek().is_none() {
            current.insert(part.to_string(), value);
            return Ok(());
        }
        let slot = current
            .entry(part.to_string())
            .or_insert_with(|| JsonValue::Object(Vars::new()));
        if !slot.is_object() {
            *slot = JsonValue::Object(Vars::new());
        }
        let JsonValue::Object(map) = slot else {
            return Err(CliError::input(format!("invalid variable name '{}'", key)));
        };
        current = map;
    }
    Ok(())
}
