//! Template variable validation
//!
//! Three independent passes check a variable bundle against declared
//! [`VariableSpec`]s:
//! - **required**: declared-required variables must be present and non-empty
//! - **types**: present values must match the declared type
//! - **constraints**: the `validation` rule (`<kind>:<rule>`) must hold
//!
//! Each pass returns its own issue list; [`VariableValidator::validate`]
//! concatenates them in that order.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use serde_json::Value as JsonValue;
use std::fmt;

use crate::asset::VariableSpec;
use crate::error::{CoreError, Result};

/// Variable bundle handed to templates
pub type Vars = serde_json::Map<String, JsonValue>;

static RANGE_RULE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*(-?\d+(?:\.\d+)?)\s*-\s*(-?\d+(?:\.\d+)?)\s*$").expect("static regex")
});

static LENGTH_RULE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*(\d+)\s*(?:-\s*(\d+)\s*)?$").expect("static regex"));

/// Category of a validation problem
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueKind {
    Required,
    Type,
    Constraint,
    /// The declared rule itself could not be parsed
    InvalidRule,
}

impl IssueKind {
    /// Stable error code surfaced to callers
    pub fn code(&self) -> &'static str {
        match self {
            Self::Required => "variable_required",
            Self::Type | Self::Constraint => "variable_invalid",
            Self::InvalidRule => "configuration_error",
        }
    }
}

/// A single validation problem
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VariableIssue {
    pub variable: String,
    pub kind: IssueKind,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<JsonValue>,
}

impl VariableIssue {
    fn new(spec: &VariableSpec, kind: IssueKind, message: String, value: Option<&JsonValue>) -> Self {
        Self {
            variable: spec.name.clone(),
            kind,
            message,
            value: value.cloned(),
        }
    }

    pub fn code(&self) -> &'static str {
        self.kind.code()
    }
}

impl fmt::Display for VariableIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.variable, self.message)
    }
}

/// Parsed constraint rule
#[derive(Debug, Clone)]
pub enum Rule {
    Regex(Regex),
    Range { min: f64, max: f64 },
    Length { min: usize, max: usize },
    Enum(Vec<String>),
    Min(f64),
    Max(f64),
}

impl Rule {
    /// Parse a `<kind>:<rule>` string
    pub fn parse(raw: &str) -> Result<Self> {
        let invalid = |message: &str| CoreError::InvalidRule {
            rule: raw.to_string(),
            message: message.to_string(),
        };

        let (kind, rule) = raw
            .split_once(':')
            .ok_or_else(|| invalid("expected <kind>:<rule>"))?;

        match kind.trim().to_ascii_lowercase().as_str() {
            "regex" | "pattern" => {
                let anchored = format!("^(?:{})$", rule);
                Regex::new(&anchored)
                    .map(Rule::Regex)
                    .map_err(|e| invalid(&e.to_string()))
            }
            "range" => {
                let caps = RANGE_RULE
                    .captures(rule)
                    .ok_or_else(|| invalid("expected range:<min>-<max>"))?;
                let min = parse_f64(&caps[1]).ok_or_else(|| invalid("bad minimum"))?;
                let max = parse_f64(&caps[2]).ok_or_else(|| invalid("bad maximum"))?;
                if min > max {
                    return Err(invalid("minimum is greater than maximum"));
                }
                Ok(Rule::Range { min, max })
            }
            "length" | "len" => {
                let caps = LENGTH_RULE
                    .captures(rule)
                    .ok_or_else(|| invalid("expected length:<n> or length:<min>-<max>"))?;
                let min: usize = caps[1].parse().map_err(|_| invalid("bad length"))?;
                let max = match caps.get(2) {
                    Some(m) => m.as_str().parse().map_err(|_| invalid("bad length"))?,
                    None => min,
                };
                if min > max {
                    return Err(invalid("minimum is greater than maximum"));
                }
                Ok(Rule::Length { min, max })
            }
            "enum" | "oneof" => {
                let options: Vec<String> = rule
                    .split(',')
                    .map(|o| o.trim().to_string())
                    .filter(|o| !o.is_empty())
                    .collect();
                if options.is_empty() {
                    return Err(invalid("enum needs at least one option"));
                }
                Ok(Rule::Enum(options))
            }
            "min" => parse_f64(rule)
                .map(Rule::Min)
                .ok_or_else(|| invalid("expected a number")),
            "max" => parse_f64(rule)
                .map(Rule::Max)
                .ok_or_else(|| invalid("expected a number")),
            other => Err(invalid(&format!("unknown rule kind '{}'", other))),
        }
    }

    /// Check a value, returning a message when the rule is violated
    pub fn check(&self, name: &str, value: &JsonValue) -> Option<String> {
        match self {
            Rule::Regex(re) => {
                let s = stringify(value);
                (!re.is_match(&s)).then(|| {
                    format!(
                        "variable '{}' value '{}' does not match pattern {}",
                        name,
                        s,
                        re.as_str()
                    )
                })
            }
            Rule::Range { min, max } => match coerce_f64(value) {
                None => Some(format!("variable '{}' is not numeric", name)),
                Some(n) if n < *min || n > *max => Some(format!(
                    "variable '{}' value {} is outside range {}-{}",
                    name,
                    fmt_num(n),
                    fmt_num(*min),
                    fmt_num(*max)
                )),
                Some(_) => None,
            },
            Rule::Length { min, max } => {
                let len = measure(value);
                if len >= *min && len <= *max {
                    None
                } else if min == max {
                    Some(format!(
                        "variable '{}' length {} does not equal required length {}",
                        name, len, min
                    ))
                } else {
                    Some(format!(
                        "variable '{}' length {} is outside range {}-{}",
                        name, len, min, max
                    ))
                }
            }
            Rule::Enum(options) => {
                let s = stringify(value);
                (!options.iter().any(|o| *o == s)).then(|| {
                    format!(
                        "variable '{}' value '{}' is not one of [{}]",
                        name,
                        s,
                        options.join(", ")
                    )
                })
            }
            Rule::Min(min) => match coerce_f64(value) {
                None => Some(format!("variable '{}' is not numeric", name)),
                Some(n) if n < *min => Some(format!(
                    "variable '{}' value {} is less than minimum {}",
                    name,
                    fmt_num(n),
                    fmt_num(*min)
                )),
                Some(_) => None,
            },
            Rule::Max(max) => match coerce_f64(value) {
                None => Some(format!("variable '{}' is not numeric", name)),
                Some(n) if n > *max => Some(format!(
                    "variable '{}' value {} is greater than maximum {}",
                    name,
                    fmt_num(n),
                    fmt_num(*max)
                )),
                Some(_) => None,
            },
        }
    }
}

/// Validator for template variable bundles
#[derive(Debug, Default, Clone, Copy)]
pub struct VariableValidator;

impl VariableValidator {
    pub fn new() -> Self {
        Self
    }

    /// Run all three passes and concatenate their issues
    pub fn validate(&self, vars: &Vars, specs: &[VariableSpec]) -> Vec<VariableIssue> {
        let mut issues = self.validate_required(vars, specs);
        issues.extend(self.validate_types(vars, specs));
        issues.extend(self.validate_constraints(vars, specs));
        issues
    }

    /// Required variables must be present and non-empty
    pub fn validate_required(&self, vars: &Vars, specs: &[VariableSpec]) -> Vec<VariableIssue> {
        specs
            .iter()
            .filter(|spec| spec.required)
            .filter(|spec| vars.get(&spec.name).is_none_or(is_empty_value))
            .map(|spec| {
                VariableIssue::new(
                    spec,
                    IssueKind::Required,
                    format!("variable '{}' is required", spec.name),
                    None,
                )
            })
            .collect()
    }

    /// Present, non-null values must match the declared type
    pub fn validate_types(&self, vars: &Vars, specs: &[VariableSpec]) -> Vec<VariableIssue> {
        specs
            .iter()
            .filter_map(|spec| {
                let value = vars.get(&spec.name).filter(|v| !v.is_null())?;
                if spec.var_type.accepts(value) {
                    return None;
                }
                Some(VariableIssue::new(
                    spec,
                    IssueKind::Type,
                    format!(
                        "variable '{}' must be of type {}, got {}",
                        spec.name,
                        spec.var_type,
                        json_kind(value)
                    ),
                    Some(value),
                ))
            })
            .collect()
    }

    /// Declared `validation` rules must hold for present values
    pub fn validate_constraints(&self, vars: &Vars, specs: &[VariableSpec]) -> Vec<VariableIssue> {
        let mut issues = Vec::new();

        for spec in specs {
            let Some(raw) = spec.validation.as_deref().filter(|r| !r.trim().is_empty()) else {
                continue;
            };
            let Some(value) = vars.get(&spec.name).filter(|v| !v.is_null()) else {
                continue;
            };

            match Rule::parse(raw) {
                Ok(rule) => {
                    if let Some(message) = rule.check(&spec.name, value) {
                        issues.push(VariableIssue::new(
                            spec,
                            IssueKind::Constraint,
                            message,
                            Some(value),
                        ));
                    }
                }
                Err(e) => issues.push(VariableIssue::new(
                    spec,
                    IssueKind::InvalidRule,
                    e.to_string(),
                    None,
                )),
            }
        }

        issues
    }

    /// Return a copy of `vars` with declared defaults filled in for missing keys
    pub fn apply_defaults(&self, vars: &Vars, specs: &[VariableSpec]) -> Vars {
        let mut result = vars.clone();
        for spec in specs {
            if let Some(default) = &spec.default
                && !result.contains_key(&spec.name)
            {
                result.insert(spec.name.clone(), default.clone());
            }
        }
        result
    }
}

/// Nil, whitespace-only strings and empty collections count as missing
fn is_empty_value(value: &JsonValue) -> bool {
    match value {
        JsonValue::Null => true,
        JsonValue::String(s) => s.trim().is_empty(),
        JsonValue::Array(a) => a.is_empty(),
        JsonValue::Object(o) => o.is_empty(),
        _ => false,
    }
}

fn json_kind(value: &JsonValue) -> &'static str {
    match value {
        JsonValue::Null => "null",
        JsonValue::Bool(_) => "bool",
        JsonValue::Number(n) if n.is_f64() => "float",
        JsonValue::Number(_) => "int",
        JsonValue::String(_) => "string",
        JsonValue::Array(_) => "slice",
        JsonValue::Object(_) => "map",
    }
}

/// Plain-text rendering used by regex and enum rules
pub fn stringify(value: &JsonValue) -> String {
    match value {
        JsonValue::String(s) => s.clone(),
        JsonValue::Null => String::new(),
        other => other.to_string(),
    }
}

fn measure(value: &JsonValue) -> usize {
    match value {
        JsonValue::String(s) => s.chars().count(),
        JsonValue::Array(a) => a.len(),
        JsonValue::Object(o) => o.len(),
        other => stringify(other).chars().count(),
    }
}

fn coerce_f64(value: &JsonValue) -> Option<f64> {
    match value {
        JsonValue::Number(n) => n.as_f64(),
        JsonValue::String(s) => parse_f64(s),
        _ => None,
    }
}

fn parse_f64(s: &str) -> Option<f64> {
    s.trim().parse::<f64>().ok().filter(|n| n.is_finite())
}

fn fmt_num(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        n.to_string()
    }
}
