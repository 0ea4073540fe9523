//! YAML, JSON and OpenAPI processors

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;

use super::{FormatProcessor, ensure_trailing_newline, normalize_newlines};

/// `key: |`, `- >-`, `key: |2` ...
static BLOCK_SCALAR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(^|:\s|-\s)[|>][-+]?[0-9]?\s*$").expect("valid regex"));

#[derive(Debug, Clone, Copy, Default)]
pub struct YamlProcessor;

impl FormatProcessor for YamlProcessor {
    fn format(&self) -> &'static str {
        "yaml"
    }

    fn normalize(&self, output: &str) -> String {
        ensure_trailing_newline(&normalize_newlines(output))
    }

    fn validate(&self, output: &str) -> Vec<String> {
        let mut problems = Vec::new();
        let mut block_indent: Option<usize> = None;

        for (i, line) in output.lines().enumerate() {
            let line_no = i + 1;
            let content = line.trim_start_matches([' ', '\t']);
            let indent = &line[..line.len() - content.len()];

            if line.len() != line.trim_end().len() {
                problems.push(format!("line {}: trailing whitespace", line_no));
            }
            if indent.contains('\t') {
                problems.push(format!("line {}: tab indentation", line_no));
                continue;
            }
            if content.is_empty() {
                continue;
            }

            let width = indent.len();
            if let Some(parent) = block_indent {
                if width > parent {
                    continue;
                }
                block_indent = None;
            }
            if BLOCK_SCALAR.is_match(content) {
                block_indent = Some(width);
            }
            if !content.starts_with('#') && width % 2 != 0 {
                problems.push(format!(
                    "line {}: indentation of {} spaces is not a multiple of 2",
                    line_no, width
                ));
            }
        }

        for document in serde_yaml::Deserializer::from_str(output) {
            if let Err(e) = serde_yaml::Value::deserialize(document) {
                problems.push(format!("invalid YAML: {}", e));
                break;
            }
        }

        problems
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct JsonProcessor;

impl FormatProcessor for JsonProcessor {
    fn format(&self) -> &'static str {
        "json"
    }

    /// Pretty-print with two-space indentation; unparseable output is kept as is
    fn normalize(&self, output: &str) -> String {
        match serde_json::from_str::<serde_json::Value>(output) {
            Ok(value) => match serde_json::to_string_pretty(&value) {
                Ok(pretty) => format!("{}\n", pretty),
                Err(_) => output.to_string(),
            },
            Err(_) => output.to_string(),
        }
    }

    fn validate(&self, output: &str) -> Vec<String> {
        match serde_json::from_str::<serde_json::Value>(output) {
            Ok(_) => Vec::new(),
            Err(e) => vec![format!("invalid JSON: {}", e)],
        }
    }
}

/// OpenAPI documents in YAML or JSON form
#[derive(Debug, Clone, Copy, Default)]
pub struct OpenApiProcessor;

impl FormatProcessor for OpenApiProcessor {
    fn format(&self) -> &'static str {
        "openapi"
    }

    fn normalize(&self, output: &str) -> String {
        if output.trim_start().starts_with('{') {
            JsonProcessor.normalize(output)
        } else {
            YamlProcessor.normalize(output)
        }
    }

    fn validate(&self, output: &str) -> Vec<String> {
        let value: serde_yaml::Value = match serde_yaml::from_str(output) {
            Ok(value) => value,
            Err(e) => return vec![format!("invalid OpenAPI document: {}", e)],
        };
        let Some(map) = value.as_mapping() else {
            return vec!["OpenAPI document must be a mapping".to_string()];
        };

        ["openapi", "info"]
            .iter()
            .filter(|key| !map.contains_key(**key))
            .map(|key| format!("missing required key '{}'", key))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use insta::assert_snapshot;

    #[test]
    fn test_yaml_normalize() {
        let out = YamlProcessor.normalize("name: demo\r\nitems:\r\n  - a\r\n\r\n\r\n");
        assert_eq!(out, "name: demo\nitems:\n  - a\n");
    }

    #[test]
    fn test_yaml_valid() {
        let doc = "name: demo\nscript: |\n   odd indent inside block\n     kept\nlist:\n  - a\n  - b\n";
        assert!(YamlProcessor.validate(doc).is_empty(), "{:?}", YamlProcessor.validate(doc));
    }

    #[test]
    fn test_yaml_multi_document() {
        assert!(YamlProcessor.validate("---\na: 1\n---\nb: 2\n").is_empty());
    }

    #[test]
    fn test_yaml_problems() {
        let problems = YamlProcessor.validate("a: 1 \nb:\n\tc: 2\nd:\n   e: 3\n");
        assert_snapshot!(problems[..3].join("\n"), @r"
        line 1: trailing whitespace
        line 3: tab indentation
        line 5: indentation of 3 spaces is not a multiple of 2
        ");
        assert_eq!(problems.len(), 4);
        assert!(problems[3].starts_with("invalid YAML"));
    }

    #[test]
    fn test_json_normalize() {
        let out = JsonProcessor.normalize(r#"{"name":"demo","tags":["a","b"],"count":2}"#);
        assert_snapshot!(out, @r#"
        {
          "name": "demo",
          "tags": [
            "a",
            "b"
          ],
          "count": 2
        }
        "#);
        assert!(JsonProcessor.validate(&out).is_empty());
    }

    #[test]
    fn test_json_invalid() {
        let problems = JsonProcessor.validate("{\"a\": }");
        assert_eq!(problems.len(), 1);
        assert!(problems[0].starts_with("invalid JSON"));
    }

    #[test]
    fn test_openapi() {
        let doc = "openapi: 3.0.3\ninfo:\n  title: Demo\n  version: 1.0.0\npaths: {}\n";
        assert!(OpenApiProcessor.validate(doc).is_empty());

        let problems = OpenApiProcessor.validate("info:\n  title: Demo\n");
        assert_eq!(problems, vec!["missing required key 'openapi'"]);

        let json = OpenApiProcessor.normalize(r#"{"openapi":"3.1.0","info":{}}"#);
        assert!(json.starts_with("{\n  \"openapi\""));
        assert!(OpenApiProcessor.validate(&json).is_empty());
    }
}
