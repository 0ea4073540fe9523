//! Engine error types with source-mapped diagnostics

use miette::{Diagnostic, NamedSource, SourceSpan};
use serde_json::{Value as JsonValue, json};
use thiserror::Error;
use zen_assets::AssetError;
use zen_core::{VariableIssue, Vars};

use crate::suggestions::{
    extract_filter_name, extract_function_name, extract_variable_name, suggest_undefined_variable,
    suggest_unknown_filter, suggest_unknown_function,
};

/// Result type for engine operations
pub type Result<T> = std::result::Result<T, EngineError>;

/// Main engine error type
#[derive(Error, Debug, Diagnostic)]
pub enum EngineError {
    #[error("Template not found: {name}")]
    #[diagnostic(code(zen::template::not_found))]
    TemplateNotFound {
        name: String,
        #[help]
        suggestion: Option<String>,
    },

    #[error(transparent)]
    #[diagnostic(transparent)]
    Compilation(TemplateError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Rendering(TemplateError),

    #[error("Invalid metadata in template '{name}': {message}")]
    #[diagnostic(
        code(zen::template::metadata),
        help("Frontmatter must be a YAML mapping between two `---` lines")
    )]
    InvalidMetadata { name: String, message: String },

    #[error("Variable validation failed for '{template}': {}", join_issues(.issues))]
    #[diagnostic(code(zen::template::variables))]
    ValidationFailed {
        template: String,
        issues: Vec<VariableIssue>,
    },

    #[error("Rendered {format} output is invalid: {}", .problems.join("; "))]
    #[diagnostic(
        code(zen::template::output),
        help("Fix the template or render without strict mode")
    )]
    OutputInvalid {
        format: String,
        problems: Vec<String>,
    },

    #[error("Invalid template configuration: {message}")]
    #[diagnostic(code(zen::template::config))]
    InvalidConfig { message: String },

    #[error(transparent)]
    #[diagnostic(code(zen::assets))]
    Asset(#[from] AssetError),

    #[error("IO error: {0}")]
    #[diagnostic(code(zen::io))]
    Io(#[from] std::io::Error),
}

fn join_issues(issues: &[VariableIssue]) -> String {
    issues
        .iter()
        .map(|i| i.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

impl EngineError {
    /// Stable error code surfaced to callers
    pub fn code(&self) -> &'static str {
        match self {
            Self::TemplateNotFound { .. } => "template_not_found",
            Self::Compilation(_) | Self::InvalidMetadata { .. } => "compilation_failed",
            Self::Rendering(_) | Self::Io(_) => "rendering_failed",
            Self::ValidationFailed { .. } | Self::OutputInvalid { .. } => "validation_failed",
            Self::InvalidConfig { .. } => "configuration_error",
            Self::Asset(e) => e.code(),
        }
    }

    /// Structured details for machine-readable output
    pub fn details(&self) -> Option<JsonValue> {
        match self {
            Self::TemplateNotFound { name, .. } => Some(json!({ "name": name })),
            Self::Compilation(e) | Self::Rendering(e) => Some(json!({
                "template": e.src.name(),
                "kind": e.kind.to_code_string(),
                "line": e.line,
            })),
            Self::ValidationFailed { template, issues } => Some(json!({
                "template": template,
                "issues": issues
                    .iter()
                    .map(|i| json!({
                        "variable": i.variable,
                        "code": i.code(),
                        "message": i.message,
                    }))
                    .collect::<Vec<_>>(),
            })),
            Self::OutputInvalid { format, problems } => {
                Some(json!({ "format": format, "problems": problems }))
            }
            Self::Asset(e) => e.details(),
            Self::InvalidMetadata { .. } | Self::InvalidConfig { .. } | Self::Io(_) => None,
        }
    }

    /// Retry hint for rate-limited fetches
    pub fn retry_after_seconds(&self) -> Option<u64> {
        match self {
            Self::Asset(e) => e.retry_after_seconds(),
            _ => None,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Asset(e) if e.is_cancelled())
    }
}

/// Error kind for categorizing template errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum TemplateErrorKind {
    UndefinedVariable,
    UnknownFilter,
    UnknownFunction,
    SyntaxError,
    TypeError,
    InvalidOperation,
    Other,
}

impl TemplateErrorKind {
    /// Convert to a code string for diagnostics
    pub fn to_code_string(&self) -> &'static str {
        match self {
            Self::UndefinedVariable => "undefined_variable",
            Self::UnknownFilter => "unknown_filter",
            Self::UnknownFunction => "unknown_function",
            Self::SyntaxError => "syntax",
            Self::TypeError => "type",
            Self::InvalidOperation => "invalid_operation",
            Self::Other => "render",
        }
    }
}

/// Template-specific error with source information
#[derive(Error, Debug, Diagnostic, Clone)]
#[error("{message}")]
#[diagnostic(code(zen::template::render))]
pub struct TemplateError {
    /// Error message
    pub message: String,

    /// Error kind for categorization
    pub kind: TemplateErrorKind,

    /// Template source code
    #[source_code]
    pub src: NamedSource<String>,

    /// Error location in source
    #[label("error occurred here")]
    pub span: Option<SourceSpan>,

    /// 1-based line reported by the template engine
    pub line: Option<usize>,

    /// Suggestion for fixing the error
    #[help]
    pub suggestion: Option<String>,
}

impl TemplateError {
    /// Create a template error from a MiniJinja error
    ///
    /// `vars` are the render-time variables, used to suggest close names
    /// for undefined ones.
    pub fn from_minijinja(
        err: &minijinja::Error,
        template_name: &str,
        template_source: &str,
        vars: Option<&Vars>,
    ) -> Self {
        let (kind, message) = categorize_minijinja_error(err);
        let line = err.line();
        let span = line.and_then(|line_num| calculate_span(template_source, line_num));
        let line_text = line.and_then(|n| template_source.lines().nth(n.saturating_sub(1)));
        let suggestion = generate_suggestion(kind, line_text, vars);

        Self {
            message: format!("{}: {}", template_name, message),
            kind,
            src: NamedSource::new(template_name, template_source.to_string()),
            span,
            line,
            suggestion,
        }
    }

    /// Create a simple error without source mapping
    pub fn simple(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            kind: TemplateErrorKind::Other,
            src: NamedSource::new("<unknown>", String::new()),
            span: None,
            line: None,
            suggestion: None,
        }
    }

    /// Add a suggestion
    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }

    /// Get the error kind
    pub fn kind(&self) -> TemplateErrorKind {
        self.kind
    }
}

/// Categorize a MiniJinja error into our error kinds
fn categorize_minijinja_error(err: &minijinja::Error) -> (TemplateErrorKind, String) {
    let msg = err
        .detail()
        .map(str::to_string)
        .unwrap_or_else(|| err.to_string());
    let msg_lower = msg.to_lowercase();

    let kind = match err.kind() {
        minijinja::ErrorKind::UndefinedError => TemplateErrorKind::UndefinedVariable,
        minijinja::ErrorKind::UnknownFilter => TemplateErrorKind::UnknownFilter,
        minijinja::ErrorKind::UnknownFunction => TemplateErrorKind::UnknownFunction,
        minijinja::ErrorKind::SyntaxError => TemplateErrorKind::SyntaxError,
        minijinja::ErrorKind::InvalidOperation => TemplateErrorKind::InvalidOperation,
        minijinja::ErrorKind::NonPrimitive | minijinja::ErrorKind::NonKey => {
            TemplateErrorKind::TypeError
        }
        _ => {
            if msg_lower.contains("undefined") {
                TemplateErrorKind::UndefinedVariable
            } else if msg_lower.contains("not iterable") || msg_lower.contains("cannot") {
                TemplateErrorKind::TypeError
            } else {
                TemplateErrorKind::Other
            }
        }
    };

    let message = match kind {
        TemplateErrorKind::UndefinedVariable => msg.replace("undefined value", "undefined variable"),
        _ => msg
            .replace("invalid operation: ", "")
            .replace("syntax error: ", ""),
    };

    let message = if message.trim().is_empty() {
        kind.to_code_string().replace('_', " ")
    } else {
        message
    };

    (kind, message)
}

/// Calculate the source span for a given line number
fn calculate_span(source: &str, line_num: usize) -> Option<SourceSpan> {
    let mut offset = 0;

    for (index, line) in source.lines().enumerate() {
        if index + 1 == line_num {
            return Some(SourceSpan::new(offset.into(), line.len()));
        }
        offset += line.len() + 1;
    }

    None
}

/// Generate suggestions based on error kind and the offending source line
fn generate_suggestion(
    kind: TemplateErrorKind,
    line: Option<&str>,
    vars: Option<&Vars>,
) -> Option<String> {
    match kind {
        TemplateErrorKind::UndefinedVariable => {
            let available: Vec<String> = vars
                .map(|v| v.keys().cloned().collect())
                .unwrap_or_default();
            let name = extract_variable_name(line?, &available)?;
            suggest_undefined_variable(&name, &available)
        }
        TemplateErrorKind::UnknownFilter => {
            extract_filter_name(line?).and_then(|name| suggest_unknown_filter(&name))
        }
        TemplateErrorKind::UnknownFunction => {
            extract_function_name(line?).and_then(|name| suggest_unknown_function(&name))
        }
        TemplateErrorKind::SyntaxError => Some(
            "Check that every `{%` block is closed and delimiters match the configured ones"
                .to_string(),
        ),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use zen_core::{IssueKind, VariableSpec, VariableType, VariableValidator};

    fn render_error(source: &str) -> minijinja::Error {
        let mut env = minijinja::Environment::new();
        env.set_undefined_behavior(minijinja::UndefinedBehavior::Strict);
        match env.add_template("t", source) {
            Err(e) => e,
            Ok(()) => env
                .get_template("t")
                .and_then(|t| t.render(minijinja::context! { title => "x" }))
                .expect_err("template should fail"),
        }
    }

    #[test]
    fn test_calculate_span() {
        let source = "line one\nline two\nline three";
        let span = calculate_span(source, 2).unwrap();
        assert_eq!(span.offset(), 9);
        assert_eq!(span.len(), 8);
        assert!(calculate_span(source, 10).is_none());
    }

    #[test]
    fn test_undefined_variable_error() {
        let source = "# {{ title }}\n{{ titel }}\n";
        let err = TemplateError::from_minijinja(&render_error(source), "t", source, None);
        assert_eq!(err.kind(), TemplateErrorKind::UndefinedVariable);
        assert!(err.message.starts_with("t: "));
        assert_eq!(err.line, Some(2));
        assert!(err.span.is_some());
    }

    #[test]
    fn test_undefined_variable_suggestion_uses_vars() {
        let source = "{{ projct }}";
        let mut vars = Vars::new();
        vars.insert("project".to_string(), "zen".into());
        let err = TemplateError::from_minijinja(&render_error(source), "t", source, Some(&vars));
        let help = err.suggestion.unwrap_or_default();
        assert!(help.contains("project"), "{}", help);
    }

    #[test]
    fn test_syntax_error_kind() {
        let source = "{% if x %}unclosed";
        let err = TemplateError::from_minijinja(&render_error(source), "t", source, None);
        assert_eq!(err.kind(), TemplateErrorKind::SyntaxError);
        assert!(err.suggestion.is_some());
    }

    #[test]
    fn test_unknown_filter_suggestion() {
        let source = "{{ title | snakecas }}";
        let err = TemplateError::from_minijinja(&render_error(source), "t", source, None);
        assert_eq!(err.kind(), TemplateErrorKind::UnknownFilter);
    }

    #[test]
    fn test_error_codes() {
        let not_found = EngineError::TemplateNotFound {
            name: "x".into(),
            suggestion: None,
        };
        assert_eq!(not_found.code(), "template_not_found");

        let compile = EngineError::Compilation(TemplateError::simple("bad"));
        assert_eq!(compile.code(), "compilation_failed");
        assert_eq!(EngineError::Rendering(TemplateError::simple("bad")).code(), "rendering_failed");

        let output = EngineError::OutputInvalid {
            format: "json".into(),
            problems: vec!["not json".into()],
        };
        assert_eq!(output.code(), "validation_failed");
        assert!(output.to_string().contains("not json"));

        let asset: EngineError = AssetError::RateLimited { retry_after: 30 }.into();
        assert_eq!(asset.code(), "rate_limited");
        assert_eq!(asset.retry_after_seconds(), Some(30));

        let cancelled: EngineError = AssetError::Cancelled.into();
        assert!(cancelled.is_cancelled());
    }

    #[test]
    fn test_validation_failed_details() {
        let specs = vec![
            VariableSpec::new("N", VariableType::String)
                .required(true)
                .with_validation("length:3-10"),
        ];
        let mut vars = Vars::new();
        vars.insert("N".to_string(), "hi".into());
        let issues = VariableValidator::new().validate(&vars, &specs);
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].kind, IssueKind::Constraint);

        let err = EngineError::ValidationFailed {
            template: "t".into(),
            issues,
        };
        assert_eq!(err.code(), "validation_failed");
        assert!(err.to_string().contains("length 2 is outside range 3-10"));

        let details = err.details().unwrap();
        assert_eq!(details["issues"][0]["code"], "variable_invalid");
        assert_eq!(details["issues"][0]["variable"], "N");
    }
}
