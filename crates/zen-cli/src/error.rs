//! CLI error types with exit code handling
//!
//! Library errors pass through with their own diagnostics; the CLI only adds
//! input, configuration and output failures of its own.

use miette::Diagnostic;
use thiserror::Error;
use zen_assets::AssetError;
use zen_template::EngineError;

use crate::exit_codes;

/// CLI-specific error type that includes exit code information
#[derive(Error, Debug)]
pub enum CliError {
    #[error(transparent)]
    Asset(#[from] AssetError),

    #[error(transparent)]
    Engine(#[from] EngineError),

    /// Bad command-line input (`--var`, `--vars-file`, filter values)
    #[error("Invalid input: {message}")]
    Input { message: String, help: Option<String> },

    #[error("Invalid configuration in {path}: {message}")]
    Config { path: String, message: String },

    /// IO error (file not found, permissions, etc.)
    #[error("IO error: {message}")]
    Io { message: String },

    #[error("Failed to format output: {message}")]
    Output { message: String },
}

// Written by hand instead of derived: `#[diagnostic(transparent)]` expands to
// `inner.code()`, which resolves to the inherent `EngineError::code()` rather
// than the `Diagnostic` method. Trait methods are called fully qualified here.
impl Diagnostic for CliError {
    fn code<'a>(&'a self) -> Option<Box<dyn std::fmt::Display + 'a>> {
        let code = match self {
            CliError::Asset(_) => "zen::assets",
            CliError::Engine(e) => return Diagnostic::code(e),
            CliError::Input { .. } => "zen::cli::input",
            CliError::Config { .. } => "zen::cli::config",
            CliError::Io { .. } => "zen::cli::io",
            CliError::Output { .. } => "zen::cli::output",
        };
        Some(Box::new(code))
    }

    fn severity(&self) -> Option<miette::Severity> {
        match self {
            CliError::Engine(e) => Diagnostic::severity(e),
            _ => None,
        }
    }

    fn help<'a>(&'a self) -> Option<Box<dyn std::fmt::Display + 'a>> {
        match self {
            CliError::Engine(e) => Diagnostic::help(e),
            CliError::Input { help, .. } => help
                .as_ref()
                .map(|h| -> Box<dyn std::fmt::Display + 'a> { Box::new(h.clone()) }),
            _ => None,
        }
    }

    fn url<'a>(&'a self) -> Option<Box<dyn std::fmt::Display + 'a>> {
        match self {
            CliError::Engine(e) => Diagnostic::url(e),
            _ => None,
        }
    }

    fn source_code(&self) -> Option<&dyn miette::SourceCode> {
        match self {
            CliError::Engine(e) => Diagnostic::source_code(e),
            _ => None,
        }
    }

    fn labels(&self) -> Option<Box<dyn Iterator<Item = miette::LabeledSpan> + '_>> {
        match self {
            CliError::Engine(e) => Diagnostic::labels(e),
            _ => None,
        }
    }

    fn related<'a>(&'a self) -> Option<Box<dyn Iterator<Item = &'a dyn Diagnostic> + 'a>> {
        match self {
            CliError::Engine(e) => Diagnostic::related(e),
            _ => None,
        }
    }

    fn diagnostic_source(&self) -> Option<&dyn Diagnostic> {
        match self {
            CliError::Engine(e) => Diagnostic::diagnostic_source(e),
            _ => None,
        }
    }
}

impl CliError {
    /// Get the exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            CliError::Asset(e) => exit_codes::for_code(e.code()),
            CliError::Engine(e) => exit_codes::for_code(e.code()),
            CliError::Input { .. } => exit_codes::USAGE_ERROR,
            CliError::Config { .. } => exit_codes::CONFIG_ERROR,
            CliError::Io { .. } => exit_codes::IO_ERROR,
            CliError::Output { .. } => exit_codes::ERROR,
        }
    }

    /// Create an input error (user provided invalid input)
    pub fn input(message: impl Into<String>) -> Self {
        Self::Input {
            message: message.into(),
            help: None,
        }
    }

    /// Create an input error with help text
    pub fn input_with_help(message: impl Into<String>, help: impl Into<String>) -> Self {
        Self::Input {
            message: message.into(),
            help: Some(help.into()),
        }
    }

    pub fn output(err: impl std::fmt::Display) -> Self {
        Self::Output {
            message: err.to_string(),
        }
    }
}

impl From<std::io::Error> for CliError {
    fn from(err: std::io::Error) -> Self {
        CliError::Io {
            message: err.to_string(),
        }
    }
}

/// Result type for CLI operations
pub type Result<T> = std::result::Result<T, CliError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes() {
        assert_eq!(
            CliError::from(AssetError::RateLimited { retry_after: 5 }).exit_code(),
            exit_codes::NETWORK_ERROR
        );
        assert_eq!(
            CliError::from(EngineError::TemplateNotFound {
                name: "x".into(),
                suggestion: None
            })
            .exit_code(),
            exit_codes::TEMPLATE_ERROR
        );
        assert_eq!(
            CliError::from(EngineError::Asset(AssetError::Cancelled)).exit_code(),
            exit_codes::CANCELLED
        );
        assert_eq!(CliError::input("bad").exit_code(), exit_codes::USAGE_ERROR);
        assert_eq!(
            CliError::from(std::io::Error::other("disk")).exit_code(),
            exit_codes::IO_ERROR
        );
    }
}
