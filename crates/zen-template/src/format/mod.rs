//! Output post-processing by format
//!
//! Every processor takes the raw rendered string and normalizes it. In strict
//! mode the normalized output must also pass the processor's validation,
//! otherwise rendering fails with [`EngineError::OutputInvalid`].
//!
//! Formats are looked up by the `format` tag of the catalog record. Unknown
//! tags fall back to plain text.

mod markdown;
mod markup;
mod structured;
mod text;

pub use markdown::MarkdownProcessor;
pub use markup::{PromptProcessor, XmlProcessor};
pub use structured::{JsonProcessor, OpenApiProcessor, YamlProcessor};
pub use text::{DockerfileProcessor, TextProcessor};

use std::collections::HashMap;

use crate::error::{EngineError, Result};

/// Post-processor for one output format
pub trait FormatProcessor: Send + Sync {
    /// Canonical format name
    fn format(&self) -> &'static str;

    /// Rewrite the output into its canonical shape
    fn normalize(&self, output: &str) -> String;

    /// Problems found in `output`; empty when valid
    fn validate(&self, output: &str) -> Vec<String>;

    /// Normalize, then validate when `strict`
    fn process(&self, output: &str, strict: bool) -> Result<String> {
        let normalized = self.normalize(output);
        if strict {
            let problems = self.validate(&normalized);
            if !problems.is_empty() {
                return Err(EngineError::OutputInvalid {
                    format: self.format().to_string(),
                    problems,
                });
            }
        }
        Ok(normalized)
    }
}

/// Processors keyed by canonical format name
pub struct FormatRegistry {
    processors: HashMap<&'static str, Box<dyn FormatProcessor>>,
    fallback: TextProcessor,
}

impl Default for FormatRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl FormatRegistry {
    /// Registry with every built-in processor
    pub fn new() -> Self {
        let mut registry = Self {
            processors: HashMap::new(),
            fallback: TextProcessor,
        };
        registry.register(Box::new(MarkdownProcessor));
        registry.register(Box::new(YamlProcessor));
        registry.register(Box::new(JsonProcessor));
        registry.register(Box::new(XmlProcessor));
        registry.register(Box::new(PromptProcessor));
        registry.register(Box::new(DockerfileProcessor));
        registry.register(Box::new(OpenApiProcessor));
        registry.register(Box::new(TextProcessor));
        registry
    }

    /// Add or replace a processor
    pub fn register(&mut self, processor: Box<dyn FormatProcessor>) {
        self.processors.insert(processor.format(), processor);
    }

    /// Processor for `format`, falling back to plain text
    pub fn get(&self, format: &str) -> &dyn FormatProcessor {
        let name = canonical_format(format);
        match self.processors.get(name.as_str()) {
            Some(processor) => processor.as_ref(),
            None => {
                tracing::debug!(format, "no processor for format, using text");
                &self.fallback
            }
        }
    }

    pub fn process(&self, format: &str, output: &str, strict: bool) -> Result<String> {
        self.get(format).process(output, strict)
    }

    /// Registered format names, sorted
    pub fn formats(&self) -> Vec<&'static str> {
        let mut formats: Vec<_> = self.processors.keys().copied().collect();
        formats.sort_unstable();
        formats
    }
}

/// Lowercased format name with common aliases resolved
pub fn canonical_format(format: &str) -> String {
    let format = format.trim().trim_start_matches('.').to_ascii_lowercase();
    match format.as_str() {
        "md" => "markdown".to_string(),
        "yml" => "yaml".to_string(),
        "txt" | "" => "text".to_string(),
        "docker" => "dockerfile".to_string(),
        "swagger" => "openapi".to_string(),
        _ => format,
    }
}

// ============ Shared helpers ============

pub(crate) fn normalize_newlines(output: &str) -> String {
    output.replace("\r\n", "\n")
}

pub(crate) fn strip_trailing_whitespace(output: &str) -> String {
    output
        .lines()
        .map(str::trim_end)
        .collect::<Vec<_>>()
        .join("\n")
}

/// Exactly one trailing newline; empty stays empty
pub(crate) fn ensure_trailing_newline(output: &str) -> String {
    let trimmed = output.trim_end_matches(['\n', '\r']);
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("{}\n", trimmed)
    }
}
