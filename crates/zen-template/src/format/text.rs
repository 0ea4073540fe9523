//! Plain text and Dockerfile processors

use super::{FormatProcessor, ensure_trailing_newline, normalize_newlines, strip_trailing_whitespace};

/// Default processor for untagged output
#[derive(Debug, Clone, Copy, Default)]
pub struct TextProcessor;

impl FormatProcessor for TextProcessor {
    fn format(&self) -> &'static str {
        "text"
    }

    fn normalize(&self, output: &str) -> String {
        ensure_trailing_newline(&strip_trailing_whitespace(&normalize_newlines(output)))
    }

    fn validate(&self, _output: &str) -> Vec<String> {
        Vec::new()
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DockerfileProcessor;

impl FormatProcessor for DockerfileProcessor {
    fn format(&self) -> &'static str {
        "dockerfile"
    }

    fn normalize(&self, output: &str) -> String {
        TextProcessor.normalize(output)
    }

    fn validate(&self, output: &str) -> Vec<String> {
        let first = output
            .lines()
            .enumerate()
            .map(|(i, line)| (i + 1, line.trim()))
            .find(|(_, line)| !line.is_empty() && !line.starts_with('#'));

        match first {
            None => vec!["Dockerfile has no instructions".to_string()],
            Some((line_no, line)) => {
                let instruction = line.split_whitespace().next().unwrap_or_default();
                if instruction.eq_ignore_ascii_case("FROM") {
                    Vec::new()
                } else {
                    vec![format!(
                        "line {}: first instruction must be FROM, found {}",
                        line_no,
                        instruction.to_ascii_uppercase()
                    )]
                }
            }
        }
    }
}
