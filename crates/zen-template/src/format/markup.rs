//! XML and XML-flavoured prompt processors

use once_cell::sync::Lazy;
use regex::Regex;

use super::{FormatProcessor, ensure_trailing_newline, normalize_newlines, strip_trailing_whitespace};

static PROMPT_TAG: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"<(/?)([A-Za-z][A-Za-z0-9_.:-]*)(?:\s[^<>]*?)?(/?)>").expect("valid regex")
});

fn line_of(text: &str, offset: usize) -> usize {
    text[..offset].matches('\n').count() + 1
}

fn is_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | ':' | '.')
}

/// Well-formedness checks for XML documents
#[derive(Debug, Clone, Copy, Default)]
pub struct XmlProcessor;

impl FormatProcessor for XmlProcessor {
    fn format(&self) -> &'static str {
        "xml"
    }

    fn normalize(&self, output: &str) -> String {
        ensure_trailing_newline(&normalize_newlines(output))
    }

    fn validate(&self, output: &str) -> Vec<String> {
        check_well_formed(output)
    }
}

/// Scan `text` and report well-formedness problems
fn check_well_formed(text: &str) -> Vec<String> {
    let mut problems = Vec::new();
    let mut stack: Vec<(&str, usize)> = Vec::new();
    let mut roots = 0;
    let mut pos = 0;

    while pos < text.len() {
        let rest = &text[pos..];
        let lt = rest.find('<');
        let between = &rest[..lt.unwrap_or(rest.len())];
        if stack.is_empty() && !between.trim().is_empty() {
            let offset = pos + between.len() - between.trim_start().len();
            problems.push(format!(
                "line {}: text outside the root element",
                line_of(text, offset)
            ));
        }
        let Some(lt) = lt else {
            break;
        };

        let start = pos + lt;
        let line = line_of(text, start);
        let tag = &text[start..];

        let skip_to = |terminator: &str, what: &str, problems: &mut Vec<String>| {
            match tag.find(terminator) {
                Some(end) => start + end + terminator.len(),
                None => {
                    problems.push(format!("line {}: unterminated {}", line, what));
                    text.len()
                }
            }
        };

        if tag.starts_with("<!--") {
            pos = skip_to("-->", "comment", &mut problems);
        } else if tag.starts_with("<![CDATA[") {
            pos = skip_to("]]>", "CDATA section", &mut problems);
        } else if tag.starts_with("<?") {
            pos = skip_to("?>", "processing instruction", &mut problems);
        } else if tag.starts_with("<!") {
            pos = skip_to(">", "declaration", &mut problems);
        } else {
            let closing = tag.starts_with("</");
            let name_start = if closing { 2 } else { 1 };
            let name_len = tag[name_start..]
                .find(|c: char| !is_name_char(c))
                .unwrap_or(tag.len() - name_start);
            let name = &tag[name_start..name_start + name_len];

            if name.is_empty() {
                problems.push(format!("line {}: unescaped '<'", line));
                pos = start + 1;
                continue;
            }

            let Some(end) = find_tag_end(tag) else {
                problems.push(format!("line {}: unterminated tag <{}>", line, name));
                break;
            };
            let self_closing = !closing && tag[..end].ends_with('/');
            pos = start + end + 1;

            if closing {
                match stack.pop() {
                    Some((open, _)) if open == name => {}
                    Some((open, open_line)) => {
                        problems.push(format!(
                            "line {}: </{}> does not close <{}> from line {}",
                            line, name, open, open_line
                        ));
                    }
                    None => problems.push(format!("line {}: unexpected </{}>", line, name)),
                }
            } else {
                if stack.is_empty() {
                    roots += 1;
                    if roots == 2 {
                        problems.push(format!("line {}: multiple root elements", line));
                    }
                }
                if !self_closing {
                    stack.push((name, line));
                }
            }
        }
    }

    for (name, line) in stack.iter().rev() {
        problems.push(format!("line {}: <{}> is never closed", line, name));
    }
    if roots == 0 {
        problems.push("document has no root element".to_string());
    }
    problems
}

/// Offset of the `>` ending the tag, skipping quoted attribute values
fn find_tag_end(tag: &str) -> Option<usize> {
    let mut quote: Option<char> = None;
    for (i, c) in tag.char_indices().skip(1) {
        match (quote, c) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '"' | '\'') => quote = Some(c),
            (None, '>') => return Some(i),
            (None, '<') => return None,
            _ => {}
        }
    }
    None
}

/// Structured prompts: `<role>`, `<objective>` and friends
///
/// Tag checks are lenient about free text, so `a < b` in prose is fine.
#[derive(Debug, Clone, Copy, Default)]
pub struct PromptProcessor;

impl FormatProcessor for PromptProcessor {
    fn format(&self) -> &'static str {
        "prompt"
    }

    fn normalize(&self, output: &str) -> String {
        ensure_trailing_newline(&strip_trailing_whitespace(&normalize_newlines(output)))
    }

    fn validate(&self, output: &str) -> Vec<String> {
        let mut problems = Vec::new();
        let mut stack: Vec<(&str, usize)> = Vec::new();

        for caps in PROMPT_TAG.captures_iter(output) {
            let (Some(whole), Some(name)) = (caps.get(0), caps.get(2)) else {
                continue;
            };
            let closing = caps.get(1).is_some_and(|m| !m.as_str().is_empty());
            let self_closing = caps.get(3).is_some_and(|m| !m.as_str().is_empty());
            let line = line_of(output, whole.start());

            if closing {
                match stack.iter().rposition(|(open, _)| *open == name.as_str()) {
                    Some(index) => {
                        for (open, open_line) in stack.drain(index..).skip(1) {
                            problems.push(format!(
                                "line {}: <{}> is never closed",
                                open_line, open
                            ));
                        }
                    }
                    None => {
                        problems.push(format!("line {}: unexpected </{}>", line, name.as_str()))
                    }
                }
            } else if !self_closing {
                stack.push((name.as_str(), line));
            }
        }
        for (open, open_line) in stack {
            problems.push(format!("line {}: <{}> is never closed", open_line, open));
        }

        for section in ["role", "objective"] {
            match section_body(output, section) {
                None => problems.push(format!("missing <{}> section", section)),
                Some((_, body)) if body.trim().is_empty() => {
                    problems.push(format!("<{}> is empty", section))
                }
                Some(_) => {}
            }
        }

        if let Some((offset, body)) = section_body(output, "policies") {
            let first_line = line_of(output, offset);
            for (i, line) in body.lines().enumerate() {
                let trimmed = line.trim();
                if !trimmed.is_empty() && !trimmed.starts_with("- ") {
                    problems.push(format!(
                        "line {}: policies must be '- ' bullets",
                        first_line + i
                    ));
                }
            }
        }

        problems
    }
}

/// Byte offset and text between `<name>` and `</name>`
fn section_body<'a>(text: &'a str, name: &str) -> Option<(usize, &'a str)> {
    let open = format!("<{}>", name);
    let close = format!("</{}>", name);
    let start = text.find(&open)? + open.len();
    let end = text[start..].find(&close)? + start;
    Some((start, &text[start..end]))
}
