//! Markdown processor

use once_cell::sync::Lazy;
use regex::Regex;

use super::{FormatProcessor, ensure_trailing_newline, normalize_newlines};

static HEADING: Lazy<Regex> = Lazy::new(|| Regex::new(r"^#{1,6}(\s|$)").expect("valid regex"));

static LIST_ITEM: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*([-*+]|\d+[.)])\s+\S").expect("valid regex"));

static LINK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(!?)\[([^\]]*)\]\(([^)]*)\)").expect("valid regex"));

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Block {
    Blank,
    Heading,
    Fence,
    List,
    Text,
}

fn is_fence(line: &str) -> bool {
    let trimmed = line.trim_start();
    trimmed.starts_with("```") || trimmed.starts_with("~~~")
}

#[derive(Debug, Clone, Copy, Default)]
pub struct MarkdownProcessor;

impl FormatProcessor for MarkdownProcessor {
    fn format(&self) -> &'static str {
        "markdown"
    }

    /// Single blank lines between blocks, with headings, fences and lists
    /// separated from surrounding text
    fn normalize(&self, output: &str) -> String {
        let text = normalize_newlines(output);
        let mut out: Vec<&str> = Vec::new();
        let mut previous = Block::Blank;
        let mut in_fence = false;

        let push_blank = |out: &mut Vec<&str>| {
            if out.last().is_some_and(|l| !l.trim().is_empty()) {
                out.push("");
            }
        };

        for line in text.lines() {
            if in_fence {
                out.push(line);
                if is_fence(line) {
                    in_fence = false;
                    previous = Block::Fence;
                }
                continue;
            }

            if line.trim().is_empty() {
                push_blank(&mut out);
                previous = Block::Blank;
                continue;
            }

            let block = if is_fence(line) {
                Block::Fence
            } else if HEADING.is_match(line) {
                Block::Heading
            } else if LIST_ITEM.is_match(line)
                || (previous == Block::List && line.starts_with([' ', '\t']))
            {
                Block::List
            } else {
                Block::Text
            };

            let separate = match (previous, block) {
                (Block::Blank, _) => false,
                (Block::Heading | Block::Fence, _) => true,
                (_, Block::Heading | Block::Fence) => true,
                (Block::List, Block::List) => false,
                (Block::List, _) | (_, Block::List) => true,
                _ => false,
            };
            if separate {
                push_blank(&mut out);
            }

            out.push(line);
            if block == Block::Fence {
                in_fence = true;
            }
            previous = block;
        }

        ensure_trailing_newline(&out.join("\n"))
    }

    fn validate(&self, output: &str) -> Vec<String> {
        let mut problems = Vec::new();
        let mut open_fence: Option<usize> = None;

        for (i, line) in output.lines().enumerate() {
            let line_no = i + 1;
            if is_fence(line) {
                open_fence = match open_fence {
                    Some(_) => None,
                    None => Some(line_no),
                };
                continue;
            }
            if open_fence.is_some() {
                continue;
            }

            if HEADING.is_match(line) && line.trim_start_matches('#').trim().is_empty() {
                problems.push(format!("line {}: heading has no text", line_no));
            }

            for caps in LINK.captures_iter(line) {
                let is_image = caps.get(1).is_some_and(|m| !m.as_str().is_empty());
                let text = caps.get(2).map_or("", |m| m.as_str());
                let url = caps.get(3).map_or("", |m| m.as_str());
                if !is_image && text.trim().is_empty() {
                    problems.push(format!("line {}: link has no text", line_no));
                }
                if url.trim().is_empty() {
                    problems.push(format!("line {}: link has no URL", line_no));
                }
            }
        }

        if let Some(line_no) = open_fence {
            problems.push(format!("line {}: code fence is never closed", line_no));
        }
        problems
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use insta::assert_snapshot;

    #[test]
    fn test_normalize_blocks() {
        let raw = "\r\n# Plan\r\nIntro text\n\n\n\nSteps:\n- one\n  continued\n- two\nAfter list\n```sh\n\n\nmake\n```\nDone";
        assert_snapshot!(MarkdownProcessor.normalize(raw), @r"
        # Plan

        Intro text

        Steps:

        - one
          continued
        - two

        After list

        ```sh


        make
        ```

        Done
        ");
    }

    #[test]
    fn test_normalize_is_stable() {
        let once = MarkdownProcessor.normalize("# A\ntext\n## B\n1. x\n2. y\n");
        assert_eq!(MarkdownProcessor.normalize(&once), once);
        assert!(MarkdownProcessor.validate(&once).is_empty());
    }

    #[test]
    fn test_validate() {
        let doc = "#\n\nSee [](https://x.io) and [docs]( ).\n\n![](logo.png)\n\n```\nunclosed [](x)\n";
        assert_snapshot!(MarkdownProcessor.validate(doc).join("\n"), @r"
        line 1: heading has no text
        line 3: link has no text
        line 3: link has no URL
        line 7: code fence is never closed
        ");
    }
}
