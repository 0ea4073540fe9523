//! String, collection and conditional helpers
//!
//! Each helper is registered as a global function (`snakeCase(name)`) and
//! the string ones also as filters (`name | snakeCase`).

use minijinja::value::{Rest, ValueKind};
use minijinja::{Error, ErrorKind, Value};

/// Helpers that are also registered as filters
pub const FILTER_NAMES: &[&str] = &[
    "upper",
    "lower",
    "trim",
    "trimLeft",
    "trimRight",
    "camelCase",
    "pascalCase",
    "snakeCase",
    "kebabCase",
    "titleCase",
    "slugify",
    "indent",
    "dedent",
    "wrap",
    "truncate",
    "pad",
    "join",
    "split",
    "contains",
    "hasPrefix",
    "hasSuffix",
    "replace",
];

// ============ Case ============

/// Split an identifier or phrase into words
///
/// Breaks on non-alphanumeric characters, lower-to-upper transitions and
/// the end of an acronym (`HTTPServer` is `HTTP`, `Server`).
fn words(value: &str) -> Vec<String> {
    let mut words = Vec::new();
    let mut current = String::new();
    let chars: Vec<char> = value.chars().collect();

    for (i, &c) in chars.iter().enumerate() {
        if !c.is_alphanumeric() {
            if !current.is_empty() {
                words.push(std::mem::take(&mut current));
            }
            continue;
        }

        if c.is_uppercase() && !current.is_empty() {
            let prev = chars[i - 1];
            let next_is_lower = chars.get(i + 1).is_some_and(|n| n.is_lowercase());
            if prev.is_lowercase() || prev.is_ascii_digit() || (prev.is_uppercase() && next_is_lower)
            {
                words.push(std::mem::take(&mut current));
            }
        }
        current.push(c);
    }

    if !current.is_empty() {
        words.push(current);
    }
    words
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
        None => String::new(),
    }
}

/// Usage: {{ "user_name" | camelCase }} → userName
pub fn camel_case(value: String) -> String {
    words(&value)
        .iter()
        .enumerate()
        .map(|(i, w)| if i == 0 { w.to_lowercase() } else { capitalize(w) })
        .collect()
}

/// Usage: {{ "user_name" | pascalCase }} → UserName
pub fn pascal_case(value: String) -> String {
    words(&value).iter().map(|w| capitalize(w)).collect()
}

/// Usage: {{ "UserName" | snakeCase }} → user_name
pub fn snake_case(value: String) -> String {
    words(&value)
        .iter()
        .map(|w| w.to_lowercase())
        .collect::<Vec<_>>()
        .join("_")
}

/// Usage: {{ "UserName" | kebabCase }} → user-name
pub fn kebab_case(value: String) -> String {
    words(&value)
        .iter()
        .map(|w| w.to_lowercase())
        .collect::<Vec<_>>()
        .join("-")
}

/// Usage: {{ "api-design review" | titleCase }} → Api Design Review
pub fn title_case(value: String) -> String {
    words(&value)
        .iter()
        .map(|w| capitalize(w))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Lowercase, with every run of other characters collapsed to `-`
///
/// Usage: {{ "Q3 Roadmap: Draft!" | slugify }} → q3-roadmap-draft
pub fn slugify(value: String) -> String {
    let mut slug = String::with_capacity(value.len());
    for c in value.chars() {
        if c.is_alphanumeric() {
            slug.extend(c.to_lowercase());
        } else if !slug.is_empty() && !slug.ends_with('-') {
            slug.push('-');
        }
    }
    while slug.ends_with('-') {
        slug.pop();
    }
    slug
}

// ============ Whitespace ============

pub fn upper(value: String) -> String {
    value.to_uppercase()
}

pub fn lower(value: String) -> String {
    value.to_lowercase()
}

pub fn trim(value: String) -> String {
    value.trim().to_string()
}

pub fn trim_left(value: String) -> String {
    value.trim_start().to_string()
}

pub fn trim_right(value: String) -> String {
    value.trim_end().to_string()
}

/// Indent every non-empty line
///
/// Usage: {{ body | indent(4) }}
pub fn indent(value: String, spaces: usize) -> String {
    let pad = " ".repeat(spaces);
    value
        .split('\n')
        .map(|line| {
            if line.trim().is_empty() {
                line.to_string()
            } else {
                format!("{}{}", pad, line)
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Remove the indentation shared by all non-blank lines
pub fn dedent(value: String) -> String {
    let common = value
        .lines()
        .filter(|l| !l.trim().is_empty())
        .map(|l| l.len() - l.trim_start().len())
        .min()
        .unwrap_or(0);

    value
        .split('\n')
        .map(|line| {
            if line.trim().is_empty() {
                ""
            } else {
                line.get(common..).unwrap_or_else(|| line.trim_start())
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Greedy word wrap at `width` columns; existing line breaks are kept
///
/// Usage: {{ summary | wrap(72) }}
pub fn wrap(value: String, width: usize) -> String {
    let width = width.max(1);
    value
        .split('\n')
        .map(|line| {
            let mut out = String::new();
            let mut column = 0;
            for word in line.split_whitespace() {
                let len = word.chars().count();
                if column > 0 && column + 1 + len > width {
                    out.push('\n');
                    column = 0;
                } else if column > 0 {
                    out.push(' ');
                    column += 1;
                }
                out.push_str(word);
                column += len;
            }
            out
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Shorten to at most `length` characters, ending with `...` when cut
///
/// Usage: {{ description | truncate(40) }}
pub fn truncate(value: String, length: usize) -> String {
    if value.chars().count() <= length {
        return value;
    }
    if length <= 3 {
        return value.chars().take(length).collect();
    }
    let mut out: String = value.chars().take(length - 3).collect();
    out.push_str("...");
    out
}

/// Right-pad with spaces (or `fill`) to `width` characters
///
/// Usage: {{ name | pad(12) }}
pub fn pad(value: String, width: usize, fill: Option<String>) -> String {
    let fill = fill.and_then(|f| f.chars().next()).unwrap_or(' ');
    let len = value.chars().count();
    let mut out = value;
    out.extend(std::iter::repeat_n(fill, width.saturating_sub(len)));
    out
}

// ============ Collections ============

/// Usage: {{ join(tags, ", ") }}
pub fn join(items: Value, separator: Option<String>) -> Result<String, Error> {
    let separator = separator.unwrap_or_else(|| ", ".to_string());
    if let Some(s) = items.as_str() {
        return Ok(s.to_string());
    }
    let parts: Vec<String> = items
        .try_iter()?
        .map(|v| v.as_str().map(str::to_string).unwrap_or_else(|| v.to_string()))
        .collect();
    Ok(parts.join(&separator))
}

/// Usage: {{ split("a,b", ",") }}
pub fn split(value: String, separator: String) -> Vec<String> {
    if separator.is_empty() {
        return value.chars().map(String::from).collect();
    }
    value.split(separator.as_str()).map(str::to_string).collect()
}

/// Substring test for strings, membership for lists, key lookup for maps
pub fn contains(haystack: Value, needle: Value) -> Result<bool, Error> {
    match haystack.kind() {
        ValueKind::String => {
            let text = haystack.as_str().unwrap_or_default();
            Ok(text.contains(&needle_text(&needle)))
        }
        ValueKind::Seq | ValueKind::Iterable => Ok(haystack.try_iter()?.any(|v| v == needle)),
        ValueKind::Map => Ok(haystack
            .get_item(&needle)
            .map(|v| !v.is_undefined())
            .unwrap_or(false)),
        ValueKind::Undefined | ValueKind::None => Ok(false),
        other => Err(Error::new(
            ErrorKind::InvalidOperation,
            format!("contains() does not support {}", other),
        )),
    }
}

fn needle_text(needle: &Value) -> String {
    needle
        .as_str()
        .map(str::to_string)
        .unwrap_or_else(|| needle.to_string())
}

pub fn has_prefix(value: String, prefix: String) -> bool {
    value.starts_with(&prefix)
}

pub fn has_suffix(value: String, suffix: String) -> bool {
    value.ends_with(&suffix)
}

/// Usage: {{ replace(title, " ", "-") }}
pub fn replace(value: String, from: String, to: String) -> String {
    if from.is_empty() {
        return value;
    }
    value.replace(&from, &to)
}

// ============ Conditional ============

fn is_empty(value: &Value) -> bool {
    match value.kind() {
        ValueKind::Undefined | ValueKind::None => true,
        ValueKind::String => value.as_str().is_some_and(|s| s.trim().is_empty()),
        ValueKind::Seq | ValueKind::Map => value.len() == Some(0),
        _ => false,
    }
}

/// `fallback` when `value` is missing, none or blank
///
/// Usage: {{ default(owner, "unassigned") }}
pub fn default(value: Value, fallback: Value) -> Value {
    if is_empty(&value) { fallback } else { value }
}

/// First non-empty argument
///
/// Usage: {{ coalesce(a, b, "fallback") }}
pub fn coalesce(args: Rest<Value>) -> Value {
    args.iter()
        .find(|v| !is_empty(v))
        .cloned()
        .unwrap_or(Value::UNDEFINED)
}

/// Usage: {{ ternary("yes", "no", condition) }}
pub fn ternary(true_val: Value, false_val: Value, condition: Value) -> Value {
    if condition.is_true() {
        true_val
    } else {
        false_val
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_words() {
        assert_eq!(words("HTTPServer"), vec!["HTTP", "Server"]);
        assert_eq!(words("user_name-id"), vec!["user", "name", "id"]);
        assert_eq!(words("userID2Name"), vec!["user", "ID2", "Name"]);
    }

    #[test]
    fn test_case_conversions() {
        assert_eq!(camel_case("user_name".into()), "userName");
        assert_eq!(camel_case("User Name".into()), "userName");
        assert_eq!(pascal_case("user-name".into()), "UserName");
        assert_eq!(snake_case("UserName".into()), "user_name");
        assert_eq!(snake_case("HTTPServer".into()), "http_server");
        assert_eq!(kebab_case("userName".into()), "user-name");
        assert_eq!(title_case("api-design review".into()), "Api Design Review");
    }

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("Q3 Roadmap: Draft!".into()), "q3-roadmap-draft");
        assert_eq!(slugify("--Hello--World--".into()), "hello-world");
        assert_eq!(slugify("".into()), "");
    }

    #[test]
    fn test_indent_and_dedent() {
        assert_eq!(indent("a\n\nb".into(), 2), "  a\n\n  b");
        assert_eq!(dedent("    a\n      b\n\n    c".into()), "a\n  b\n\nc");
        assert_eq!(dedent(indent("x\ny".into(), 3)), "x\ny");
    }

    #[test]
    fn test_wrap() {
        assert_eq!(wrap("one two three four".into(), 9), "one two\nthree\nfour");
        assert_eq!(wrap("keep\nbreaks".into(), 80), "keep\nbreaks");
    }

    #[test]
    fn test_truncate_and_pad() {
        assert_eq!(truncate("hello world".into(), 8), "hello...");
        assert_eq!(truncate("short".into(), 8), "short");
        assert_eq!(truncate("hello".into(), 2), "he");
        assert_eq!(pad("ab".into(), 5, None), "ab   ");
        assert_eq!(pad("ab".into(), 4, Some(".".into())), "ab..");
        assert_eq!(pad("abcdef".into(), 3, None), "abcdef");
    }

    #[test]
    fn test_collections() {
        let tags = Value::from(vec!["a", "b"]);
        assert_eq!(join(tags.clone(), None).unwrap(), "a, b");
        assert_eq!(join(tags.clone(), Some("|".into())).unwrap(), "a|b");
        assert_eq!(split("a,b,,c".into(), ",".into()), vec!["a", "b", "", "c"]);

        assert!(contains(Value::from("roadmap"), Value::from("map")).unwrap());
        assert!(contains(tags.clone(), Value::from("b")).unwrap());
        assert!(!contains(tags, Value::from("z")).unwrap());
        let map = Value::from_serialize(serde_json::json!({"k": 1}));
        assert!(contains(map, Value::from("k")).unwrap());

        assert!(has_prefix("v1.2".into(), "v".into()));
        assert!(has_suffix("a.md".into(), ".md".into()));
        assert_eq!(replace("a b c".into(), " ".into(), "-".into()), "a-b-c");
    }

    #[test]
    fn test_conditionals() {
        assert_eq!(default(Value::UNDEFINED, Value::from("x")).as_str(), Some("x"));
        assert_eq!(default(Value::from("  "), Value::from("x")).as_str(), Some("x"));
        assert_eq!(default(Value::from("v"), Value::from("x")).as_str(), Some("v"));
        assert_eq!(default(Value::from(0), Value::from(9)), Value::from(0));

        let first = coalesce(Rest(vec![Value::from(()), Value::from(""), Value::from("z")]));
        assert_eq!(first.as_str(), Some("z"));
        assert!(coalesce(Rest(vec![])).is_undefined());

        assert_eq!(
            ternary(Value::from("yes"), Value::from("no"), Value::from(true)).as_str(),
            Some("yes")
        );
        assert_eq!(
            ternary(Value::from("yes"), Value::from("no"), Value::from(false)).as_str(),
            Some("no")
        );
    }
}
