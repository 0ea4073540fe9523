//! Fuzzy matching suggestions for template errors
//!
//! Uses Levenshtein distance against the registered function and filter
//! names, and against the variables passed to a render.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::filters::FILTER_NAMES;
use crate::functions::FUNCTION_NAMES;

/// Maximum Levenshtein distance to consider for suggestions
const MAX_SUGGESTION_DISTANCE: usize = 3;

/// Filters MiniJinja provides out of the box
pub const BUILTIN_FILTERS: &[&str] = &[
    "abs",
    "attr",
    "batch",
    "capitalize",
    "count",
    "default",
    "dictsort",
    "escape",
    "first",
    "float",
    "groupby",
    "indent",
    "int",
    "items",
    "join",
    "last",
    "length",
    "list",
    "lower",
    "map",
    "max",
    "min",
    "reject",
    "replace",
    "reverse",
    "round",
    "safe",
    "select",
    "slice",
    "sort",
    "split",
    "string",
    "sum",
    "title",
    "tojson",
    "trim",
    "unique",
    "upper",
    "urlencode",
];

/// Global functions MiniJinja provides out of the box
pub const BUILTIN_FUNCTIONS: &[&str] = &["range", "dict", "namespace", "debug"];

static EXPRESSION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\{\{-?\s*([A-Za-z_][A-Za-z0-9_]*)").expect("valid regex")
});

static FILTER_USE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\|\s*([A-Za-z_][A-Za-z0-9_]*)").expect("valid regex")
});

static CALL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"([A-Za-z_][A-Za-z0-9_]*)\s*\(").expect("valid regex")
});

/// Find the closest candidates, best first, excluding exact matches
pub fn find_closest_matches<'a>(
    input: &str,
    candidates: impl IntoIterator<Item = &'a str>,
    max_results: usize,
) -> Vec<&'a str> {
    let mut scored: Vec<(usize, &str)> = candidates
        .into_iter()
        .map(|candidate| (strsim::levenshtein(input, candidate), candidate))
        .filter(|(distance, _)| *distance > 0 && *distance <= MAX_SUGGESTION_DISTANCE)
        .collect();

    scored.sort();
    scored.dedup_by(|a, b| a.1 == b.1);
    scored.truncate(max_results);
    scored.into_iter().map(|(_, name)| name).collect()
}

fn quoted(names: &[&str]) -> String {
    names
        .iter()
        .map(|n| format!("`{}`", n))
        .collect::<Vec<_>>()
        .join(" or ")
}

/// Suggest corrections for an undefined variable
pub fn suggest_undefined_variable(variable_name: &str, available: &[String]) -> Option<String> {
    let matches = find_closest_matches(variable_name, available.iter().map(String::as_str), 3);

    if !matches.is_empty() {
        Some(format!("Did you mean {}?", quoted(&matches)))
    } else if available.is_empty() {
        Some(format!(
            "Pass `{}` as a variable or declare it with a default",
            variable_name
        ))
    } else {
        let mut names: Vec<&str> = available.iter().map(String::as_str).collect();
        names.sort_unstable();
        Some(format!("Available variables: {}", names.join(", ")))
    }
}

/// Suggest corrections for an unknown filter
pub fn suggest_unknown_filter(filter_name: &str) -> Option<String> {
    let candidates = FILTER_NAMES.iter().chain(BUILTIN_FILTERS).copied();
    let matches = find_closest_matches(filter_name, candidates, 3);

    if matches.is_empty() {
        Some(format!(
            "Unknown filter `{}`. Zen filters: {}",
            filter_name,
            FILTER_NAMES.join(", ")
        ))
    } else {
        Some(format!("Did you mean {}?", quoted(&matches)))
    }
}

/// Suggest corrections for an unknown function
pub fn suggest_unknown_function(func_name: &str) -> Option<String> {
    let candidates = FUNCTION_NAMES.iter().chain(BUILTIN_FUNCTIONS).copied();
    let matches = find_closest_matches(func_name, candidates, 3);

    if matches.is_empty() {
        Some(format!(
            "Unknown function `{}`. Available functions: {}",
            func_name,
            FUNCTION_NAMES.join(", ")
        ))
    } else {
        Some(format!("Did you mean {}?", quoted(&matches)))
    }
}

/// Root variable of the first expression on `line` that is not in `available`
pub fn extract_variable_name(line: &str, available: &[String]) -> Option<String> {
    EXPRESSION
        .captures_iter(line)
        .filter_map(|c| c.get(1))
        .map(|m| m.as_str())
        .find(|name| !available.iter().any(|a| a == name) && !is_keyword(name))
        .map(str::to_string)
}

/// First filter applied on `line` that is not registered
pub fn extract_filter_name(line: &str) -> Option<String> {
    FILTER_USE
        .captures_iter(line)
        .filter_map(|c| c.get(1))
        .map(|m| m.as_str())
        .find(|name| !FILTER_NAMES.contains(name) && !BUILTIN_FILTERS.contains(name))
        .map(str::to_string)
}

/// First function called on `line` that is not registered
pub fn extract_function_name(line: &str) -> Option<String> {
    CALL.captures_iter(line)
        .filter_map(|c| c.get(1))
        .map(|m| m.as_str())
        .find(|name| {
            !FUNCTION_NAMES.contains(name)
                && !BUILTIN_FUNCTIONS.contains(name)
                && !FILTER_NAMES.contains(name)
                && !BUILTIN_FILTERS.contains(name)
        })
        .map(str::to_string)
}

fn is_keyword(name: &str) -> bool {
    matches!(name, "true" | "false" | "none" | "not" | "loop")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_closest_matches() {
        let matches = find_closest_matches("snakcase", ["snakeCase", "snakecase", "kebabCase"], 3);
        assert_eq!(matches[0], "snakecase");
        assert!(!matches.contains(&"kebabCase"));
    }

    #[test]
    fn test_exact_match_is_not_a_suggestion() {
        assert!(find_closest_matches("upper", ["upper"], 3).is_empty());
    }

    #[test]
    fn test_suggest_undefined_variable() {
        let available = vec!["project".to_string(), "owner".to_string()];
        let help = suggest_undefined_variable("projct", &available).unwrap();
        assert_eq!(help, "Did you mean `project`?");

        let help = suggest_undefined_variable("zzzzzzzz", &available).unwrap();
        assert_eq!(help, "Available variables: owner, project");

        let help = suggest_undefined_variable("x", &[]).unwrap();
        assert!(help.contains("Pass `x`"));
    }

    #[test]
    fn test_suggest_unknown_filter() {
        let help = suggest_unknown_filter("snakeCse").unwrap();
        assert!(help.contains("`snakeCase`"), "{}", help);
    }

    #[test]
    fn test_suggest_unknown_function() {
        let help = suggest_unknown_function("taskId").unwrap();
        assert!(help.contains("`taskID`"), "{}", help);
    }

    #[test]
    fn test_extract_names() {
        let available = vec!["title".to_string()];
        assert_eq!(
            extract_variable_name("{{ title }} by {{ autor.name }}", &available).as_deref(),
            Some("autor")
        );
        assert_eq!(
            extract_filter_name("{{ title | upper | snakcase }}").as_deref(),
            Some("snakcase")
        );
        assert_eq!(
            extract_function_name("{{ upper(title) }} {{ tskID('T') }}").as_deref(),
            Some("tskID")
        );
    }
}
