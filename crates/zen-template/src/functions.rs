//! Function registry exposed to templates
//!
//! Covers identifiers, dates, the workflow stage list, workspace paths,
//! arithmetic and engine metadata. String and collection helpers live in
//! [`crate::filters`] and are registered from here as well.

use chrono::{DateTime, Datelike, Duration as ChronoDuration, NaiveDate, Utc, Weekday};
use minijinja::value::Rest;
use minijinja::{Environment, Error, ErrorKind, Value};
use rand::TryRngCore;
use rand::rngs::OsRng;
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use zen_core::SharedClock;

use crate::filters;

/// Every global function name the registry installs
pub const FUNCTION_NAMES: &[&str] = &[
    // IDs
    "taskID",
    "taskIDShort",
    "randomID",
    // Time
    "now",
    "today",
    "tomorrow",
    "formatDate",
    "formatTime",
    "addDays",
    "workingDays",
    // Workflow
    "zenflowStages",
    "stageNumber",
    "stageName",
    "nextStage",
    "prevStage",
    "isStageCompleted",
    // Paths
    "workspacePath",
    "relativePath",
    "joinPath",
    "fileName",
    "fileExt",
    "dirName",
    // Strings
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
    // Collections
    "join",
    "split",
    "contains",
    "hasPrefix",
    "hasSuffix",
    "replace",
    // Conditional
    "default",
    "coalesce",
    "ternary",
    // Math
    "add",
    "sub",
    "mul",
    "div",
    "mod",
    // Metadata
    "zenVersion",
    "zenWorkspace",
    "zenConfig",
];

/// Workflow stages in order, as `(id, display name)`
pub const STAGES: &[(&str, &str)] = &[
    ("01-align", "Align"),
    ("02-discover", "Discover"),
    ("03-prioritize", "Prioritize"),
    ("04-design", "Design"),
    ("05-build", "Build"),
    ("06-ship", "Ship"),
    ("07-learn", "Learn"),
];

const DATE_FORMAT: &str = "%Y-%m-%d";
const TIME_FORMAT: &str = "%H:%M";
const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";
const MAX_RANDOM_ID: usize = 64;

/// Builds the function table for a template environment
#[derive(Debug, Clone)]
pub struct FunctionRegistry {
    workspace_root: PathBuf,
    clock: SharedClock,
    settings: Arc<BTreeMap<String, JsonValue>>,
}

impl FunctionRegistry {
    pub fn new(workspace_root: impl Into<PathBuf>, clock: SharedClock) -> Self {
        Self {
            workspace_root: workspace_root.into(),
            clock,
            settings: Arc::new(BTreeMap::new()),
        }
    }

    /// Values returned by `zenConfig(key)`
    pub fn with_settings(mut self, settings: BTreeMap<String, JsonValue>) -> Self {
        self.settings = Arc::new(settings);
        self
    }

    pub fn workspace_root(&self) -> &Path {
        &self.workspace_root
    }

    /// Install every function (and the string filters) into `env`
    pub fn register(&self, env: &mut Environment<'static>) {
        self.register_ids(env);
        self.register_time(env);
        register_workflow(env);
        self.register_paths(env);
        register_strings(env);
        register_math(env);
        self.register_metadata(env);
    }

    fn register_ids(&self, env: &mut Environment<'static>) {
        let clock = self.clock.clone();
        env.add_function("taskID", move |prefix: Option<String>| {
            task_id(&prefix.unwrap_or_else(|| "TASK".to_string()), clock.now())
        });
        env.add_function("taskIDShort", |prefix: Option<String>| {
            format!(
                "{}-{}",
                prefix.unwrap_or_else(|| "TASK".to_string()),
                random_hex(4).to_uppercase()
            )
        });
        env.add_function("randomID", |length: Option<usize>| {
            random_hex(length.unwrap_or(8).clamp(1, MAX_RANDOM_ID))
        });
    }

    fn register_time(&self, env: &mut Environment<'static>) {
        let clock = self.clock.clone();
        env.add_function("now", move |format: Option<String>| {
            format_datetime(clock.now(), format.as_deref().unwrap_or(TIMESTAMP_FORMAT))
        });

        let clock = self.clock.clone();
        env.add_function("today", move || clock.now().format(DATE_FORMAT).to_string());

        let clock = self.clock.clone();
        env.add_function("tomorrow", move || {
            (clock.now() + ChronoDuration::days(1))
                .format(DATE_FORMAT)
                .to_string()
        });

        env.add_function("formatDate", |date: String, format: Option<String>| {
            format_datetime(parse_date(&date)?, format.as_deref().unwrap_or(DATE_FORMAT))
        });
        env.add_function("formatTime", |date: String, format: Option<String>| {
            format_datetime(parse_date(&date)?, format.as_deref().unwrap_or(TIME_FORMAT))
        });
        env.add_function("addDays", add_days);
        env.add_function("workingDays", working_days);
    }

    fn register_paths(&self, env: &mut Environment<'static>) {
        let root = self.workspace_root.clone();
        env.add_function("workspacePath", move |parts: Rest<String>| {
            display(&parts.iter().fold(root.clone(), |acc, p| acc.join(p)))
        });

        let root = self.workspace_root.clone();
        env.add_function("relativePath", move |path: String, base: Option<String>| {
            let base = base.map(PathBuf::from).unwrap_or_else(|| root.clone());
            relative_path(Path::new(&path), &base)
        });

        env.add_function("joinPath", |parts: Rest<String>| {
            display(&parts.iter().collect::<PathBuf>())
        });
        env.add_function("fileName", |path: String| {
            Path::new(&path)
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default()
        });
        env.add_function("fileExt", |path: String| {
            Path::new(&path)
                .extension()
                .map(|e| format!(".{}", e.to_string_lossy()))
                .unwrap_or_default()
        });
        env.add_function("dirName", |path: String| match Path::new(&path).parent() {
            Some(parent) if !parent.as_os_str().is_empty() => display(parent),
            _ => ".".to_string(),
        });
    }

    fn register_metadata(&self, env: &mut Environment<'static>) {
        env.add_function("zenVersion", || env!("CARGO_PKG_VERSION"));

        let root = self.workspace_root.clone();
        env.add_function("zenWorkspace", move || display(&root));

        let settings = self.settings.clone();
        env.add_function("zenConfig", move |key: String| {
            settings
                .get(&key)
                .map(Value::from_serialize)
                .unwrap_or(Value::from(()))
        });
    }
}

fn register_workflow(env: &mut Environment<'static>) {
    env.add_function("zenflowStages", || {
        STAGES.iter().map(|(id, _)| *id).collect::<Vec<_>>()
    });
    env.add_function("stageNumber", |stage: String| {
        stage_index(&stage).map(|i| i + 1).unwrap_or(0)
    });
    env.add_function("stageName", |stage: String| {
        stage_index(&stage).map(|i| STAGES[i].1).unwrap_or_default()
    });
    env.add_function("nextStage", |stage: String| {
        stage_index(&stage)
            .and_then(|i| STAGES.get(i + 1))
            .map(|(id, _)| *id)
            .unwrap_or_default()
    });
    env.add_function("prevStage", |stage: String| {
        stage_index(&stage)
            .and_then(|i| i.checked_sub(1))
            .map(|i| STAGES[i].0)
            .unwrap_or_default()
    });
    env.add_function("isStageCompleted", |stage: String, current: String| {
        match (stage_index(&stage), stage_index(&current)) {
            (Some(stage), Some(current)) => stage < current,
            _ => false,
        }
    });
}

fn register_strings(env: &mut Environment<'static>) {
    macro_rules! both {
        ($($name:literal => $func:path),* $(,)?) => {
            $(
                env.add_function($name, $func);
                env.add_filter($name, $func);
            )*
        };
    }

    both! {
        "upper" => filters::upper,
        "lower" => filters::lower,
        "trim" => filters::trim,
        "trimLeft" => filters::trim_left,
        "trimRight" => filters::trim_right,
        "camelCase" => filters::camel_case,
        "pascalCase" => filters::pascal_case,
        "snakeCase" => filters::snake_case,
        "kebabCase" => filters::kebab_case,
        "titleCase" => filters::title_case,
        "slugify" => filters::slugify,
        "indent" => filters::indent,
        "dedent" => filters::dedent,
        "wrap" => filters::wrap,
        "truncate" => filters::truncate,
        "pad" => filters::pad,
        "join" => filters::join,
        "split" => filters::split,
        "contains" => filters::contains,
        "hasPrefix" => filters::has_prefix,
        "hasSuffix" => filters::has_suffix,
        "replace" => filters::replace,
    }

    env.add_function("default", filters::default);
    env.add_function("coalesce", filters::coalesce);
    env.add_function("ternary", filters::ternary);
}

fn register_math(env: &mut Environment<'static>) {
    env.add_function("add", add);
    env.add_function("sub", sub);
    env.add_function("mul", mul);
    env.add_function("div", div);
    env.add_function("mod", modulo);
}

// ============ IDs ============

/// `<prefix>-YYMMDD-<4 uppercase hex>`
pub fn task_id(prefix: &str, now: DateTime<Utc>) -> String {
    format!(
        "{}-{}-{}",
        prefix,
        now.format("%y%m%d"),
        random_hex(4).to_uppercase()
    )
}

/// `len` lowercase hex characters from the OS random source
///
/// Falls back to the clock's nanoseconds if the OS source fails.
pub fn random_hex(len: usize) -> String {
    let mut bytes = vec![0u8; len.div_ceil(2)];
    if OsRng.try_fill_bytes(&mut bytes).is_err() {
        tracing::warn!("OS random source unavailable, using timestamp entropy");
        let nanos = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos();
        for (i, byte) in bytes.iter_mut().enumerate() {
            let shift = (i % 16) * 8;
            *byte = ((nanos >> shift) as u8) ^ (i as u8).wrapping_mul(31);
        }
    }

    let mut hex = String::with_capacity(bytes.len() * 2);
    for byte in &bytes {
        let _ = write!(hex, "{:02x}", byte);
    }
    hex.truncate(len);
    hex
}

// ============ Time ============

/// Parse `YYYY-MM-DD` or RFC 3339
pub fn parse_date(value: &str) -> Result<DateTime<Utc>, Error> {
    let value = value.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Ok(dt.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(value, DATE_FORMAT)
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
        .ok_or_else(|| {
            Error::new(
                ErrorKind::InvalidOperation,
                format!("cannot parse date '{}' (expected YYYY-MM-DD or RFC 3339)", value),
            )
        })
}

/// Format with a strftime pattern, rejecting invalid patterns
pub fn format_datetime(dt: DateTime<Utc>, format: &str) -> Result<String, Error> {
    let mut out = String::new();
    write!(out, "{}", dt.format(format)).map_err(|_| {
        Error::new(
            ErrorKind::InvalidOperation,
            format!("invalid date format '{}'", format),
        )
    })?;
    Ok(out)
}

/// Usage: {{ addDays("2024-01-30", 3) }} → 2024-02-02
pub fn add_days(date: String, days: i64) -> Result<String, Error> {
    let start = parse_date(&date)?;
    ChronoDuration::try_days(days)
        .and_then(|d| start.checked_add_signed(d))
        .map(|dt| dt.format(DATE_FORMAT).to_string())
        .ok_or_else(|| Error::new(ErrorKind::InvalidOperation, "date out of range"))
}

/// Monday to Friday days between two dates, both ends included
pub fn working_days(start: String, end: String) -> Result<i64, Error> {
    let start = parse_date(&start)?.date_naive();
    let end = parse_date(&end)?.date_naive();
    if end < start {
        return Ok(0);
    }

    let count = start
        .iter_days()
        .take_while(|d| *d <= end)
        .filter(|d| !matches!(d.weekday(), Weekday::Sat | Weekday::Sun))
        .count();
    Ok(count as i64)
}

// ============ Workflow ============

/// Position of a stage given its id (`03-prioritize`), name or number
pub fn stage_index(stage: &str) -> Option<usize> {
    let needle = stage.trim().to_ascii_lowercase();
    if needle.is_empty() {
        return None;
    }
    if let Ok(number) = needle.parse::<usize>() {
        return (1..=STAGES.len()).contains(&number).then(|| number - 1);
    }
    STAGES
        .iter()
        .position(|(id, name)| *id == needle || name.eq_ignore_ascii_case(&needle))
}

// ============ Paths ============

fn display(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

fn relative_path(path: &Path, base: &Path) -> String {
    match path.strip_prefix(base) {
        Ok(rel) if rel.as_os_str().is_empty() => ".".to_string(),
        Ok(rel) => display(rel),
        Err(_) => display(path),
    }
}

// ============ Math ============

#[derive(Debug, Clone, Copy)]
enum Number {
    Int(i64),
    Float(f64),
}

impl Number {
    fn coerce(value: &Value) -> Number {
        if let Some(s) = value.as_str() {
            let s = s.trim();
            return s
                .parse::<i64>()
                .map(Number::Int)
                .or_else(|_| s.parse::<f64>().map(Number::Float))
                .unwrap_or(Number::Int(0));
        }
        match serde_json::to_value(value) {
            Ok(JsonValue::Number(n)) => n
                .as_i64()
                .map(Number::Int)
                .or_else(|| n.as_f64().map(Number::Float))
                .unwrap_or(Number::Int(0)),
            Ok(JsonValue::Bool(b)) => Number::Int(i64::from(b)),
            _ => Number::Int(0),
        }
    }

    fn as_f64(self) -> f64 {
        match self {
            Number::Int(i) => i as f64,
            Number::Float(f) => f,
        }
    }
}

fn arithmetic(
    a: &Value,
    b: &Value,
    int_op: fn(i64, i64) -> Option<i64>,
    float_op: fn(f64, f64) -> f64,
) -> Value {
    match (Number::coerce(a), Number::coerce(b)) {
        (Number::Int(x), Number::Int(y)) => match int_op(x, y) {
            Some(result) => Value::from(result),
            None => Value::from(float_op(x as f64, y as f64)),
        },
        (x, y) => Value::from(float_op(x.as_f64(), y.as_f64())),
    }
}

pub fn add(a: Value, b: Value) -> Value {
    arithmetic(&a, &b, i64::checked_add, |x, y| x + y)
}

pub fn sub(a: Value, b: Value) -> Value {
    arithmetic(&a, &b, i64::checked_sub, |x, y| x - y)
}

pub fn mul(a: Value, b: Value) -> Value {
    arithmetic(&a, &b, i64::checked_mul, |x, y| x * y)
}

/// Division; exact integer quotients stay integers, zero divisors give 0
pub fn div(a: Value, b: Value) -> Value {
    match (Number::coerce(&a), Number::coerce(&b)) {
        (_, Number::Int(0)) => Value::from(0),
        (_, Number::Float(y)) if y == 0.0 => Value::from(0),
        (Number::Int(x), Number::Int(y)) if x.checked_rem(y) == Some(0) => {
            x.checked_div(y).map(Value::from).unwrap_or(Value::from(0))
        }
        (x, y) => Value::from(x.as_f64() / y.as_f64()),
    }
}

/// Remainder; a zero divisor gives 0
pub fn modulo(a: Value, b: Value) -> Value {
    match (Number::coerce(&a), Number::coerce(&b)) {
        (_, Number::Int(0)) => Value::from(0),
        (_, Number::Float(y)) if y == 0.0 => Value::from(0),
        (Number::Int(x), Number::Int(y)) => x.checked_rem(y).map(Value::from).unwrap_or(Value::from(0)),
        (x, y) => Value::from(x.as_f64() % y.as_f64()),
    }
}
