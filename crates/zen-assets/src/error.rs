//! Error types for catalog, cache and backend operations

use serde::Serialize;
use serde_json::{Value as JsonValue, json};
use std::fmt;
use thiserror::Error;

/// One problem found while validating a manifest
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ManifestIssue {
    /// Dotted path of the offending field, e.g. `activities.plan.name`
    pub path: String,
    pub message: String,
}

impl ManifestIssue {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ManifestIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.path, self.message)
    }
}

fn format_issues(issues: &[ManifestIssue]) -> String {
    issues
        .iter()
        .map(|i| format!("  - {}", i))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Asset operation errors
#[derive(Debug, Error)]
pub enum AssetError {
    // ============ Catalog Errors ============
    #[error("Asset not found: {message}")]
    AssetNotFound { name: String, message: String },

    #[error("Invalid manifest ({} problem(s)):\n{}", .issues.len(), format_issues(.issues))]
    InvalidManifest { issues: Vec<ManifestIssue> },

    // ============ Configuration Errors ============
    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },

    #[error("Unsupported auth provider: {provider}")]
    UnsupportedProvider { provider: String },

    #[error("Invalid repository URL: {url} - {reason}")]
    InvalidRepositoryUrl { url: String, reason: String },

    // ============ Network Errors ============
    #[error("Network error: {message}")]
    NetworkError { message: String },

    #[error("Request timeout after {seconds}s")]
    Timeout { seconds: u64 },

    #[error("Rate limited by server. Retry after {retry_after} seconds")]
    RateLimited { retry_after: u64 },

    // ============ Authentication Errors ============
    #[error("Authentication required for {url}")]
    AuthRequired { url: String },

    #[error("Authentication failed: {message}")]
    AuthFailed { message: String },

    /// No credential configured; callers fall back to anonymous access
    #[error("No credentials configured for provider {provider}")]
    NoToken { provider: String },

    // ============ Repository Errors ============
    #[error("File not found in repository: {path}")]
    NotFound { path: String },

    #[error("HTTP error: {status} - {message}")]
    HttpError { status: u16, message: String },

    #[error("Repository error: {message}")]
    RepositoryError { message: String },

    // ============ Cache Errors ============
    #[error("Cache error: {message}")]
    CacheError { message: String },

    #[error("Cache entry corrupted for {key}: expected {expected}, got {actual}")]
    CacheCorrupted {
        key: String,
        expected: String,
        actual: String,
    },

    #[error("Cache key cannot be empty")]
    KeyEmpty,

    #[error("Cache entry {key} is {size} bytes, larger than the cache limit of {limit} bytes")]
    EntryTooLarge { key: String, size: u64, limit: u64 },

    // ============ Integrity Errors ============
    #[error("Integrity check failed for {name}: expected {expected}, got {actual}")]
    IntegrityCheckFailed {
        name: String,
        expected: String,
        actual: String,
    },

    // ============ IO Errors ============
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    // ============ Other ============
    #[error("Operation cancelled")]
    Cancelled,
}

/// Result type for asset operations
pub type Result<T> = std::result::Result<T, AssetError>;

impl AssetError {
    /// Error for an empty asset name
    pub fn empty_name() -> Self {
        AssetError::AssetNotFound {
            name: String::new(),
            message: "name cannot be empty".to_string(),
        }
    }

    /// Error for a name missing from the catalog, with an optional close match
    pub fn asset_not_found(name: &str, suggestion: Option<&str>) -> Self {
        let message = match suggestion {
            Some(s) => format!("{} (did you mean '{}'?)", name, s),
            None => name.to_string(),
        };
        AssetError::AssetNotFound {
            name: name.to_string(),
            message,
        }
    }

    /// Stable error code surfaced to callers
    pub fn code(&self) -> &'static str {
        match self {
            AssetError::AssetNotFound { .. } => "asset_not_found",
            AssetError::InvalidManifest { .. }
            | AssetError::InvalidConfig { .. }
            | AssetError::UnsupportedProvider { .. }
            | AssetError::InvalidRepositoryUrl { .. } => "configuration_error",
            AssetError::NetworkError { .. } | AssetError::Timeout { .. } => "network_error",
            AssetError::RateLimited { .. } => "rate_limited",
            AssetError::AuthRequired { .. }
            | AssetError::AuthFailed { .. }
            | AssetError::NoToken { .. } => "authentication_failed",
            AssetError::NotFound { .. }
            | AssetError::HttpError { .. }
            | AssetError::RepositoryError { .. } => "repository_error",
            AssetError::CacheError { .. }
            | AssetError::KeyEmpty
            | AssetError::EntryTooLarge { .. }
            | AssetError::Io(_)
            | AssetError::Serialization(_) => "cache_error",
            AssetError::CacheCorrupted { .. } | AssetError::IntegrityCheckFailed { .. } => {
                "integrity_error"
            }
            AssetError::Cancelled => "cancelled",
        }
    }

    /// Structured details for machine-readable output
    pub fn details(&self) -> Option<JsonValue> {
        match self {
            AssetError::AssetNotFound { name, .. } => Some(json!({ "name": name })),
            AssetError::InvalidManifest { issues } => Some(json!({ "issues": issues })),
            AssetError::UnsupportedProvider { provider } | AssetError::NoToken { provider } => {
                Some(json!({ "provider": provider }))
            }
            AssetError::InvalidRepositoryUrl { url, reason } => {
                Some(json!({ "url": url, "reason": reason }))
            }
            AssetError::Timeout { seconds } => Some(json!({ "timeout_seconds": seconds })),
            AssetError::RateLimited { retry_after } => {
                Some(json!({ "retry_after_seconds": retry_after }))
            }
            AssetError::AuthRequired { url } => Some(json!({ "url": url })),
            AssetError::NotFound { path } => Some(json!({ "path": path })),
            AssetError::HttpError { status, .. } => Some(json!({ "status": status })),
            AssetError::CacheCorrupted {
                key,
                expected,
                actual,
            } => Some(json!({ "key": key, "expected": expected, "actual": actual })),
            AssetError::EntryTooLarge { key, size, limit } => {
                Some(json!({ "key": key, "size": size, "limit": limit }))
            }
            AssetError::IntegrityCheckFailed {
                name,
                expected,
                actual,
            } => Some(json!({ "name": name, "expected": expected, "actual": actual })),
            _ => None,
        }
    }

    /// Retry hint for rate-limited requests
    pub fn retry_after_seconds(&self) -> Option<u64> {
        match self {
            AssetError::RateLimited { retry_after } => Some(*retry_after),
            _ => None,
        }
    }

    /// True for the "no credential configured" signal, which is never fatal
    pub fn is_no_token(&self) -> bool {
        matches!(self, AssetError::NoToken { .. })
    }

    /// True when the cause was the caller's cancellation scope
    pub fn is_cancelled(&self) -> bool {
        matches!(self, AssetError::Cancelled)
    }
}

impl From<reqwest::Error> for AssetError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            AssetError::NetworkError {
                message: format!("Request timed out: {}", e),
            }
        } else if e.is_connect() {
            AssetError::NetworkError {
                message: format!("Connection failed: {}", e),
            }
        } else if let Some(status) = e.status() {
            AssetError::HttpError {
                status: status.as_u16(),
                message: e.to_string(),
            }
        } else {
            AssetError::NetworkError {
                message: e.to_string(),
            }
        }
    }
}

impl From<serde_yaml::Error> for AssetError {
    fn from(e: serde_yaml::Error) -> Self {
        AssetError::Serialization(e.to_string())
    }
}

impl From<serde_json::Error> for AssetError {
    fn from(e: serde_json::Error) -> Self {
        AssetError::Serialization(e.to_string())
    }
}

impl From<url::ParseError> for AssetError {
    fn from(e: url::ParseError) -> Self {
        AssetError::InvalidRepositoryUrl {
            url: String::new(),
            reason: e.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes() {
        assert_eq!(AssetError::empty_name().code(), "asset_not_found");
        assert_eq!(
            AssetError::RateLimited { retry_after: 5 }.code(),
            "rate_limited"
        );
        assert_eq!(
            AssetError::IntegrityCheckFailed {
                name: "x".into(),
                expected: "a".into(),
                actual: "b".into()
            }
            .code(),
            "integrity_error"
        );
        assert_eq!(AssetError::KeyEmpty.code(), "cache_error");
        assert_eq!(AssetError::Cancelled.code(), "cancelled");
    }

    #[test]
    fn test_empty_name_message() {
        let err = AssetError::empty_name();
        assert!(err.to_string().contains("name cannot be empty"));
    }

    #[test]
    fn test_suggestion_in_message() {
        let err = AssetError::asset_not_found("tecnical-design", Some("technical-design"));
        assert!(err.to_string().contains("did you mean 'technical-design'"));
    }

    #[test]
    fn test_retry_after() {
        let err = AssetError::RateLimited { retry_after: 42 };
        assert_eq!(err.retry_after_seconds(), Some(42));
        assert_eq!(
            err.details().unwrap()["retry_after_seconds"],
            serde_json::json!(42)
        );
        assert_eq!(AssetError::KeyEmpty.retry_after_seconds(), None);
    }

    #[test]
    fn test_manifest_issues_display() {
        let err = AssetError::InvalidManifest {
            issues: vec![
                ManifestIssue::new("schema_version", "is required"),
                ManifestIssue::new("activities.plan.name", "is required"),
            ],
        };
        let text = err.to_string();
        assert!(text.contains("2 problem(s)"));
        assert!(text.contains("activities.plan.name: is required"));
    }
}
