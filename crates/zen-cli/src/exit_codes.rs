//! Standard exit codes for CLI operations
//!
//! These exit codes follow Unix conventions and sysexits.h where applicable.

/// Success - operation completed without errors
pub const SUCCESS: i32 = 0;

/// General error - unspecified failure
pub const ERROR: i32 = 1;

/// Validation error - variables or rendered output rejected
pub const VALIDATION_ERROR: i32 = 2;

/// Template error - missing template, compilation or rendering failure
pub const TEMPLATE_ERROR: i32 = 3;

/// Asset error - missing asset, integrity mismatch, repository or cache failure
pub const ASSET_ERROR: i32 = 4;

/// IO error - file not found, permission denied, etc.
pub const IO_ERROR: i32 = 5;

/// Network error - unreachable repository, timeout or rate limit
pub const NETWORK_ERROR: i32 = 6;

/// Authentication error - credentials missing or rejected
pub const AUTH_ERROR: i32 = 7;

/// Usage error - invalid arguments or options (following sysexits.h convention)
pub const USAGE_ERROR: i32 = 64;

/// Configuration error (sysexits.h EX_CONFIG)
pub const CONFIG_ERROR: i32 = 78;

/// Interrupted by Ctrl-C (128 + SIGINT)
pub const CANCELLED: i32 = 130;

/// Exit code for a stable error code from the library crates
pub fn for_code(code: &str) -> i32 {
    match code {
        "validation_failed" | "variable_required" | "variable_invalid" => VALIDATION_ERROR,
        "template_not_found" | "compilation_failed" | "rendering_failed" => TEMPLATE_ERROR,
        "asset_not_found" | "integrity_error" | "repository_error" | "cache_error" => ASSET_ERROR,
        "network_error" | "rate_limited" => NETWORK_ERROR,
        "authentication_failed" => AUTH_ERROR,
        "configuration_error" => CONFIG_ERROR,
        "cancelled" => CANCELLED,
        _ => ERROR,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classes() {
        assert_eq!(for_code("variable_required"), VALIDATION_ERROR);
        assert_eq!(for_code("template_not_found"), TEMPLATE_ERROR);
        assert_eq!(for_code("integrity_error"), ASSET_ERROR);
        assert_eq!(for_code("rate_limited"), NETWORK_ERROR);
        assert_eq!(for_code("authentication_failed"), AUTH_ERROR);
        assert_eq!(for_code("configuration_error"), CONFIG_ERROR);
        assert_eq!(for_code("cancelled"), CANCELLED);
        assert_eq!(for_code("something_else"), ERROR);
    }
}
