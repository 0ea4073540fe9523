//! SHA-256 content checksums in `sha256:<hex>` form

use sha2::{Digest, Sha256};

/// Prefix carried by every checksum string
pub const CHECKSUM_PREFIX: &str = "sha256:";

/// Compute the `sha256:<hex>` checksum of data
pub fn compute_checksum(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    format!("{}{}", CHECKSUM_PREFIX, hex::encode(hasher.finalize()))
}

/// Strip the algorithm prefix and lowercase the hex digest
pub fn normalize_checksum(checksum: &str) -> String {
    let trimmed = checksum.trim().to_lowercase();
    trimmed
        .strip_prefix(CHECKSUM_PREFIX)
        .or_else(|| trimmed.strip_prefix("sha256-"))
        .unwrap_or(&trimmed)
        .to_string()
}

/// Check if two checksums match, accepting prefixed or bare hex
pub fn checksum_matches(expected: &str, actual: &str) -> bool {
    normalize_checksum(expected) == normalize_checksum(actual)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compute_checksum() {
        let checksum = compute_checksum(b"hello");
        assert!(checksum.starts_with("sha256:"));
        assert_eq!(checksum.len(), 7 + 64);
        assert_eq!(
            checksum,
            "sha256:2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
        );
    }

    #[test]
    fn test_checksum_matches() {
        assert!(checksum_matches("sha256:abc123", "sha256:ABC123"));
        assert!(checksum_matches("sha256:abc123", "abc123"));
        assert!(checksum_matches("sha256-abc123", "sha256:abc123"));
        assert!(!checksum_matches("sha256:abc123", "sha256:xyz789"));
    }

    #[test]
    fn test_normalize_checksum() {
        assert_eq!(normalize_checksum(" SHA256:DEAD "), "dead");
        assert_eq!(normalize_checksum("beef"), "beef");
    }
}
