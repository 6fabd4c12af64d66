// File: trustlayer-core/src/safeguard.rs
//! Pre-check that exempts machine-generated identifiers from PII analysis.
//!
//! JSON payloads sent to AI services carry request ids, object ids and content
//! hashes. A detector may misread them as phone numbers or account numbers,
//! and tokenizing them would corrupt protocol fields. Only whole-string
//! matches are exempted; an identifier embedded in a sentence is still
//! analysed.

use once_cell::sync::Lazy;
use regex::Regex;

/// Strings of this length or shorter are always analysed.
pub const MIN_SKIP_LEN: usize = 20;

static UUID_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^[0-9a-f]{8}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{12}$")
        .expect("UUID pattern is a valid regex")
});

/// MongoDB ObjectIDs and bare content hashes.
static HEX_HASH_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^[0-9a-f]{24,}$").expect("hex hash pattern is a valid regex"));

/// Returns `true` when `text` is a machine identifier that must not be analysed.
pub fn should_skip(text: &str) -> bool {
    if text.len() <= MIN_SKIP_LEN {
        return false;
    }
    UUID_PATTERN.is_match(text) || HEX_HASH_PATTERN.is_match(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uuid_is_skipped() {
        assert!(should_skip("550e8400-e29b-41d4-a716-446655440000"));
        assert!(should_skip("550E8400-E29B-41D4-A716-446655440000"));
    }

    #[test]
    fn test_hex_hash_is_skipped() {
        assert!(should_skip("507f1f77bcf86cd799439011"));
        assert!(should_skip("e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"));
    }

    #[test]
    fn test_short_hex_is_not_skipped() {
        assert!(!should_skip("deadbeef"));
        assert!(!should_skip("0123456789abcdef0123"));
    }

    #[test]
    fn test_embedded_identifier_is_not_skipped() {
        assert!(!should_skip("request 550e8400-e29b-41d4-a716-446655440000 from John"));
        assert!(!should_skip("550e8400-e29b-41d4-a716-446655440000\n"));
    }
}
