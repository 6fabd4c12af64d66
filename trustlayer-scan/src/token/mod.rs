//! Token literal syntax.
//!
//! A token is `[<ENTITY_TYPE>_<sequence>]`. Entity types are restricted to
//! `[A-Z0-9_]`, so `[` only ever opens a token and `]` only ever closes one.
//! That makes the set of tokens prefix-free: no token is a substring of
//! another, and a complete match can never be extended by later bytes.

extern crate alloc;
use alloc::format;
use alloc::string::String;

pub const TOKEN_OPEN: u8 = b'[';
pub const TOKEN_CLOSE: u8 = b']';

/// Entity type used when a detector label normalises to nothing.
pub const FALLBACK_ENTITY_TYPE: &str = "PII";

/// Normalises a detector label into the alphabet allowed inside a token.
///
/// ASCII letters are uppercased, digits and `_` are kept, every other byte
/// becomes `_`.
pub fn normalize_entity_type(label: &str) -> String {
    let normalized: String = label
        .trim()
        .chars()
        .map(|c| match c {
            'a'..='z' => c.to_ascii_uppercase(),
            'A'..='Z' | '0'..='9' | '_' => c,
            _ => '_',
        })
        .collect();

    if normalized.is_empty() {
        String::from(FALLBACK_ENTITY_TYPE)
    } else {
        normalized
    }
}

/// Builds the token literal for the `sequence`-th occurrence of `entity_type`.
///
/// The caller is expected to pass an already normalised entity type.
pub fn format_token(entity_type: &str, sequence: usize) -> String {
    format!("[{}_{}]", entity_type, sequence)
}

/// Splits a token literal back into its entity type and sequence number.
pub fn parse_token(literal: &str) -> Option<(&str, usize)> {
    let inner = literal.strip_prefix('[')?.strip_suffix(']')?;
    let (entity_type, sequence) = inner.rsplit_once('_')?;
    if entity_type.is_empty() || !entity_type.bytes().all(is_entity_type_byte) {
        return None;
    }
    if sequence.is_empty() || !sequence.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let sequence = sequence.parse::<usize>().ok()?;
    if sequence == 0 {
        return None;
    }
    Some((entity_type, sequence))
}

/// Returns `true` if `literal` is a well-formed token.
pub fn is_token_literal(literal: &str) -> bool {
    parse_token(literal).is_some()
}

fn is_entity_type_byte(b: u8) -> bool {
    b.is_ascii_uppercase() || b.is_ascii_digit() || b == b'_'
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_and_parse() {
        let token = format_token("EMAIL_ADDRESS", 3);
        assert_eq!(token, "[EMAIL_ADDRESS_3]");
        assert_eq!(parse_token(&token), Some(("EMAIL_ADDRESS", 3)));
    }

    #[test]
    fn test_normalize_entity_type() {
        assert_eq!(normalize_entity_type("person"), "PERSON");
        assert_eq!(normalize_entity_type("us-ssn"), "US_SSN");
        assert_eq!(normalize_entity_type("[x]"), "_X_");
        assert_eq!(normalize_entity_type("  "), FALLBACK_ENTITY_TYPE);
    }

    #[test]
    fn test_rejects_malformed_literals() {
        assert!(!is_token_literal("PERSON_1"));
        assert!(!is_token_literal("[PERSON]"));
        assert!(!is_token_literal("[PERSON_]"));
        assert!(!is_token_literal("[PERSON_0]"));
        assert!(!is_token_literal("[person_1]"));
        assert!(!is_token_literal("[_1]"));
    }
}
