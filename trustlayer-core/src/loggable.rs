// trustlayer-core/src/loggable.rs
//! Log helpers that keep raw PII out of debug output.
//!
//! Original values only reach the log when `TRUSTLAYER_ALLOW_DEBUG_PII=true`
//! is set in the environment; otherwise a length marker is printed instead.

use lazy_static::lazy_static;
use log::debug;

lazy_static! {
    /// Read once; PII is hidden from debug logs unless explicitly allowed.
    static ref PII_DEBUG_ALLOWED: bool = {
        std::env::var("TRUSTLAYER_ALLOW_DEBUG_PII")
            .map(|s| s.eq_ignore_ascii_case("true"))
            .unwrap_or(false)
    };
}

pub fn redact_sensitive(s: &str) -> String {
    const MAX_LEN: usize = 8;
    if s.len() <= MAX_LEN {
        "[REDACTED]".to_string()
    } else {
        format!("[REDACTED: {} chars]", s.len())
    }
}

pub fn loggable_content(sensitive_content: &str) -> String {
    if *PII_DEBUG_ALLOWED {
        sensitive_content.to_string()
    } else {
        redact_sensitive(sensitive_content)
    }
}

/// Debug line for one tokenized value. The token is what ties the value to
/// later log lines; the value itself only shows when PII logging is allowed.
pub fn tokenized_message(entity_type: &str, original: &str, token: &str) -> String {
    format!(
        "Tokenized {}: Original='{}', Token='{}'",
        entity_type,
        loggable_content(original),
        token
    )
}

pub fn log_tokenized_debug(entity_type: &str, original: &str, token: &str) {
    debug!(target: "trustlayer_core::tokenizer", "{}", tokenized_message(entity_type, original, token));
}

pub fn log_restored_debug(exchange_id: &str, token_count: usize, bytes_in: usize, bytes_out: usize) {
    debug!(
        target: "trustlayer_core::restore",
        "Exchange '{}': restored with {} token(s), {} -> {} bytes",
        exchange_id,
        token_count,
        bytes_in,
        bytes_out
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_redact_sensitive_short_string() {
        assert_eq!(redact_sensitive("abc"), "[REDACTED]".to_string());
    }

    #[test]
    fn test_redact_sensitive_long_string() {
        assert_eq!(redact_sensitive("john.doe@example.com"), "[REDACTED: 20 chars]".to_string());
    }

    #[test]
    fn test_tokenized_message_hides_value() {
        let msg = tokenized_message("PHONE_NUMBER", "555-0199", "[PHONE_NUMBER_1]");
        assert_eq!(msg, "Tokenized PHONE_NUMBER: Original='[REDACTED]', Token='[PHONE_NUMBER_1]'");

        let msg = tokenized_message("EMAIL_ADDRESS", "john.doe@example.com", "[EMAIL_ADDRESS_1]");
        assert_eq!(
            msg,
            "Tokenized EMAIL_ADDRESS: Original='[REDACTED: 20 chars]', Token='[EMAIL_ADDRESS_1]'"
        );
    }
}
