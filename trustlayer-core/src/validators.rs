// File: trustlayer-core/src/validators.rs
//! Programmatic checks applied after a regex hit.
//!
//! Rules flagged with `programmatic_validation` only produce a span when the
//! matched text also passes the structural check for its entity type. This
//! trims the false positives that broad digit patterns produce.
//!
//! License: MIT OR APACHE 2.0

use once_cell::sync::Lazy;
use std::collections::HashSet;

/// Dispatches to the check for `entity_type`. Unknown types pass.
pub fn validate_entity(entity_type: &str, value: &str) -> bool {
    match entity_type {
        "US_SSN" => is_valid_ssn(value),
        "UK_NINO" => is_valid_uk_nino(value),
        "CREDIT_CARD" => is_valid_credit_card(value),
        _ => true,
    }
}

/// US SSN in `AAA-GG-SSSS` form, rejecting never-issued ranges.
pub fn is_valid_ssn(ssn: &str) -> bool {
    let mut parts = ssn.split('-');
    let (Some(area), Some(group), Some(serial), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return false;
    };

    if area.len() != 3 || group.len() != 2 || serial.len() != 4 {
        return false;
    }

    let (Ok(area), Ok(group), Ok(serial)) =
        (area.parse::<u16>(), group.parse::<u8>(), serial.parse::<u16>())
    else {
        return false;
    };

    area != 0 && area != 666 && area < 900 && group != 0 && serial != 0
}

static INVALID_NINO_PREFIXES: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    ["BG", "GB", "KN", "NK", "NT", "TN", "ZZ"].into_iter().collect()
});

const INVALID_NINO_FIRST: &[char] = &['D', 'F', 'I', 'Q', 'U', 'V'];
const INVALID_NINO_SECOND: &[char] = &['D', 'F', 'I', 'O', 'Q', 'U', 'V'];

/// UK National Insurance Number, `AA999999A` with optional spaces.
pub fn is_valid_uk_nino(nino: &str) -> bool {
    let compact: String = nino
        .chars()
        .filter(|c| !c.is_whitespace())
        .map(|c| c.to_ascii_uppercase())
        .collect();

    let chars: Vec<char> = compact.chars().collect();
    if chars.len() != 9 {
        return false;
    }

    let (first, second) = (chars[0], chars[1]);
    if !first.is_ascii_alphabetic() || !second.is_ascii_alphabetic() {
        return false;
    }
    if INVALID_NINO_FIRST.contains(&first) || INVALID_NINO_SECOND.contains(&second) {
        return false;
    }
    if INVALID_NINO_PREFIXES.contains(&compact[0..2]) {
        return false;
    }

    chars[2..8].iter().all(|c| c.is_ascii_digit()) && matches!(chars[8], 'A'..='D')
}

/// Mod-10 checksum over a string of ASCII digits.
pub fn is_valid_luhn(digits: &str) -> bool {
    let mut sum = 0u32;
    for (i, c) in digits.chars().rev().enumerate() {
        let Some(mut digit) = c.to_digit(10) else {
            return false;
        };
        if i % 2 == 1 {
            digit *= 2;
            if digit > 9 {
                digit -= 9;
            }
        }
        sum += digit;
    }
    sum % 10 == 0
}

/// Payment card: 13 to 19 digits once separators are removed, Luhn-valid.
pub fn is_valid_credit_card(number: &str) -> bool {
    let digits: String = number.chars().filter(|c| c.is_ascii_digit()).collect();
    (13..=19).contains(&digits.len()) && is_valid_luhn(&digits)
}
