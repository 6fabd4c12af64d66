//! compiler.rs - Compiles and caches detector rules.
//!
//! Converts a `DetectorConfig` into `CompiledRules` ready for matching. A
//! process-wide cache keyed by the config hash avoids recompiling the same
//! rule set for every detector instance.
//!
//! License: MIT OR APACHE 2.0

use anyhow::Result;
use lazy_static::lazy_static;
use log::{debug, warn};
use regex::{Regex, RegexBuilder};
use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, RwLock};

use crate::config::{DetectorConfig, DetectorRule, MAX_PATTERN_LENGTH};
use crate::errors::TrustLayerError;

/// A single compiled detector rule.
#[derive(Debug)]
pub struct CompiledRule {
    pub regex: Regex,
    pub name: String,
    /// Already normalised into the token alphabet.
    pub entity_type: String,
    pub capture_group: Option<usize>,
    pub programmatic_validation: bool,
    pub languages: Option<Vec<String>>,
}

impl CompiledRule {
    pub fn applies_to(&self, language: &str) -> bool {
        match &self.languages {
            Some(langs) => langs.iter().any(|l| l.eq_ignore_ascii_case(language)),
            None => true,
        }
    }
}

/// All active compiled rules, in configuration order.
#[derive(Debug)]
pub struct CompiledRules {
    pub rules: Vec<CompiledRule>,
}

lazy_static! {
    static ref COMPILED_RULES_CACHE: RwLock<HashMap<u64, Arc<CompiledRules>>> = RwLock::new(HashMap::new());
}

/// Order-sensitive hash; rule order decides which of two equal-start spans wins.
fn hash_config(config: &DetectorConfig) -> u64 {
    let mut hasher = DefaultHasher::new();
    config.rules.hash(&mut hasher);
    hasher.finish()
}

/// Compiles the active rules of `rules_to_compile`.
pub fn compile_rules(rules_to_compile: Vec<DetectorRule>) -> Result<CompiledRules, TrustLayerError> {
    debug!("Starting compilation of {} rules.", rules_to_compile.len());

    let mut compiled_rules = Vec::new();
    let mut compilation_errors = Vec::new();

    for rule in rules_to_compile {
        if !rule.is_active() {
            debug!("Skipping inactive rule '{}'.", rule.name);
            continue;
        }

        let Some(pattern) = rule.pattern.as_ref() else {
            warn!("Skipping rule '{}' because its pattern is missing.", &rule.name);
            continue;
        };

        if pattern.len() > MAX_PATTERN_LENGTH {
            compilation_errors.push(TrustLayerError::PatternLengthExceeded(
                rule.name,
                pattern.len(),
                MAX_PATTERN_LENGTH,
            ));
            continue;
        }

        let regex_result = RegexBuilder::new(pattern)
            .multi_line(rule.multiline)
            .dot_matches_new_line(rule.dot_matches_new_line)
            .case_insensitive(rule.case_insensitive)
            .size_limit(10 * (1 << 20))
            .build();

        match regex_result {
            Ok(regex) => {
                debug!(target: "trustlayer_core::compiler", "Rule '{}' compiled successfully.", &rule.name);
                compiled_rules.push(CompiledRule {
                    regex,
                    entity_type: trustlayer_scan::normalize_entity_type(&rule.entity_type),
                    name: rule.name,
                    capture_group: rule.capture_group,
                    programmatic_validation: rule.programmatic_validation,
                    languages: rule.languages,
                });
            }
            Err(e) => compilation_errors.push(TrustLayerError::RuleCompilation(rule.name, e)),
        }
    }

    if !compilation_errors.is_empty() {
        let error_message = compilation_errors
            .iter()
            .map(|e| e.to_string())
            .collect::<Vec<String>>()
            .join("\n");
        return Err(TrustLayerError::Fatal(format!(
            "Failed to compile {} rule(s):\n{}",
            compilation_errors.len(),
            error_message
        )));
    }

    debug!("Finished compiling rules. Total compiled: {}.", compiled_rules.len());
    Ok(CompiledRules { rules: compiled_rules })
}

/// Returns the cached compilation of `config`, compiling on first use.
pub fn get_or_compile_rules(config: &DetectorConfig) -> Result<Arc<CompiledRules>> {
    let cache_key = hash_config(config);

    {
        let cache = COMPILED_RULES_CACHE.read().unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(rules) = cache.get(&cache_key) {
            debug!("Serving compiled rules from cache for key: {}", cache_key);
            return Ok(Arc::clone(rules));
        }
    }

    let compiled = Arc::new(compile_rules(config.rules.clone())?);
    COMPILED_RULES_CACHE
        .write()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
        .insert(cache_key, Arc::clone(&compiled));

    debug!("Compiled and cached rules for key: {}", cache_key);
    Ok(compiled)
}
