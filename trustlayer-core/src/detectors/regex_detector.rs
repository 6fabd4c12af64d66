//! A `PiiDetector` implementation that uses regular expressions.
//! License: MIT OR APACHE 2.0

use anyhow::{Context, Result};
use std::sync::Arc;

use crate::config::DetectorConfig;
use crate::detector::{resolve_overlaps, PiiDetector, Span};
use crate::errors::DetectionError;
use crate::sanitizers::compiler::{get_or_compile_rules, CompiledRule, CompiledRules};
use crate::validators;

pub const REGEX_DETECTOR_NAME: &str = "regex";

#[derive(Debug)]
pub struct RegexDetector {
    compiled_rules: Arc<CompiledRules>,
    config: DetectorConfig,
}

impl RegexDetector {
    pub fn new(config: DetectorConfig) -> Result<Self> {
        let compiled_rules =
            get_or_compile_rules(&config).context("Failed to compile detector rules for RegexDetector")?;
        Ok(Self {
            compiled_rules,
            config,
        })
    }

    /// Detector over the embedded default rule set.
    pub fn with_default_rules() -> Result<Self> {
        Self::new(DetectorConfig::load_default_rules()?)
    }

    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }

    pub fn compiled_rules(&self) -> &CompiledRules {
        &self.compiled_rules
    }

    fn spans_for_rule(&self, rule: &CompiledRule, text: &str, out: &mut Vec<Span>) {
        let group = rule.capture_group.unwrap_or(0);
        for caps in rule.regex.captures_iter(text) {
            let Some(hit) = caps.get(group) else { continue };
            if hit.start() == hit.end() {
                continue;
            }
            if rule.programmatic_validation && !validators::validate_entity(&rule.entity_type, hit.as_str()) {
                log::debug!(
                    target: "trustlayer_core::detector",
                    "Rule '{}' hit at {}..{} failed programmatic validation.",
                    rule.name,
                    hit.start(),
                    hit.end()
                );
                continue;
            }
            out.push(Span::new(hit.start(), hit.end(), rule.entity_type.clone()));
        }
    }
}

impl PiiDetector for RegexDetector {
    fn name(&self) -> &str {
        REGEX_DETECTOR_NAME
    }

    fn detect(&self, text: &str, language: &str) -> Result<Vec<Span>, DetectionError> {
        let mut spans = Vec::new();
        for rule in self.compiled_rules.rules.iter().filter(|r| r.applies_to(language)) {
            self.spans_for_rule(rule, text, &mut spans);
        }
        Ok(resolve_overlaps(spans, text))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn detect(text: &str) -> Vec<(String, String)> {
        let detector = RegexDetector::with_default_rules().unwrap();
        detector
            .detect(text, "en")
            .unwrap()
            .into_iter()
            .map(|s| (s.entity_type, text[s.start..s.end].to_string()))
            .collect()
    }

    #[test]
    fn test_scenario_sentence() {
        let found = detect("My name is John Doe and my email is john.doe@example.com. Call me at 555-0199.");
        assert_eq!(
            found,
            vec![
                ("PERSON".to_string(), "John Doe".to_string()),
                ("EMAIL_ADDRESS".to_string(), "john.doe@example.com".to_string()),
                ("PHONE_NUMBER".to_string(), "555-0199".to_string()),
            ]
        );
    }

    #[test]
    fn test_card_beats_embedded_phone() {
        let found = detect("card 4111 1111 1111 1111 please");
        assert_eq!(found, vec![("CREDIT_CARD".to_string(), "4111 1111 1111 1111".to_string())]);
    }

    #[test]
    fn test_invalid_ssn_is_not_reported() {
        assert!(detect("ssn 000-12-3456").is_empty());
        assert_eq!(detect("ssn 123-45-6789"), vec![("US_SSN".to_string(), "123-45-6789".to_string())]);
    }

    #[test]
    fn test_language_scoped_rules() {
        let detector = RegexDetector::with_default_rules().unwrap();
        let spans = detector.detect("My name is John Doe", "de").unwrap();
        assert!(spans.is_empty(), "PERSON rules are English-only");
    }

    #[test]
    fn test_plain_text_has_no_spans() {
        assert!(detect("Hi there").is_empty());
    }
}
