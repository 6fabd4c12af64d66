//! Deterministic detectors.
//! License: MIT OR APACHE 2.0

use crate::detector::{resolve_overlaps, PiiDetector, Span};
use crate::errors::DetectionError;

/// Reports every occurrence of a fixed set of literals.
#[derive(Debug, Clone, Default)]
pub struct LiteralDetector {
    entries: Vec<(String, String)>,
}

impl LiteralDetector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `literal`, reported as `entity_type`.
    pub fn with(mut self, literal: impl Into<String>, entity_type: impl Into<String>) -> Self {
        let literal = literal.into();
        if !literal.is_empty() {
            self.entries.push((literal, entity_type.into()));
        }
        self
    }
}

impl PiiDetector for LiteralDetector {
    fn name(&self) -> &str {
        "literal"
    }

    fn detect(&self, text: &str, _language: &str) -> Result<Vec<Span>, DetectionError> {
        let spans = self
            .entries
            .iter()
            .flat_map(|(literal, entity_type)| {
                text.match_indices(literal.as_str())
                    .map(move |(start, hit)| Span::new(start, start + hit.len(), entity_type.clone()))
            })
            .collect();
        Ok(resolve_overlaps(spans, text))
    }
}

/// Always fails; stands in for an unreachable NER service.
#[derive(Debug, Clone)]
pub struct FailingDetector {
    message: String,
}

impl FailingDetector {
    pub fn new(message: impl Into<String>) -> Self {
        Self { message: message.into() }
    }
}

impl PiiDetector for FailingDetector {
    fn name(&self) -> &str {
        "failing"
    }

    fn detect(&self, _text: &str, _language: &str) -> Result<Vec<Span>, DetectionError> {
        Err(DetectionError::new(self.name(), self.message.clone()))
    }
}
