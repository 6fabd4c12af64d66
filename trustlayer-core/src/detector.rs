// trustlayer-core/src/detector.rs
//! Defines the `PiiDetector` capability and the `Span` it produces.
//!
//! The entity recognition model is an external collaborator. Anything that can
//! turn a text into labelled byte ranges can sit behind this trait: the
//! built-in [`crate::detectors::regex_detector::RegexDetector`], an NER
//! service client, or a test double.
//!
//! License: MIT OR APACHE 2.0

use serde::{Deserialize, Serialize};

use crate::errors::DetectionError;

/// A labelled byte range `[start, end)` over one specific input string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Span {
    pub start: usize,
    pub end: usize,
    pub entity_type: String,
}

impl Span {
    pub fn new(start: usize, end: usize, entity_type: impl Into<String>) -> Self {
        Self {
            start,
            end,
            entity_type: entity_type.into(),
        }
    }

    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.end <= self.start
    }

    pub fn overlaps(&self, other: &Span) -> bool {
        self.start < other.end && other.start < self.end
    }

    /// True when the span is non-empty, in bounds and on char boundaries of `text`.
    pub fn fits(&self, text: &str) -> bool {
        !self.is_empty()
            && self.end <= text.len()
            && text.is_char_boundary(self.start)
            && text.is_char_boundary(self.end)
    }
}

/// A capability that finds PII in text.
///
/// Implementations are called synchronously from the request path and may
/// block. They must return non-overlapping spans; the tokenizer drops any
/// overlap it still sees.
pub trait PiiDetector: Send + Sync {
    /// Short name used in logs and errors.
    fn name(&self) -> &str;

    /// Finds PII spans in `text`. `language` is an ISO 639-1 code such as `"en"`.
    fn detect(&self, text: &str, language: &str) -> Result<Vec<Span>, DetectionError>;
}

/// Drops empty, out-of-range and overlapping spans.
///
/// Spans are taken in ascending start order, longer span first on ties, and
/// kept only if they do not overlap the previously kept span. The result is
/// sorted by start.
pub fn resolve_overlaps(mut spans: Vec<Span>, text: &str) -> Vec<Span> {
    spans.retain(|s| s.fits(text));
    spans.sort_by(|a, b| a.start.cmp(&b.start).then(b.len().cmp(&a.len())));

    let mut kept: Vec<Span> = Vec::with_capacity(spans.len());
    for span in spans {
        match kept.last() {
            Some(last) if last.overlaps(&span) => continue,
            _ => kept.push(span),
        }
    }
    kept
}
