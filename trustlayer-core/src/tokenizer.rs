// trustlayer-core/src/tokenizer.rs
//! The tokenization engine: detector spans in, redacted text and a reversible
//! token mapping out.
//!
//! Spans are replaced right to left so that the byte offsets of spans not yet
//! processed stay valid. Token sequence numbers are handed out in that same
//! right-to-left order: in `"A ... B"` with two names, `B` becomes
//! `[PERSON_1]` and `A` becomes `[PERSON_2]`. The numbering is deterministic
//! for a given input and detector output, which is all restoration needs.
//!
//! License: MIT OR APACHE 2.0

use log::{debug, warn};
use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

use trustlayer_scan::{format_token, normalize_entity_type};

use crate::config::{DetectionFailurePolicy, TrustLayerConfig, DEFAULT_LANGUAGE};
use crate::detector::PiiDetector;
use crate::errors::TrustLayerError;
use crate::loggable::log_tokenized_debug;
use crate::safeguard;

/// Ordered `token -> original value` pairs with unique tokens.
///
/// Serialized as a JSON object whose keys keep insertion order. `Debug`
/// prints tokens only.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Mapping {
    entries: Vec<(String, String)>,
    index: HashMap<String, usize>,
}

impl fmt::Debug for Mapping {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Mapping")
            .field("tokens", &self.tokens().collect::<Vec<_>>())
            .finish()
    }
}

impl Mapping {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a pair. Returns `false` and leaves the mapping untouched if the
    /// token is already present.
    pub fn insert(&mut self, token: impl Into<String>, original: impl Into<String>) -> bool {
        let token = token.into();
        if self.index.contains_key(&token) {
            return false;
        }
        self.index.insert(token.clone(), self.entries.len());
        self.entries.push((token, original.into()));
        true
    }

    pub fn get(&self, token: &str) -> Option<&str> {
        self.index.get(token).map(|&i| self.entries[i].1.as_str())
    }

    pub fn contains_token(&self, token: &str) -> bool {
        self.index.contains_key(token)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(t, o)| (t.as_str(), o.as_str()))
    }

    pub fn tokens(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(t, _)| t.as_str())
    }

    /// Length in bytes of the longest token, 0 when empty.
    pub fn max_token_len(&self) -> usize {
        self.entries.iter().map(|(t, _)| t.len()).max().unwrap_or(0)
    }

    /// Appends the pairs of `other`. Tokens already present are kept as they
    /// are; the number of skipped pairs is returned.
    pub fn extend_from(&mut self, other: Mapping) -> usize {
        let mut skipped = 0;
        for (token, original) in other.entries {
            if !self.insert(token, original) {
                skipped += 1;
            }
        }
        skipped
    }
}

impl Serialize for Mapping {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (token, original) in &self.entries {
            map.serialize_entry(token, original)?;
        }
        map.end()
    }
}

struct MappingVisitor;

impl<'de> Visitor<'de> for MappingVisitor {
    type Value = Mapping;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("a map of token strings to original values")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Mapping, A::Error> {
        let mut mapping = Mapping::new();
        while let Some((token, original)) = access.next_entry::<String, String>()? {
            if !mapping.insert(token.clone(), original) {
                return Err(serde::de::Error::custom(format!("duplicate token '{}'", token)));
            }
        }
        Ok(mapping)
    }
}

impl<'de> Deserialize<'de> for Mapping {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_map(MappingVisitor)
    }
}

/// Output of one redaction.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RedactionResult {
    pub redacted_text: String,
    /// Replacements per entity type; sums to `mapping.len()`.
    pub entity_counts: BTreeMap<String, usize>,
    pub mapping: Mapping,
}

impl RedactionResult {
    /// Total number of replacements.
    pub fn total_redacted(&self) -> usize {
        self.entity_counts.values().sum()
    }
}

/// Replaces detected PII with `[ENTITY_TYPE_N]` tokens.
pub struct Tokenizer {
    detector: Arc<dyn PiiDetector>,
    language: String,
    failure_policy: DetectionFailurePolicy,
}

impl fmt::Debug for Tokenizer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tokenizer")
            .field("detector", &self.detector.name())
            .field("language", &self.language)
            .field("failure_policy", &self.failure_policy)
            .finish()
    }
}

impl Tokenizer {
    pub fn new(detector: Arc<dyn PiiDetector>) -> Self {
        Self {
            detector,
            language: DEFAULT_LANGUAGE.to_string(),
            failure_policy: DetectionFailurePolicy::default(),
        }
    }

    pub fn from_config(detector: Arc<dyn PiiDetector>, config: &TrustLayerConfig) -> Self {
        Self::new(detector)
            .with_language(config.language.clone())
            .with_failure_policy(config.detection_failure)
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = language.into();
        self
    }

    pub fn with_failure_policy(mut self, policy: DetectionFailurePolicy) -> Self {
        self.failure_policy = policy;
        self
    }

    pub fn language(&self) -> &str {
        &self.language
    }

    pub fn failure_policy(&self) -> DetectionFailurePolicy {
        self.failure_policy
    }

    pub fn detector_name(&self) -> &str {
        self.detector.name()
    }

    /// Starts a redaction scope whose counters are shared by every text it
    /// redacts.
    pub fn session(&self) -> RedactionSession<'_> {
        self.session_for("")
    }

    /// Like [`Tokenizer::session`], but new tokens also avoid every literal
    /// that occurs in `exchange_text`: all the text of the exchange, not just
    /// the piece being redacted.
    pub fn session_for<'a>(&'a self, exchange_text: &'a str) -> RedactionSession<'a> {
        RedactionSession {
            tokenizer: self,
            exchange_text,
            counters: HashMap::new(),
            entity_counts: BTreeMap::new(),
            mapping: Mapping::new(),
        }
    }

    /// Redacts a single text in a fresh scope.
    ///
    /// # Errors
    /// Only under [`DetectionFailurePolicy::FailClosed`], when the detector
    /// fails.
    pub fn redact(&self, text: &str) -> Result<RedactionResult, TrustLayerError> {
        let mut session = self.session();
        let redacted_text = session.redact_text(text)?;
        let (mapping, entity_counts) = session.into_parts();
        Ok(RedactionResult {
            redacted_text,
            entity_counts,
            mapping,
        })
    }
}

/// Counters and mapping of one redaction scope, typically one exchange.
pub struct RedactionSession<'a> {
    tokenizer: &'a Tokenizer,
    exchange_text: &'a str,
    counters: HashMap<String, usize>,
    entity_counts: BTreeMap<String, usize>,
    mapping: Mapping,
}

impl fmt::Debug for RedactionSession<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedactionSession")
            .field("tokenizer", self.tokenizer)
            .field("exchange_text_len", &self.exchange_text.len())
            .field("mapping", &self.mapping)
            .field("entity_counts", &self.entity_counts)
            .finish()
    }
}

impl RedactionSession<'_> {
    /// Redacts `text`, recording new tokens in the session mapping.
    pub fn redact_text(&mut self, text: &str) -> Result<String, TrustLayerError> {
        if safeguard::should_skip(text) {
            debug!(target: "trustlayer_core::tokenizer", "Skipping machine identifier ({} bytes).", text.len());
            return Ok(text.to_string());
        }

        let detector = &self.tokenizer.detector;
        let mut spans = match detector.detect(text, &self.tokenizer.language) {
            Ok(spans) => spans,
            Err(err) => match self.tokenizer.failure_policy {
                DetectionFailurePolicy::FailOpen => {
                    warn!("Detector '{}' failed, forwarding text unredacted: {}", detector.name(), err.message);
                    return Ok(text.to_string());
                }
                DetectionFailurePolicy::FailClosed => return Err(err.into()),
            },
        };

        if spans.is_empty() {
            return Ok(text.to_string());
        }

        spans.sort_by(|a, b| b.start.cmp(&a.start).then(b.end.cmp(&a.end)));

        let mut redacted = text.to_string();
        // Start of the most recently replaced span; nothing may reach past it.
        let mut boundary = text.len();
        for span in spans {
            if !span.fits(text) {
                warn!(
                    "Dropping invalid span {}..{} ({}) from detector '{}'.",
                    span.start,
                    span.end,
                    span.entity_type,
                    detector.name()
                );
                continue;
            }
            if span.end > boundary {
                warn!(
                    "Dropping overlapping span {}..{} ({}) from detector '{}'.",
                    span.start,
                    span.end,
                    span.entity_type,
                    detector.name()
                );
                continue;
            }

            let original = &text[span.start..span.end];
            let entity_type = normalize_entity_type(&span.entity_type);
            let token = self.next_token(&entity_type, text);
            log_tokenized_debug(&entity_type, original, &token);

            redacted.replace_range(span.start..span.end, &token);
            self.mapping.insert(token, original);
            *self.entity_counts.entry(entity_type).or_insert(0) += 1;
            boundary = span.start;
        }

        Ok(redacted)
    }

    /// Next free sequence number for `entity_type`. Numbers whose token
    /// literal already appears in `source` or anywhere in the exchange are
    /// skipped, so restoration cannot rewrite text the user typed.
    fn next_token(&mut self, entity_type: &str, source: &str) -> String {
        let counter = self.counters.entry(entity_type.to_string()).or_insert(0);
        loop {
            *counter += 1;
            let token = format_token(entity_type, *counter);
            if !source.contains(&token)
                && !self.exchange_text.contains(&token)
                && !self.mapping.contains_token(&token)
            {
                return token;
            }
        }
    }

    pub fn mapping(&self) -> &Mapping {
        &self.mapping
    }

    pub fn entity_counts(&self) -> &BTreeMap<String, usize> {
        &self.entity_counts
    }

    pub fn into_parts(self) -> (Mapping, BTreeMap<String, usize>) {
        (self.mapping, self.entity_counts)
    }
}
