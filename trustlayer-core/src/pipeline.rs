// trustlayer-core/src/pipeline.rs
//! The exchange pipeline: what the interception engine calls for each
//! request and response.
//!
//! Request path: parse body, redact every string leaf in one session, store
//! the mapping under the exchange id, record audit counts, return the
//! sanitized body. Response path: take the mapping out of the store and
//! restore tokens, either over a complete body or chunk by chunk through a
//! [`ResponseRewriter`].
//!
//! License: MIT OR APACHE 2.0

use log::{debug, info};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::audit::{record_counts, AuditSink};
use crate::config::TrustLayerConfig;
use crate::detector::PiiDetector;
use crate::errors::TrustLayerError;
use crate::flow_store::{ExchangeId, FlowStore};
use crate::loggable::log_restored_debug;
use crate::restore::restore_bytes;
use crate::stream::ResponseRewriter;
use crate::tokenizer::{Mapping, RedactionSession, Tokenizer};
use crate::walker::{collect_text, try_walk};

/// Header set on forwarded requests whose body was rewritten.
pub const STATUS_HEADER: &str = "X-TrustLayer-Status";
pub const STATUS_SANITIZED: &str = "Sanitized";

/// How a request body was interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyKind {
    Json,
    PlainText,
    /// Not inspected: binary, or plain text with plain-text redaction off.
    Opaque,
}

/// Result of processing one request body.
#[derive(Debug, Clone)]
pub struct RequestOutcome {
    pub exchange_id: ExchangeId,
    pub kind: BodyKind,
    /// Body to forward. Identical to the input when nothing was redacted.
    pub body: Vec<u8>,
    pub entity_counts: BTreeMap<String, usize>,
    pub token_count: usize,
}

impl RequestOutcome {
    pub fn is_sanitized(&self) -> bool {
        self.token_count > 0
    }

    /// Header to add to the forwarded request, if any.
    pub fn status_header(&self) -> Option<(&'static str, &'static str)> {
        self.is_sanitized().then_some((STATUS_HEADER, STATUS_SANITIZED))
    }
}

struct RedactedBody {
    kind: BodyKind,
    body: Option<Vec<u8>>,
    mapping: Mapping,
    entity_counts: BTreeMap<String, usize>,
}

impl RedactedBody {
    fn from_session(kind: BodyKind, body: Option<Vec<u8>>, session: RedactionSession<'_>) -> Self {
        let (mapping, entity_counts) = session.into_parts();
        Self {
            kind,
            body,
            mapping,
            entity_counts,
        }
    }
}

pub struct ExchangePipeline {
    tokenizer: Tokenizer,
    store: Arc<FlowStore>,
    audit: Arc<dyn AuditSink>,
    config: TrustLayerConfig,
}

impl std::fmt::Debug for ExchangePipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExchangePipeline")
            .field("tokenizer", &self.tokenizer)
            .field("store", &self.store)
            .finish_non_exhaustive()
    }
}

impl ExchangePipeline {
    pub fn new(
        detector: Arc<dyn PiiDetector>,
        store: Arc<FlowStore>,
        audit: Arc<dyn AuditSink>,
        config: TrustLayerConfig,
    ) -> Self {
        Self {
            tokenizer: Tokenizer::from_config(detector, &config),
            store,
            audit,
            config,
        }
    }

    pub fn store(&self) -> &Arc<FlowStore> {
        &self.store
    }

    pub fn tokenizer(&self) -> &Tokenizer {
        &self.tokenizer
    }

    pub fn config(&self) -> &TrustLayerConfig {
        &self.config
    }

    /// Whether a flow to `host` with `method` goes through the pipeline.
    pub fn should_intercept(&self, host: &str, method: &str) -> bool {
        self.config.intercept.matches(host, method)
    }

    /// Redacts a request body and stores its mapping.
    ///
    /// Any entry already stored under `exchange_id` is dropped first, so a
    /// reused id never restores with a mapping from an earlier exchange.
    ///
    /// # Errors
    /// Under the fail-closed detection policy a detector failure rejects the
    /// exchange. Nothing is stored in that case.
    pub fn process_request(&self, exchange_id: &ExchangeId, body: &[u8]) -> Result<RequestOutcome, TrustLayerError> {
        if self.store.discard(exchange_id) {
            debug!(target: "trustlayer_core::pipeline", "Exchange '{}': dropped stale mapping.", exchange_id);
        }

        let RedactedBody {
            kind,
            body: rewritten,
            mapping,
            entity_counts,
        } = self.redact_body(body)?;

        if mapping.is_empty() {
            debug!(target: "trustlayer_core::pipeline", "Exchange '{}': no PII found ({:?}).", exchange_id, kind);
            return Ok(RequestOutcome {
                exchange_id: exchange_id.clone(),
                kind,
                body: body.to_vec(),
                entity_counts,
                token_count: 0,
            });
        }

        let token_count = mapping.len();
        let body = rewritten.unwrap_or_else(|| body.to_vec());

        let mut lease = self.store.lease(exchange_id.clone());
        lease.put(mapping);
        record_counts(self.audit.as_ref(), &entity_counts, exchange_id);
        lease.commit();

        info!("Exchange '{}': redacted {} value(s).", exchange_id, token_count);
        Ok(RequestOutcome {
            exchange_id: exchange_id.clone(),
            kind,
            body,
            entity_counts,
            token_count,
        })
    }

    fn redact_body(&self, body: &[u8]) -> Result<RedactedBody, TrustLayerError> {
        match serde_json::from_slice::<Value>(body) {
            Ok(tree) => {
                // Every key and leaf of the request, so no token collides with
                // a literal in a sibling leaf.
                let exchange_text = {
                    let mut fragments = Vec::new();
                    collect_text(&tree, &mut fragments);
                    fragments.join("\n")
                };
                let mut session = self.tokenizer.session_for(&exchange_text);
                let redacted = self.redact_tree(&mut session, tree)?;
                Ok(RedactedBody::from_session(BodyKind::Json, Some(redacted), session))
            }
            Err(_) => match std::str::from_utf8(body) {
                Ok(text) if self.config.redact_plain_text => {
                    let mut session = self.tokenizer.session_for(text);
                    let redacted = session.redact_text(text)?;
                    Ok(RedactedBody::from_session(BodyKind::PlainText, Some(redacted.into_bytes()), session))
                }
                _ => Ok(RedactedBody::from_session(BodyKind::Opaque, None, self.tokenizer.session())),
            },
        }
    }

    fn redact_tree(&self, session: &mut RedactionSession<'_>, tree: Value) -> Result<Vec<u8>, TrustLayerError> {
        let min_len = self.config.min_leaf_len;
        let redacted = try_walk(tree, &mut |leaf: String| {
            if leaf.chars().count() < min_len {
                Ok(leaf)
            } else {
                session.redact_text(&leaf)
            }
        })?;
        Ok(serde_json::to_vec(&redacted)?)
    }

    /// Starts restoring a streamed response. The store entry for the
    /// exchange is removed here.
    pub fn begin_response(&self, exchange_id: ExchangeId, content_type: Option<&str>) -> ResponseRewriter {
        ResponseRewriter::begin(&self.store, exchange_id, content_type, &self.config.stream)
    }

    /// Restores a complete response body and releases the mapping.
    pub fn process_response_body(&self, exchange_id: &ExchangeId, body: &[u8]) -> Vec<u8> {
        match self.store.take_if_present(exchange_id) {
            Some(mapping) => {
                let restored = restore_bytes(body, &mapping);
                log_restored_debug(exchange_id.as_str(), mapping.len(), body.len(), restored.len());
                restored
            }
            None => body.to_vec(),
        }
    }

    /// Drops the mapping of an exchange that ended without a response.
    pub fn abort(&self, exchange_id: &ExchangeId) -> bool {
        let dropped = self.store.discard(exchange_id);
        if dropped {
            info!("Exchange '{}' aborted; mapping released.", exchange_id);
        }
        dropped
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::MemoryAuditSink;
    use crate::config::DetectionFailurePolicy;
    use crate::detectors::literal::{FailingDetector, LiteralDetector};
    use serde_json::json;

    fn pipeline_with(detector: impl PiiDetector + 'static, config: TrustLayerConfig) -> (ExchangePipeline, Arc<MemoryAuditSink>) {
        let audit = Arc::new(MemoryAuditSink::new());
        let pipeline = ExchangePipeline::new(
            Arc::new(detector),
            Arc::new(FlowStore::default()),
            audit.clone(),
            config,
        );
        (pipeline, audit)
    }

    fn pipeline() -> (ExchangePipeline, Arc<MemoryAuditSink>) {
        pipeline_with(LiteralDetector::new().with("Ann", "PERSON"), TrustLayerConfig::default())
    }

    #[test]
    fn test_json_request_shares_counters_across_leaves() {
        let (pipeline, audit) = pipeline();
        let id = ExchangeId::from("j1");
        let body = serde_json::to_vec(&json!({"messages": [{"content": "Ann"}, {"content": "hi Ann"}], "n": 1})).unwrap();
        let outcome = pipeline.process_request(&id, &body).unwrap();

        assert_eq!(outcome.kind, BodyKind::Json);
        assert_eq!(outcome.token_count, 2);
        assert_eq!(outcome.status_header(), Some((STATUS_HEADER, STATUS_SANITIZED)));
        let forwarded: Value = serde_json::from_slice(&outcome.body).unwrap();
        assert_eq!(forwarded, json!({"messages": [{"content": "[PERSON_1]"}, {"content": "hi [PERSON_2]"}], "n": 1}));
        assert!(pipeline.store().contains(&id));
        assert_eq!(audit.records().len(), 1);
        assert_eq!(audit.records()[0].count, 2);
    }

    #[test]
    fn test_clean_request_is_untouched_and_not_stored() {
        let (pipeline, audit) = pipeline();
        let id = ExchangeId::from("clean");
        let body = br#"{"messages":[{"content":"Hi there"}]}"#;
        let outcome = pipeline.process_request(&id, body).unwrap();
        assert_eq!(outcome.body, body.to_vec());
        assert_eq!(outcome.status_header(), None);
        assert!(pipeline.store().is_empty());
        assert!(audit.records().is_empty());
    }

    #[test]
    fn test_plain_text_request_and_response() {
        let (pipeline, _) = pipeline();
        let id = ExchangeId::from("p1");
        let outcome = pipeline.process_request(&id, b"I am Ann").unwrap();
        assert_eq!(outcome.kind, BodyKind::PlainText);
        assert_eq!(outcome.body, b"I am [PERSON_1]");

        let restored = pipeline.process_response_body(&id, b"Hello [PERSON_1]!");
        assert_eq!(restored, b"Hello Ann!");
        assert!(pipeline.store().take_if_present(&id).is_none());
    }

    #[test]
    fn test_plain_text_redaction_can_be_disabled() {
        let config = TrustLayerConfig {
            redact_plain_text: false,
            ..Default::default()
        };
        let (pipeline, _) = pipeline_with(LiteralDetector::new().with("Ann", "PERSON"), config);
        let outcome = pipeline.process_request(&"p2".into(), b"I am Ann").unwrap();
        assert_eq!(outcome.kind, BodyKind::Opaque);
        assert_eq!(outcome.body, b"I am Ann");
    }

    #[test]
    fn test_min_leaf_len_skips_short_strings() {
        let config = TrustLayerConfig {
            min_leaf_len: 5,
            ..Default::default()
        };
        let (pipeline, _) = pipeline_with(LiteralDetector::new().with("Ann", "PERSON"), config);
        let outcome = pipeline
            .process_request(&"m".into(), br#"{"a":"Ann","b":"I am Ann"}"#)
            .unwrap();
        let forwarded: Value = serde_json::from_slice(&outcome.body).unwrap();
        assert_eq!(forwarded, json!({"a": "Ann", "b": "I am [PERSON_1]"}));
    }

    #[test]
    fn test_fail_closed_rejects_and_stores_nothing() {
        let config = TrustLayerConfig {
            detection_failure: DetectionFailurePolicy::FailClosed,
            ..Default::default()
        };
        let (pipeline, _) = pipeline_with(FailingDetector::new("offline"), config);
        let id = ExchangeId::from("fc");
        assert!(pipeline.process_request(&id, br#"{"q":"Ann"}"#).is_err());
        assert!(pipeline.store().is_empty());
    }

    #[test]
    fn test_token_literal_in_sibling_leaf_is_not_reused() {
        let (pipeline, _) = pipeline();
        let id = ExchangeId::from("sib");
        let body = br#"{"a":"what does [PERSON_1] mean?","b":"I am Ann"}"#;
        let outcome = pipeline.process_request(&id, body).unwrap();

        let forwarded: Value = serde_json::from_slice(&outcome.body).unwrap();
        assert_eq!(forwarded, json!({"a": "what does [PERSON_1] mean?", "b": "I am [PERSON_2]"}));

        let reply = pipeline.process_response_body(&id, b"[PERSON_1] is a placeholder for [PERSON_2].");
        assert_eq!(reply, b"[PERSON_1] is a placeholder for Ann.");
    }

    #[test]
    fn test_token_literal_in_object_key_is_not_reused() {
        let (pipeline, _) = pipeline();
        let outcome = pipeline
            .process_request(&"key".into(), br#"{"[PERSON_1]":"I am Ann"}"#)
            .unwrap();
        let forwarded: Value = serde_json::from_slice(&outcome.body).unwrap();
        assert_eq!(forwarded, json!({"[PERSON_1]": "I am [PERSON_2]"}));
    }

    #[test]
    fn test_failed_request_drops_stale_mapping() {
        let config = TrustLayerConfig {
            detection_failure: DetectionFailurePolicy::FailClosed,
            ..Default::default()
        };
        let (pipeline, _) = pipeline_with(FailingDetector::new("offline"), config);
        let id = ExchangeId::from("reused");
        let mut stale = Mapping::new();
        stale.insert("[PERSON_1]", "Bob");
        pipeline.store().put(id.clone(), stale);

        assert!(pipeline.process_request(&id, br#"{"q":"Ann"}"#).is_err());
        assert!(pipeline.store().take_if_present(&id).is_none());
        assert_eq!(pipeline.process_response_body(&id, b"[PERSON_1]"), b"[PERSON_1]");
    }

    #[test]
    fn test_abort_releases_mapping() {
        let (pipeline, _) = pipeline();
        let id = ExchangeId::from("ab");
        pipeline.process_request(&id, b"Ann").unwrap();
        assert!(pipeline.abort(&id));
        assert!(!pipeline.abort(&id));
        assert!(pipeline.store().is_empty());
    }

    #[test]
    fn test_should_intercept() {
        let (pipeline, _) = pipeline();
        assert!(pipeline.should_intercept("chatgpt.com", "POST"));
        assert!(!pipeline.should_intercept("chatgpt.com", "GET"));
        assert!(!pipeline.should_intercept("example.com", "POST"));
    }
}
