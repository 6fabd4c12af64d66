// trustlayer-core/src/headless.rs
//! `headless.rs`
//! One-shot entry points for non-interactive use.
//!
//! `headless_redact_string` redacts a single text with a rule set.
//! `PromptService` is the prompt front-end operation: redact, audit, ask the
//! provider, put the original values back into its reply.

use anyhow::Result;
use log::info;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::audit::{record_counts, AuditSink};
use crate::config::{DetectorConfig, TrustLayerConfig};
use crate::detector::PiiDetector;
use crate::detectors::regex_detector::RegexDetector;
use crate::errors::TrustLayerError;
use crate::flow_store::{ExchangeId, FlowStore};
use crate::restore::restore;
use crate::tokenizer::{RedactionResult, Tokenizer};
use crate::upstream::LlmProvider;

/// Redacts `content` with the regex detector over `rules`.
///
/// # Arguments
///
/// * `rules` - The merged detector rules (defaults + optional user file).
/// * `language` - ISO 639-1 code used to select language-scoped rules.
/// * `content` - The text to redact.
pub fn headless_redact_string(rules: DetectorConfig, language: &str, content: &str) -> Result<RedactionResult> {
    let detector = RegexDetector::new(rules)?;
    let tokenizer = Tokenizer::new(Arc::new(detector)).with_language(language);
    Ok(tokenizer.redact(content)?)
}

/// Response of the prompt operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptReport {
    pub request_id: String,
    /// In characters.
    pub original_length: usize,
    pub sanitized_length: usize,
    pub redacted_entities: BTreeMap<String, usize>,
    pub llm_response: String,
}

pub struct PromptService {
    tokenizer: Tokenizer,
    provider: Arc<dyn LlmProvider>,
    audit: Arc<dyn AuditSink>,
    store: Arc<FlowStore>,
}

impl PromptService {
    pub fn new(
        detector: Arc<dyn PiiDetector>,
        provider: Arc<dyn LlmProvider>,
        audit: Arc<dyn AuditSink>,
        config: &TrustLayerConfig,
    ) -> Self {
        Self {
            tokenizer: Tokenizer::from_config(detector, config),
            provider,
            audit,
            store: Arc::new(FlowStore::new(config.flow.ttl())),
        }
    }

    pub fn store(&self) -> &Arc<FlowStore> {
        &self.store
    }

    /// Runs one prompt through redaction, the provider, and restoration.
    ///
    /// # Errors
    /// `EmptyInput` for a blank prompt, `Upstream` when the provider fails,
    /// `DetectionFailure` under the fail-closed policy. The mapping is
    /// released on every path.
    pub async fn process(&self, prompt: &str) -> Result<PromptReport, TrustLayerError> {
        if prompt.trim().is_empty() {
            return Err(TrustLayerError::EmptyInput);
        }

        let request_id = ExchangeId::generate();
        let redaction = self.tokenizer.redact(prompt)?;
        record_counts(self.audit.as_ref(), &redaction.entity_counts, &request_id);

        let mut lease = self.store.lease(request_id.clone());
        lease.put(redaction.mapping);

        info!(
            "Request '{}': {} value(s) redacted, forwarding to '{}'.",
            request_id,
            redaction.entity_counts.values().sum::<usize>(),
            self.provider.name()
        );
        // An upstream error drops the lease, which discards the mapping.
        let reply = self.provider.complete(&redaction.redacted_text).await?;

        let mapping = lease.take().unwrap_or_default();
        let llm_response = restore(&reply, &mapping);

        Ok(PromptReport {
            request_id: request_id.to_string(),
            original_length: prompt.chars().count(),
            sanitized_length: redaction.redacted_text.chars().count(),
            redacted_entities: redaction.entity_counts,
            llm_response,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::MemoryAuditSink;
    use crate::detectors::literal::LiteralDetector;
    use crate::errors::UpstreamError;
    use crate::upstream::MockProvider;
    use async_trait::async_trait;

    struct Echo;

    #[async_trait]
    impl LlmProvider for Echo {
        fn name(&self) -> &str {
            "echo"
        }
        async fn complete(&self, prompt: &str) -> Result<String, UpstreamError> {
            Ok(format!("You said: {}", prompt))
        }
    }

    struct Down;

    #[async_trait]
    impl LlmProvider for Down {
        fn name(&self) -> &str {
            "down"
        }
        async fn complete(&self, _prompt: &str) -> Result<String, UpstreamError> {
            Err(UpstreamError::ServerUnavailable { status: 503 })
        }
    }

    fn service(provider: impl LlmProvider + 'static) -> (PromptService, Arc<MemoryAuditSink>) {
        let audit = Arc::new(MemoryAuditSink::new());
        let service = PromptService::new(
            Arc::new(LiteralDetector::new().with("Sachin", "PERSON")),
            Arc::new(provider),
            audit.clone(),
            &TrustLayerConfig::default(),
        );
        (service, audit)
    }

    #[test]
    fn test_headless_redact_string() -> Result<()> {
        let result = headless_redact_string(
            DetectorConfig::load_default_rules()?,
            "en",
            "My email is test@example.com",
        )?;
        assert_eq!(result.redacted_text, "My email is [EMAIL_ADDRESS_1]");
        Ok(())
    }

    #[tokio::test]
    async fn test_prompt_restores_reply() {
        let (service, audit) = service(Echo);
        let report = service.process("I am Sachin").await.unwrap();
        assert_eq!(report.llm_response, "You said: I am Sachin");
        assert_eq!(report.original_length, 11);
        assert_eq!(report.sanitized_length, "I am [PERSON_1]".len());
        assert_eq!(report.redacted_entities["PERSON"], 1);
        assert_eq!(audit.records()[0].exchange_id, report.request_id);
        assert!(service.store().is_empty());
    }

    #[tokio::test]
    async fn test_mock_reply_is_restored() {
        let (service, _) = service(MockProvider);
        let report = service.process("I am Sachin").await.unwrap();
        assert_eq!(
            report.llm_response,
            "Denied/Processed: This is a mocked response. Your safe input was: I am Sachin..."
        );
    }

    #[tokio::test]
    async fn test_upstream_failure_releases_mapping() {
        let (service, _) = service(Down);
        let err = service.process("I am Sachin").await.unwrap_err();
        assert!(matches!(err, TrustLayerError::Upstream(UpstreamError::ServerUnavailable { status: 503 })));
        assert!(service.store().is_empty());
    }

    #[tokio::test]
    async fn test_blank_prompt_is_rejected() {
        let (service, _) = service(Echo);
        assert!(matches!(service.process("  ").await, Err(TrustLayerError::EmptyInput)));
    }

    #[test]
    fn test_report_serializes_camel_case() {
        let report = PromptReport {
            request_id: "r".into(),
            original_length: 1,
            sanitized_length: 1,
            redacted_entities: BTreeMap::new(),
            llm_response: "ok".into(),
        };
        let json = serde_json::to_value(&report).unwrap();
        assert!(json.get("requestId").is_some());
        assert!(json.get("llmResponse").is_some());
    }
}
