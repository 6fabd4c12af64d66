// trustlayer-core/src/lib.rs
//! # TrustLayer Core Library
//!
//! `trustlayer-core` sits between a user and a third-party AI text service.
//! It replaces PII in outbound text with reversible `[ENTITY_TYPE_N]` tokens,
//! keeps the token mapping for the lifetime of one request/response exchange,
//! and puts the original values back into the response, whether it arrives
//! whole or as a stream of chunks.
//!
//! ## Modules
//!
//! * `config`: Detector rules (`DetectorRule`, `DetectorConfig`) and pipeline settings (`TrustLayerConfig`).
//! * `sanitizers`: Compilation and caching of detector rules.
//! * `validators`: Programmatic checks (Luhn, SSN ranges, NINO prefixes).
//! * `safeguard`: Exempts machine identifiers such as UUIDs and hex hashes.
//! * `detector` / `detectors`: The `PiiDetector` capability and its implementations.
//! * `tokenizer`: Right-to-left span replacement, `Mapping`, `RedactionSession`.
//! * `restore`: Buffered and chunked token restoration.
//! * `walker`: String-leaf transforms over JSON trees.
//! * `flow_store`: Per-exchange mapping store with leases and TTL reaping.
//! * `stream`: Response delivery policy and the per-exchange `ResponseRewriter`.
//! * `audit`: Entity-count audit records and sinks.
//! * `upstream`: AI provider clients.
//! * `pipeline`: The request/response hooks used by an interception engine.
//! * `headless`: One-shot redaction and the prompt service.
//!
//! ## Usage Example
//!
//! ```rust
//! use std::sync::Arc;
//! use trustlayer_core::{
//!     ExchangeId, ExchangePipeline, FlowStore, NullAuditSink, RegexDetector, TrustLayerConfig,
//! };
//!
//! fn main() -> anyhow::Result<()> {
//!     let pipeline = ExchangePipeline::new(
//!         Arc::new(RegexDetector::with_default_rules()?),
//!         Arc::new(FlowStore::default()),
//!         Arc::new(NullAuditSink),
//!         TrustLayerConfig::default(),
//!     );
//!
//!     let id = ExchangeId::generate();
//!     let request = br#"{"messages":[{"content":"My email is jane@example.com"}]}"#;
//!     let outcome = pipeline.process_request(&id, request)?;
//!     assert!(!String::from_utf8_lossy(&outcome.body).contains("jane@example.com"));
//!
//!     let reply = pipeline.process_response_body(&id, b"Sent to [EMAIL_ADDRESS_1].");
//!     assert_eq!(reply, b"Sent to jane@example.com.");
//!     Ok(())
//! }
//! ```
//!
//! ## Error Handling
//!
//! Library operations return [`TrustLayerError`]; configuration loading uses
//! `anyhow::Error` with context. Detection and audit failures are logged and
//! do not stop an exchange unless the fail-closed detection policy is set.
//!
//! ---
//! License: MIT OR Apache-2.0

pub mod audit;
pub mod config;
pub mod detector;
pub mod detectors;
pub mod errors;
pub mod flow_store;
pub mod headless;
pub mod loggable;
pub mod pipeline;
pub mod restore;
pub mod safeguard;
pub mod sanitizers;
pub mod stream;
pub mod tokenizer;
pub mod upstream;
pub mod validators;
pub mod walker;

/// Rule and pipeline configuration.
pub use config::{
    merge_rules, DetectionFailurePolicy, DetectorConfig, DetectorRule, FlowConfig, InterceptionFilter, RetryPolicy,
    StreamConfig, StreamStrategy, TrustLayerConfig, UpstreamConfig, MAX_PATTERN_LENGTH,
};

pub use errors::{DetectionError, TrustLayerError, UpstreamError};

pub use detector::{PiiDetector, Span};
pub use detectors::regex_detector::RegexDetector;

pub use tokenizer::{Mapping, RedactionResult, RedactionSession, Tokenizer};
pub use restore::{restore, restore_bytes, ChunkRestorer};
pub use walker::{try_walk, walk};

pub use flow_store::{ExchangeId, FlowLease, FlowStore};
pub use stream::{select_delivery_mode, DeliveryMode, ResponseRewriter};

pub use audit::{AuditRecord, AuditSink, JsonlAuditSink, MemoryAuditSink, NullAuditSink};
pub use upstream::{provider_from_config, LlmProvider, MockProvider, OpenAiProvider};

pub use pipeline::{BodyKind, ExchangePipeline, RequestOutcome, STATUS_HEADER, STATUS_SANITIZED};
pub use headless::{headless_redact_string, PromptReport, PromptService};

pub use sanitizers::compiler::{compile_rules, CompiledRule, CompiledRules};
