//! errors.rs - Custom error types for the trustlayer-core library.
//!
//! This module defines the error taxonomy of the exchange pipeline. Detection
//! and audit failures are recoverable and normally only logged; upstream
//! failures are surfaced to the caller as a distinct variant so they can be
//! told apart from internal faults.
//!
//! License: MIT OR APACHE 2.0

use thiserror::Error;

/// All error types in the `trustlayer-core` library.
///
/// `#[non_exhaustive]` lets new variants land without breaking downstream
/// `match` statements.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum TrustLayerError {
    #[error("PII detection failed: {0}")]
    DetectionFailure(#[from] DetectionError),

    #[error("Failed to write audit record for exchange '{exchange_id}': {reason}")]
    AuditWriteFailure { exchange_id: String, reason: String },

    #[error("Upstream provider failed: {0}")]
    Upstream(#[from] UpstreamError),

    #[error("Mapping inconsistency for exchange '{exchange_id}': {detail}")]
    MappingConsistency { exchange_id: String, detail: String },

    #[error("Buffered response for exchange '{exchange_id}' exceeded {limit} bytes")]
    BufferLimitExceeded { exchange_id: String, limit: usize },

    #[error("Response stream for exchange '{0}' already faulted")]
    StreamFaulted(String),

    #[error("No prompt or file content provided")]
    EmptyInput,

    #[error("Failed to (de)serialize payload: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Failed to compile detector rule '{0}': {1}")]
    RuleCompilation(String, regex::Error),

    #[error("Rule '{0}': pattern length ({1}) exceeds maximum allowed ({2})")]
    PatternLengthExceeded(String, usize, usize),

    #[error("An unexpected I/O error occurred: {0}")]
    Io(#[from] std::io::Error),

    #[error("A fatal error occurred: {0}")]
    Fatal(String),
}

/// Raised by a [`crate::detector::PiiDetector`] that could not analyse a text.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{detector}: {message}")]
pub struct DetectionError {
    pub detector: String,
    pub message: String,
}

impl DetectionError {
    pub fn new(detector: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            detector: detector.into(),
            message: message.into(),
        }
    }
}

/// Failures talking to the AI provider.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum UpstreamError {
    /// Connection refused/reset, DNS failure, timeout.
    #[error("network error: {0}")]
    Network(String),

    /// 502, 503 or 504 from the provider or a gateway in front of it.
    #[error("provider unavailable (HTTP {status})")]
    ServerUnavailable { status: u16 },

    #[error("authentication rejected (HTTP {status})")]
    Authentication { status: u16 },

    #[error("request rejected (HTTP {status}): {body}")]
    Rejected { status: u16, body: String },

    #[error("unexpected HTTP status {status}")]
    Status { status: u16 },

    #[error("could not decode provider response: {0}")]
    Decode(String),
}

impl UpstreamError {
    /// Classifies a non-success HTTP status.
    pub fn from_status(status: u16, body: impl Into<String>) -> Self {
        match status {
            401 | 403 => UpstreamError::Authentication { status },
            502..=504 => UpstreamError::ServerUnavailable { status },
            400..=499 => UpstreamError::Rejected {
                status,
                body: body.into(),
            },
            _ => UpstreamError::Status { status },
        }
    }

    /// Only network-class failures are worth another attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            UpstreamError::Network(_) | UpstreamError::ServerUnavailable { .. }
        )
    }
}
