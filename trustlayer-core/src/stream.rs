// trustlayer-core/src/stream.rs
//! Response delivery: decides how a response body reaches the client and
//! restores tokens on the way.
//!
//! License: MIT OR APACHE 2.0

use log::{debug, error, warn};
use std::mem;

use crate::config::{StreamConfig, StreamStrategy};
use crate::errors::TrustLayerError;
use crate::flow_store::{ExchangeId, FlowStore};
use crate::loggable::log_restored_debug;
use crate::restore::{restore_bytes, ChunkRestorer};
use crate::tokenizer::Mapping;

const EVENT_STREAM: &str = "text/event-stream";

/// How one response body is delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryMode {
    /// No mapping: chunks are forwarded untouched.
    Passthrough,
    /// The whole body is collected, restored once, then delivered.
    Buffered,
    /// Each chunk goes through the carry-over restorer.
    Incremental,
}

/// Picks the delivery mode for a response.
pub fn select_delivery_mode(has_mapping: bool, content_type: Option<&str>, strategy: StreamStrategy) -> DeliveryMode {
    if !has_mapping {
        return DeliveryMode::Passthrough;
    }
    match strategy {
        StreamStrategy::Buffered => DeliveryMode::Buffered,
        StreamStrategy::Incremental => DeliveryMode::Incremental,
        StreamStrategy::Auto => {
            let is_event_stream = content_type
                .map(|ct| ct.trim().to_ascii_lowercase().starts_with(EVENT_STREAM))
                .unwrap_or(false);
            if is_event_stream {
                DeliveryMode::Incremental
            } else {
                DeliveryMode::Buffered
            }
        }
    }
}

enum State {
    Passthrough,
    Buffered { mapping: Mapping, buffer: Vec<u8> },
    Incremental { restorer: ChunkRestorer, token_count: usize },
    Faulted,
    Finished,
}

/// Per-exchange response rewriter.
///
/// Created with [`ResponseRewriter::begin`], which takes the mapping out of
/// the store, so the store holds nothing for the exchange from then on.
pub struct ResponseRewriter {
    exchange_id: ExchangeId,
    mode: DeliveryMode,
    state: State,
    max_buffer_bytes: usize,
    bytes_in: usize,
    bytes_out: usize,
}

impl std::fmt::Debug for ResponseRewriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResponseRewriter")
            .field("exchange_id", &self.exchange_id)
            .field("mode", &self.mode)
            .field("faulted", &self.is_faulted())
            .field("bytes_in", &self.bytes_in)
            .field("bytes_out", &self.bytes_out)
            .finish()
    }
}

impl ResponseRewriter {
    pub fn begin(store: &FlowStore, exchange_id: ExchangeId, content_type: Option<&str>, config: &StreamConfig) -> Self {
        let mapping = store.take_if_present(&exchange_id).filter(|m| !m.is_empty());
        Self::with_mapping(exchange_id, mapping, content_type, config)
    }

    /// Builds a rewriter around a mapping the caller already holds.
    pub fn with_mapping(
        exchange_id: ExchangeId,
        mapping: Option<Mapping>,
        content_type: Option<&str>,
        config: &StreamConfig,
    ) -> Self {
        let mut mode = select_delivery_mode(mapping.is_some(), content_type, config.strategy);
        let state = match (mode, mapping) {
            (DeliveryMode::Buffered, Some(mapping)) => State::Buffered {
                mapping,
                buffer: Vec::new(),
            },
            (DeliveryMode::Incremental, Some(mapping)) => match ChunkRestorer::new(&mapping) {
                Ok(restorer) => State::Incremental {
                    restorer,
                    token_count: mapping.len(),
                },
                Err(e) => {
                    let err = TrustLayerError::MappingConsistency {
                        exchange_id: exchange_id.to_string(),
                        detail: e.to_string(),
                    };
                    warn!("{}; delivering the response unmodified.", err);
                    mode = DeliveryMode::Passthrough;
                    State::Passthrough
                }
            },
            _ => {
                mode = DeliveryMode::Passthrough;
                State::Passthrough
            }
        };
        debug!(target: "trustlayer_core::stream", "Exchange '{}': response delivery {:?}.", exchange_id, mode);
        Self {
            exchange_id,
            mode,
            state,
            max_buffer_bytes: config.max_buffer_bytes,
            bytes_in: 0,
            bytes_out: 0,
        }
    }

    pub fn exchange_id(&self) -> &ExchangeId {
        &self.exchange_id
    }

    pub fn mode(&self) -> DeliveryMode {
        self.mode
    }

    pub fn is_faulted(&self) -> bool {
        matches!(self.state, State::Faulted)
    }

    /// Accepts the next body chunk and returns the bytes to send now.
    ///
    /// # Errors
    /// `BufferLimitExceeded` when a buffered body grows past the limit. The
    /// rewriter is faulted from then on and every later call fails with
    /// `StreamFaulted`.
    pub fn feed(&mut self, chunk: &[u8]) -> Result<Vec<u8>, TrustLayerError> {
        self.bytes_in += chunk.len();
        let out = match &mut self.state {
            State::Passthrough => chunk.to_vec(),
            State::Incremental { restorer, .. } => restorer.feed(chunk),
            State::Buffered { buffer, .. } => {
                if buffer.len() + chunk.len() > self.max_buffer_bytes {
                    self.state = State::Faulted;
                    let err = TrustLayerError::BufferLimitExceeded {
                        exchange_id: self.exchange_id.to_string(),
                        limit: self.max_buffer_bytes,
                    };
                    error!("{}", err);
                    return Err(err);
                }
                buffer.extend_from_slice(chunk);
                Vec::new()
            }
            State::Faulted => return Err(TrustLayerError::StreamFaulted(self.exchange_id.to_string())),
            State::Finished => {
                return Err(TrustLayerError::Fatal(format!(
                    "Response for exchange '{}' was already finished",
                    self.exchange_id
                )))
            }
        };
        self.bytes_out += out.len();
        Ok(out)
    }

    /// Ends the body and returns the remaining bytes. A faulted rewriter
    /// returns nothing.
    pub fn finish(&mut self) -> Result<Vec<u8>, TrustLayerError> {
        let out = match mem::replace(&mut self.state, State::Finished) {
            State::Passthrough | State::Finished => Vec::new(),
            State::Faulted => {
                self.state = State::Faulted;
                return Ok(Vec::new());
            }
            State::Buffered { mapping, buffer } => {
                let restored = restore_bytes(&buffer, &mapping);
                self.log_restored(mapping.len(), restored.len());
                restored
            }
            State::Incremental { mut restorer, token_count } => {
                let rest = restorer.flush();
                self.log_restored(token_count, rest.len());
                rest
            }
        };
        self.bytes_out += out.len();
        Ok(out)
    }

    fn log_restored(&self, token_count: usize, tail_len: usize) {
        log_restored_debug(
            self.exchange_id.as_str(),
            token_count,
            self.bytes_in,
            self.bytes_out + tail_len,
        );
    }
}
