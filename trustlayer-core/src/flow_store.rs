// trustlayer-core/src/flow_store.rs
//! Per-exchange mapping storage.
//!
//! A mapping is put when a request is redacted and taken when its response
//! is restored. Between those two points the store owns it exclusively.
//! Three mechanisms make sure an entry never outlives its exchange:
//!
//! * [`FlowLease`] discards the entry when dropped without `commit()`, so a
//!   failure between redaction and forwarding cannot leave it behind.
//! * [`FlowStore::take_if_present`] removes the entry atomically on the
//!   response path.
//! * [`FlowStore::sweep_expired`], optionally driven by
//!   [`FlowStore::spawn_reaper`], drops entries whose response never came.
//!
//! License: MIT OR APACHE 2.0

use dashmap::DashMap;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use crate::tokenizer::Mapping;

/// Opaque identifier of one request/response exchange.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExchangeId(String);

impl ExchangeId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Mints a random (UUID v4) id.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ExchangeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ExchangeId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for ExchangeId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

#[derive(Debug)]
struct FlowEntry {
    mapping: Mapping,
    inserted_at: Instant,
}

/// Concurrent `ExchangeId -> Mapping` table.
#[derive(Debug)]
pub struct FlowStore {
    entries: DashMap<ExchangeId, FlowEntry>,
    ttl: Duration,
}

impl Default for FlowStore {
    fn default() -> Self {
        Self::new(crate::config::FlowConfig::default().ttl())
    }
}

impl FlowStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Stores `mapping` for `id`, replacing (and warning about) a stale entry.
    pub fn put(&self, id: ExchangeId, mapping: Mapping) {
        let token_count = mapping.len();
        let previous = self.entries.insert(
            id.clone(),
            FlowEntry {
                mapping,
                inserted_at: Instant::now(),
            },
        );
        if let Some(stale) = previous {
            warn!(
                "Exchange '{}' already had a mapping ({} tokens); replacing it.",
                id,
                stale.mapping.len()
            );
        }
        debug!(target: "trustlayer_core::flow_store", "Stored {} token(s) for exchange '{}'.", token_count, id);
    }

    /// Removes and returns the mapping for `id`. At most one caller gets it.
    pub fn take_if_present(&self, id: &ExchangeId) -> Option<Mapping> {
        self.entries.remove(id).map(|(_, entry)| entry.mapping)
    }

    /// Drops the mapping for `id`, if any. Returns whether one was present.
    pub fn discard(&self, id: &ExchangeId) -> bool {
        let removed = self.entries.remove(id).is_some();
        if removed {
            debug!(target: "trustlayer_core::flow_store", "Discarded mapping for exchange '{}'.", id);
        }
        removed
    }

    pub fn contains(&self, id: &ExchangeId) -> bool {
        self.entries.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drops every entry older than the TTL. Returns how many were dropped.
    pub fn sweep_expired(&self) -> usize {
        let ttl = self.ttl;
        let mut dropped = 0usize;
        self.entries.retain(|id, entry| {
            let alive = entry.inserted_at.elapsed() < ttl;
            if !alive {
                warn!("Exchange '{}' abandoned; reclaiming its mapping.", id);
                dropped += 1;
            }
            alive
        });
        dropped
    }

    /// Runs [`sweep_expired`](Self::sweep_expired) every `interval` on the
    /// current tokio runtime. The task ends once the store is dropped.
    pub fn spawn_reaper(self: &Arc<Self>, interval: Duration) -> tokio::task::JoinHandle<()> {
        let store: Weak<Self> = Arc::downgrade(self);
        info!("Starting flow store reaper (every {:?}).", interval);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let Some(store) = store.upgrade() else {
                    debug!("Flow store dropped; reaper exiting.");
                    break;
                };
                let dropped = store.sweep_expired();
                if dropped > 0 {
                    info!("Reaper reclaimed {} abandoned mapping(s).", dropped);
                }
            }
        })
    }

    /// Opens a lease on the slot of `id`.
    pub fn lease(&self, id: ExchangeId) -> FlowLease<'_> {
        FlowLease {
            store: self,
            id,
            committed: false,
        }
    }
}

/// Scoped claim on one exchange's slot.
///
/// Dropping the lease without calling [`commit`](FlowLease::commit) discards
/// whatever was put through it.
#[derive(Debug)]
pub struct FlowLease<'a> {
    store: &'a FlowStore,
    id: ExchangeId,
    committed: bool,
}

impl FlowLease<'_> {
    pub fn id(&self) -> &ExchangeId {
        &self.id
    }

    pub fn put(&mut self, mapping: Mapping) {
        self.store.put(self.id.clone(), mapping);
    }

    /// Takes the mapping back out of the store.
    pub fn take(&mut self) -> Option<Mapping> {
        self.store.take_if_present(&self.id)
    }

    /// Keeps the entry in the store after the lease ends.
    pub fn commit(mut self) {
        self.committed = true;
    }
}

impl Drop for FlowLease<'_> {
    fn drop(&mut self) {
        if !self.committed {
            self.store.discard(&self.id);
        }
    }
}
