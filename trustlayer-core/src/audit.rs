// trustlayer-core/src/audit.rs
//! Audit records: how many entities of each type were redacted per exchange.
//!
//! Records never contain original values. Sink failures are logged and
//! swallowed; auditing must not block an exchange.
//!
//! License: MIT OR APACHE 2.0

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use log::{debug, error};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::errors::TrustLayerError;
use crate::flow_store::ExchangeId;

/// One persisted audit line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditRecord {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub entity_type: String,
    pub count: usize,
    pub exchange_id: String,
}

impl AuditRecord {
    pub fn new(entity_type: &str, count: usize, exchange_id: &ExchangeId) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            entity_type: entity_type.to_string(),
            count,
            exchange_id: exchange_id.to_string(),
        }
    }
}

/// Append-only destination for audit records.
pub trait AuditSink: Send + Sync {
    fn record(&self, record: AuditRecord) -> Result<(), TrustLayerError>;
}

/// Writes one record per entity type of `counts`. Failures are logged and
/// never returned.
pub fn record_counts(sink: &dyn AuditSink, counts: &BTreeMap<String, usize>, exchange_id: &ExchangeId) {
    for (entity_type, &count) in counts {
        if count == 0 {
            continue;
        }
        if let Err(e) = sink.record(AuditRecord::new(entity_type, count, exchange_id)) {
            error!("Audit write failed (continuing): {}", e);
        }
    }
}

/// JSON-lines file sink.
#[derive(Debug)]
pub struct JsonlAuditSink {
    path: PathBuf,
    file: Mutex<File>,
}

impl JsonlAuditSink {
    /// Opens `path` for appending, creating it and its parent directory.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create audit directory {}", parent.display()))?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .with_context(|| format!("Failed to open audit file {}", path.display()))?;
        debug!("Audit records go to {}", path.display());
        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl AuditSink for JsonlAuditSink {
    fn record(&self, record: AuditRecord) -> Result<(), TrustLayerError> {
        let failure = |reason: String| TrustLayerError::AuditWriteFailure {
            exchange_id: record.exchange_id.clone(),
            reason,
        };
        let mut line = serde_json::to_string(&record).map_err(|e| failure(e.to_string()))?;
        line.push('\n');
        let mut file = self.file.lock().map_err(|_| failure("audit file lock poisoned".to_string()))?;
        file.write_all(line.as_bytes()).map_err(|e| failure(e.to_string()))?;
        file.flush().map_err(|e| failure(e.to_string()))
    }
}

/// Keeps records in memory. Useful for tests and embedding.
#[derive(Debug, Default)]
pub struct MemoryAuditSink {
    records: Mutex<Vec<AuditRecord>>,
}

impl MemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<AuditRecord> {
        self.records.lock().map(|r| r.clone()).unwrap_or_else(|p| p.into_inner().clone())
    }
}

impl AuditSink for MemoryAuditSink {
    fn record(&self, record: AuditRecord) -> Result<(), TrustLayerError> {
        self.records
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(record);
        Ok(())
    }
}

/// Discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullAuditSink;

impl AuditSink for NullAuditSink {
    fn record(&self, _record: AuditRecord) -> Result<(), TrustLayerError> {
        Ok(())
    }
}

/// Reads every record of a JSONL audit file. Malformed lines are skipped
/// with a warning.
pub fn read_records<P: AsRef<Path>>(path: P) -> Result<Vec<AuditRecord>> {
    let path = path.as_ref();
    let file = File::open(path).with_context(|| format!("Failed to open audit file {}", path.display()))?;
    let mut records = Vec::new();
    for (line_no, line) in BufReader::new(file).lines().enumerate() {
        let line = line.with_context(|| format!("Failed to read audit file {}", path.display()))?;
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<AuditRecord>(&line) {
            Ok(record) => records.push(record),
            Err(e) => log::warn!("Skipping malformed audit line {} in {}: {}", line_no + 1, path.display(), e),
        }
    }
    Ok(records)
}

/// Per entity type: total count and number of distinct exchanges.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityTotals {
    pub total: usize,
    pub exchanges: usize,
}

/// Aggregates records by entity type.
pub fn aggregate(records: &[AuditRecord]) -> BTreeMap<String, EntityTotals> {
    let mut seen: BTreeMap<&str, std::collections::BTreeSet<&str>> = BTreeMap::new();
    let mut totals: BTreeMap<String, EntityTotals> = BTreeMap::new();
    for record in records {
        totals.entry(record.entity_type.clone()).or_default().total += record.count;
        seen.entry(&record.entity_type).or_default().insert(&record.exchange_id);
    }
    for (entity_type, exchanges) in seen {
        if let Some(t) = totals.get_mut(entity_type) {
            t.exchanges = exchanges.len();
        }
    }
    totals
}

#[cfg(test)]
mod tests {
    use super::*;

    struct BrokenSink;

    impl AuditSink for BrokenSink {
        fn record(&self, record: AuditRecord) -> Result<(), TrustLayerError> {
            Err(TrustLayerError::AuditWriteFailure {
                exchange_id: record.exchange_id,
                reason: "disk full".to_string(),
            })
        }
    }

    fn counts() -> BTreeMap<String, usize> {
        BTreeMap::from([("PERSON".to_string(), 2), ("EMAIL_ADDRESS".to_string(), 1)])
    }

    #[test]
    fn test_record_counts_writes_one_record_per_type() {
        let sink = MemoryAuditSink::new();
        record_counts(&sink, &counts(), &ExchangeId::from("e1"));
        let records = sink.records();
        assert_eq!(records.len(), 2);
        assert!(records.iter().all(|r| r.exchange_id == "e1"));
    }

    #[test]
    fn test_record_counts_swallows_failures() {
        record_counts(&BrokenSink, &counts(), &ExchangeId::from("e2"));
    }

    #[test]
    fn test_jsonl_round_trip_and_aggregate() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("audit.jsonl");
        let sink = JsonlAuditSink::open(&path).unwrap();
        record_counts(&sink, &counts(), &ExchangeId::from("a"));
        record_counts(&sink, &counts(), &ExchangeId::from("b"));

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.lines().next().unwrap().contains("\"entityType\""));

        let totals = aggregate(&read_records(&path).unwrap());
        assert_eq!(totals["PERSON"], EntityTotals { total: 4, exchanges: 2 });
        assert_eq!(totals["EMAIL_ADDRESS"].total, 2);
    }
}
