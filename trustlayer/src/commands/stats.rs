//! `trustlayer stats`: summarises an audit file by entity type.

use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::io::{self, Write};

use trustlayer_core::audit::{aggregate, read_records, EntityTotals};
use trustlayer_core::{AuditRecord, TrustLayerConfig};

use crate::cli::StatsCommand;
use crate::ui::stats_table::render_stats_table;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsReport {
    pub records: usize,
    pub first_seen: Option<DateTime<Utc>>,
    pub last_seen: Option<DateTime<Utc>>,
    pub entities: BTreeMap<String, EntityTotals>,
}

impl StatsReport {
    pub fn from_records(records: &[AuditRecord]) -> Self {
        Self {
            records: records.len(),
            first_seen: records.iter().map(|r| r.timestamp).min(),
            last_seen: records.iter().map(|r| r.timestamp).max(),
            entities: aggregate(records),
        }
    }
}

pub fn run_stats(cmd: &StatsCommand, settings: &TrustLayerConfig) -> Result<()> {
    let path = cmd
        .audit
        .clone()
        .or_else(|| settings.resolved_audit_path())
        .ok_or_else(|| anyhow!("No audit file given and no data directory available"))?;

    let records = if path.exists() { read_records(&path)? } else { Vec::new() };
    let report = StatsReport::from_records(&records);

    let stdout = io::stdout();
    let mut writer = stdout.lock();
    if cmd.json {
        writeln!(writer, "{}", serde_json::to_string_pretty(&report)?)?;
    } else if report.entities.is_empty() {
        writeln!(writer, "No audit records in {}", path.display())?;
    } else {
        writeln!(writer, "{}", render_stats_table(&report.entities))?;
        if let (Some(first), Some(last)) = (report.first_seen, report.last_seen) {
            writeln!(
                writer,
                "{} record(s) from {} to {}",
                report.records,
                first.format("%Y-%m-%d %H:%M:%S UTC"),
                last.format("%Y-%m-%d %H:%M:%S UTC")
            )?;
        }
    }
    Ok(())
}
