//! `trustlayer prompt`: redact, ask the provider, restore the reply.

use anyhow::{Context, Result};
use log::debug;
use std::fs;
use std::io::{self, Write};
use std::path::Path;
use std::sync::Arc;

use trustlayer_core::{
    provider_from_config, AuditSink, DetectorConfig, JsonlAuditSink, NullAuditSink, PromptService, RegexDetector,
    TrustLayerConfig,
};

use crate::cli::{PromptCommand, PromptSource};
use crate::ui::output::warn_msg;

fn prompt_text(source: &PromptSource) -> Result<String> {
    match (&source.prompt, &source.file) {
        (Some(text), _) => Ok(text.clone()),
        (None, Some(path)) => {
            fs::read_to_string(path).with_context(|| format!("Failed to read prompt file {}", path.display()))
        }
        // clap enforces exactly one source; an empty prompt is rejected downstream.
        (None, None) => Ok(String::new()),
    }
}

/// Opens the JSONL audit sink, or returns a no-op sink when no path is
/// known or the file cannot be opened.
pub fn open_audit_sink(path: Option<&Path>, quiet: bool) -> Arc<dyn AuditSink> {
    let Some(path) = path else {
        debug!("No audit path available; audit records are discarded.");
        return Arc::new(NullAuditSink);
    };
    match JsonlAuditSink::open(path) {
        Ok(sink) => Arc::new(sink),
        Err(e) => {
            if !quiet {
                warn_msg(format!("Audit disabled: {:#}", e));
            }
            Arc::new(NullAuditSink)
        }
    }
}

pub async fn run_prompt(cmd: &PromptCommand, rules: DetectorConfig, settings: &TrustLayerConfig, quiet: bool) -> Result<()> {
    let text = prompt_text(&cmd.source)?;

    let detector = Arc::new(RegexDetector::new(rules)?);
    let provider = provider_from_config(&settings.upstream)?;
    let audit_path = cmd.audit.clone().or_else(|| settings.resolved_audit_path());
    let audit = open_audit_sink(audit_path.as_deref(), quiet);

    let service = PromptService::new(detector, provider, audit, settings);
    let report = service.process(&text).await?;

    let stdout = io::stdout();
    let mut writer = stdout.lock();
    writeln!(writer, "{}", serde_json::to_string_pretty(&report)?)?;
    Ok(())
}
