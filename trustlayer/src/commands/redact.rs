//! `trustlayer redact`: replaces PII in a file or stdin with tokens.

use anyhow::{Context, Result};
use log::info;
use std::fs;
use std::io::{self, Write};
use std::sync::Arc;

use trustlayer_core::{DetectorConfig, RedactionResult, RegexDetector, Tokenizer, TrustLayerConfig};

use crate::cli::RedactCommand;
use crate::commands::read_input_string;
use crate::ui::output::info_msg;

pub fn run_redact(cmd: &RedactCommand, mut rules: DetectorConfig, settings: &TrustLayerConfig, quiet: bool) -> Result<()> {
    rules.set_active_rules(&cmd.enable, &cmd.disable);
    let language = cmd.language.as_deref().unwrap_or(&settings.language);

    let input = read_input_string(cmd.input_file.as_deref())?;
    let detector = RegexDetector::new(rules)?;
    let tokenizer = Tokenizer::from_config(Arc::new(detector), settings).with_language(language);
    let result = tokenizer.redact(&input)?;
    info!("Redacted {} value(s) from {} byte(s) of input.", result.total_redacted(), input.len());

    if let Some(path) = &cmd.mapping_out {
        let json = serde_json::to_string_pretty(&result.mapping)?;
        fs::write(path, json).with_context(|| format!("Failed to write mapping file {}", path.display()))?;
        if !quiet {
            info_msg(format!("Mapping for {} token(s) written to {}", result.mapping.len(), path.display()));
        }
    }

    let stdout = io::stdout();
    let mut writer = stdout.lock();
    if cmd.json {
        writeln!(writer, "{}", serde_json::to_string_pretty(&result)?)?;
    } else {
        write_text(&mut writer, &result.redacted_text)?;
        if !quiet {
            print_summary(&result);
        }
    }
    Ok(())
}

/// Writes `text`, adding a trailing newline only when it has none.
pub(crate) fn write_text<W: Write>(writer: &mut W, text: &str) -> io::Result<()> {
    if text.ends_with('\n') {
        write!(writer, "{}", text)
    } else {
        writeln!(writer, "{}", text)
    }
}

fn print_summary(result: &RedactionResult) {
    if result.entity_counts.is_empty() {
        info_msg("No PII found.");
        return;
    }
    let parts: Vec<String> = result
        .entity_counts
        .iter()
        .map(|(entity, count)| format!("{} x{}", entity, count))
        .collect();
    info_msg(format!("Redacted: {}", parts.join(", ")));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_text_keeps_single_newline() {
        let mut out = Vec::new();
        write_text(&mut out, "a\n").unwrap();
        write_text(&mut out, "b").unwrap();
        assert_eq!(out, b"a\nb\n");
    }
}
