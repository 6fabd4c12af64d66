//! `trustlayer restore`: puts original values back using a saved mapping.

use anyhow::{bail, Context, Result};
use std::fs;
use std::io::{self, Write};
use std::path::Path;

use trustlayer_core::{restore_bytes, ChunkRestorer, Mapping};

use crate::cli::RestoreCommand;
use crate::commands::read_input_bytes;

pub fn load_mapping(path: &Path) -> Result<Mapping> {
    let text = fs::read_to_string(path).with_context(|| format!("Failed to read mapping file {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("Failed to parse mapping file {}", path.display()))
}

pub fn run_restore(cmd: &RestoreCommand) -> Result<()> {
    let mapping = load_mapping(&cmd.mapping)?;
    let input = read_input_bytes(cmd.input_file.as_deref())?;

    let output = match cmd.chunk_size {
        Some(0) => bail!("--chunk-size must be greater than zero"),
        Some(size) => restore_in_chunks(&input, &mapping, size)?,
        None => restore_bytes(&input, &mapping),
    };

    let stdout = io::stdout();
    let mut writer = stdout.lock();
    writer.write_all(&output)?;
    writer.flush()?;
    Ok(())
}

/// Feeds `input` through a [`ChunkRestorer`] `size` bytes at a time.
pub fn restore_in_chunks(input: &[u8], mapping: &Mapping, size: usize) -> Result<Vec<u8>> {
    let mut restorer = ChunkRestorer::new(mapping).context("Failed to build token automaton")?;
    let mut out = Vec::with_capacity(input.len());
    for chunk in input.chunks(size) {
        out.extend(restorer.feed(chunk));
    }
    out.extend(restorer.flush());
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunked_matches_buffered() {
        let mut mapping = Mapping::default();
        mapping.insert("[PERSON_1]".to_string(), "Ann".to_string());
        mapping.insert("[EMAIL_ADDRESS_1]".to_string(), "ann@example.com".to_string());
        let input = b"Hi [PERSON_1], mail [EMAIL_ADDRESS_1] or [PERSON_9].";
        let buffered = restore_bytes(input, &mapping);
        for size in 1..=input.len() {
            assert_eq!(restore_in_chunks(input, &mapping, size).unwrap(), buffered, "chunk size {}", size);
        }
    }
}
