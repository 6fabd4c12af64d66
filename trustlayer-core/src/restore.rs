// trustlayer-core/src/restore.rs
//! Deanonymization: puts original values back in place of tokens.
//!
//! Both the buffered and the chunked path run the same leftmost-longest
//! automaton from `trustlayer-scan`, so restoring a body in one piece and
//! restoring it chunk by chunk give the same bytes.
//!
//! License: MIT OR APACHE 2.0

use log::warn;

use trustlayer_scan::{rewrite_all, AutomatonError, ChunkRewriter, ReplacementTable};

use crate::tokenizer::Mapping;

fn table_for(mapping: &Mapping) -> Result<ReplacementTable, AutomatonError> {
    ReplacementTable::new(mapping.iter())
}

/// Replaces every occurrence of every token of `mapping` in `text`.
///
/// Text without tokens is returned unchanged, so restoring twice is the same
/// as restoring once.
pub fn restore(text: &str, mapping: &Mapping) -> String {
    if mapping.is_empty() || text.is_empty() {
        return text.to_string();
    }
    match table_for(mapping) {
        Ok(table) => {
            let bytes = rewrite_all(&table, text.as_bytes());
            // Only whole tokens (ASCII) are swapped for whole strings.
            String::from_utf8(bytes).unwrap_or_else(|e| String::from_utf8_lossy(e.as_bytes()).into_owned())
        }
        Err(e) => {
            warn!("Token automaton unavailable ({}), restoring by sequential replacement.", e);
            restore_sequential(text, mapping)
        }
    }
}

/// Byte-level variant of [`restore`] for opaque response bodies.
pub fn restore_bytes(body: &[u8], mapping: &Mapping) -> Vec<u8> {
    if mapping.is_empty() || body.is_empty() {
        return body.to_vec();
    }
    match table_for(mapping) {
        Ok(table) => rewrite_all(&table, body),
        Err(e) => {
            warn!("Token automaton unavailable ({}), restoring by sequential replacement.", e);
            match std::str::from_utf8(body) {
                Ok(text) => restore_sequential(text, mapping).into_bytes(),
                Err(_) => body.to_vec(),
            }
        }
    }
}

fn restore_sequential(text: &str, mapping: &Mapping) -> String {
    mapping
        .iter()
        .fold(text.to_string(), |acc, (token, original)| acc.replace(token, original))
}

/// Chunked restoration of one response stream.
#[derive(Debug)]
pub struct ChunkRestorer {
    rewriter: Option<ChunkRewriter>,
}

impl ChunkRestorer {
    /// With an empty mapping every chunk passes straight through.
    pub fn new(mapping: &Mapping) -> Result<Self, AutomatonError> {
        let rewriter = if mapping.is_empty() {
            None
        } else {
            Some(ChunkRewriter::new(table_for(mapping)?))
        };
        Ok(Self { rewriter })
    }

    /// Returns the restored bytes that are safe to emit after `chunk`.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<u8> {
        match self.rewriter.as_mut() {
            Some(rewriter) => rewriter.feed(chunk),
            None => chunk.to_vec(),
        }
    }

    /// Emits the carried remainder, unmodified.
    pub fn flush(&mut self) -> Vec<u8> {
        self.rewriter.as_mut().map(ChunkRewriter::flush).unwrap_or_default()
    }

    pub fn carried(&self) -> usize {
        self.rewriter.as_ref().map_or(0, ChunkRewriter::carried)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mapping() -> Mapping {
        let mut m = Mapping::new();
        m.insert("[PERSON_1]", "Sachin");
        m.insert("[EMAIL_ADDRESS_1]", "sachin@example.com");
        m
    }

    #[test]
    fn test_restore_replaces_every_occurrence() {
        let out = restore("[PERSON_1] <[EMAIL_ADDRESS_1]>, bye [PERSON_1]", &mapping());
        assert_eq!(out, "Sachin <sachin@example.com>, bye Sachin");
    }

    #[test]
    fn test_restore_is_idempotent() {
        let once = restore("Hello [PERSON_1]", &mapping());
        assert_eq!(restore(&once, &mapping()), once);
    }

    #[test]
    fn test_unknown_tokens_survive() {
        assert_eq!(restore("[PERSON_2] here", &mapping()), "[PERSON_2] here");
    }

    #[test]
    fn test_chunk_restorer_matches_buffered() {
        let mut restorer = ChunkRestorer::new(&mapping()).unwrap();
        let mut out = restorer.feed(b"...is [PER");
        out.extend(restorer.feed(b"SON_1] today"));
        out.extend(restorer.flush());
        assert_eq!(out, restore_bytes(b"...is [PERSON_1] today", &mapping()));
        assert_eq!(out, b"...is Sachin today");
    }

    #[test]
    fn test_empty_mapping_passes_through() {
        let mut restorer = ChunkRestorer::new(&Mapping::new()).unwrap();
        assert_eq!(restorer.feed(b"[PER"), b"[PER");
        assert!(restorer.flush().is_empty());
    }
}
