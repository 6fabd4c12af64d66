//! Token replacement over whole buffers and over chunked streams.
//!
//! `ChunkRewriter` holds back the last `max_token_len - 1` bytes of every
//! chunk. A token split across a chunk boundary is therefore always fully
//! present in the buffer the next time it is scanned. Because tokens are
//! prefix-free (see [`crate::token`]), a complete hit is final and the
//! concatenated output equals [`rewrite_all`] over the concatenated input.

extern crate alloc;
use alloc::vec::Vec;

use crate::automaton::{AutomatonError, TokenAutomaton};

/// Token literals paired with the bytes they stand for.
#[derive(Debug)]
pub struct ReplacementTable {
    automaton: TokenAutomaton,
    replacements: Vec<Vec<u8>>,
}

impl ReplacementTable {
    pub fn new<I, K, V>(pairs: I) -> Result<Self, AutomatonError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<[u8]>,
        V: AsRef<[u8]>,
    {
        let mut patterns = Vec::new();
        let mut replacements = Vec::new();
        for (token, original) in pairs {
            patterns.push(token.as_ref().to_vec());
            replacements.push(original.as_ref().to_vec());
        }
        let automaton = TokenAutomaton::new(&patterns)?;
        Ok(Self {
            automaton,
            replacements,
        })
    }

    pub fn max_token_len(&self) -> usize {
        self.automaton.max_pattern_len()
    }

    /// Rewrites `input` into `out`, returning the offset just past the last hit.
    fn rewrite_into(&self, input: &[u8], out: &mut Vec<u8>) -> usize {
        let mut cursor = 0usize;
        for hit in self.automaton.find_all(input) {
            out.extend_from_slice(&input[cursor..hit.start]);
            out.extend_from_slice(&self.replacements[hit.pattern]);
            cursor = hit.end;
        }
        cursor
    }
}

/// Replaces every token in a complete buffer in a single scan.
pub fn rewrite_all(table: &ReplacementTable, input: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(input.len());
    let cursor = table.rewrite_into(input, &mut out);
    out.extend_from_slice(&input[cursor..]);
    out
}

/// Per-stream rewriter with a carry-over window.
#[derive(Debug)]
pub struct ChunkRewriter {
    table: ReplacementTable,
    pending: Vec<u8>,
    window: usize,
}

impl ChunkRewriter {
    pub fn new(table: ReplacementTable) -> Self {
        let window = table.max_token_len().saturating_sub(1);
        Self {
            table,
            pending: Vec::with_capacity(window * 2),
            window,
        }
    }

    pub fn table(&self) -> &ReplacementTable {
        &self.table
    }

    /// Number of bytes currently held back.
    pub fn carried(&self) -> usize {
        self.pending.len()
    }

    /// Feeds the next chunk and returns the bytes that are safe to emit.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<u8> {
        self.pending.extend_from_slice(chunk);

        let mut out = Vec::with_capacity(self.pending.len());
        let cursor = self.table.rewrite_into(&self.pending, &mut out);

        // Anything after the last hit that could still be the head of a
        // token stays in the carry.
        let keep_from = cursor.max(self.pending.len().saturating_sub(self.window));
        out.extend_from_slice(&self.pending[cursor..keep_from]);
        self.pending.drain(..keep_from);
        out
    }

    /// Emits whatever is still carried. No complete token can be in it.
    pub fn flush(&mut self) -> Vec<u8> {
        core::mem::take(&mut self.pending)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec;

    fn table() -> ReplacementTable {
        ReplacementTable::new(vec![("[PERSON_1]", "Sachin"), ("[EMAIL_ADDRESS_1]", "s@x.io")]).unwrap()
    }

    fn stream(chunks: &[&[u8]]) -> Vec<u8> {
        let mut rewriter = ChunkRewriter::new(table());
        let mut out = Vec::new();
        for chunk in chunks {
            out.extend(rewriter.feed(chunk));
        }
        out.extend(rewriter.flush());
        out
    }

    #[test]
    fn test_split_token_is_restored() {
        let table = table();
        let out = stream(&[&b"...is [PER"[..], &b"SON_1] today"[..]]);
        assert_eq!(out, b"...is Sachin today".to_vec());
        assert_eq!(out, rewrite_all(&table, b"...is [PERSON_1] today"));
    }

    #[test]
    fn test_every_split_point_matches_buffered() {
        let table = table();
        let input: &[u8] = b"[PERSON_1] wrote to [EMAIL_ADDRESS_1] and [PERSON_1] again [PERSON_2]";
        let expected = rewrite_all(&table, input);
        for split in 0..=input.len() {
            let (a, b) = input.split_at(split);
            assert_eq!(stream(&[a, b]), expected, "split at {}", split);
        }
        let bytes: Vec<&[u8]> = input.chunks(1).collect();
        assert_eq!(stream(&bytes), expected);
    }

    #[test]
    fn test_unfinished_token_is_flushed_verbatim() {
        let mut rewriter = ChunkRewriter::new(table());
        let first = rewriter.feed(b"hello [PERS");
        assert!(rewriter.carried() > 0);
        let rest = rewriter.flush();
        let mut all = first;
        all.extend(rest);
        assert_eq!(all, b"hello [PERS".to_vec());
        assert_eq!(rewriter.carried(), 0);
    }

    #[test]
    fn test_carry_never_exceeds_window() {
        let mut rewriter = ChunkRewriter::new(table());
        rewriter.feed(&[b'a'; 200]);
        assert!(rewriter.carried() < rewriter.table().max_token_len());
    }
}
