//! Multi-pattern automaton over the token literals of one mapping.

extern crate alloc;
use alloc::string::{String, ToString};
use alloc::vec::Vec;
use core::fmt;

use daachorse::{DoubleArrayAhoCorasick, DoubleArrayAhoCorasickBuilder, MatchKind};

/// Errors raised while building a [`TokenAutomaton`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AutomatonError {
    /// No patterns were supplied.
    Empty,
    /// A pattern was the empty string.
    EmptyPattern,
    /// The underlying double-array builder rejected the pattern set.
    Build(String),
}

impl fmt::Display for AutomatonError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AutomatonError::Empty => write!(f, "token automaton needs at least one pattern"),
            AutomatonError::EmptyPattern => write!(f, "token automaton patterns must be non-empty"),
            AutomatonError::Build(msg) => write!(f, "failed to build token automaton: {}", msg),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for AutomatonError {}

/// A single token occurrence inside a haystack.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenHit {
    pub start: usize,
    pub end: usize,
    /// Index of the matched pattern in the order the patterns were supplied.
    pub pattern: usize,
}

/// Leftmost-longest Aho-Corasick automaton over a fixed set of token literals.
pub struct TokenAutomaton {
    automaton: DoubleArrayAhoCorasick<u32>,
    pattern_count: usize,
    max_pattern_len: usize,
}

impl fmt::Debug for TokenAutomaton {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenAutomaton")
            .field("automaton", &"<DoubleArrayAhoCorasick>")
            .field("pattern_count", &self.pattern_count)
            .field("max_pattern_len", &self.max_pattern_len)
            .finish()
    }
}

impl TokenAutomaton {
    /// Builds an automaton; pattern `i` reports `TokenHit::pattern == i`.
    pub fn new<I, P>(patterns: I) -> Result<Self, AutomatonError>
    where
        I: IntoIterator<Item = P>,
        P: AsRef<[u8]>,
    {
        let mut pattern_vals: Vec<(P, u32)> = Vec::new();
        let mut max_pattern_len = 0usize;

        for (index, pattern) in patterns.into_iter().enumerate() {
            let len = pattern.as_ref().len();
            if len == 0 {
                return Err(AutomatonError::EmptyPattern);
            }
            max_pattern_len = max_pattern_len.max(len);
            let value = u32::try_from(index)
                .map_err(|_| AutomatonError::Build("too many patterns".to_string()))?;
            pattern_vals.push((pattern, value));
        }

        if pattern_vals.is_empty() {
            return Err(AutomatonError::Empty);
        }

        let pattern_count = pattern_vals.len();
        let automaton = DoubleArrayAhoCorasickBuilder::new()
            .match_kind(MatchKind::LeftmostLongest)
            .build_with_values(pattern_vals)
            .map_err(|e| AutomatonError::Build(e.to_string()))?;

        Ok(Self {
            automaton,
            pattern_count,
            max_pattern_len,
        })
    }

    /// Length in bytes of the longest pattern.
    pub fn max_pattern_len(&self) -> usize {
        self.max_pattern_len
    }

    pub fn pattern_count(&self) -> usize {
        self.pattern_count
    }

    /// All non-overlapping leftmost-longest hits in `haystack`, in order.
    pub fn find_all(&self, haystack: &[u8]) -> Vec<TokenHit> {
        self.automaton
            .leftmost_find_iter(haystack)
            .map(|m| TokenHit {
                start: m.start(),
                end: m.end(),
                pattern: m.value() as usize,
            })
            .collect()
    }
}
