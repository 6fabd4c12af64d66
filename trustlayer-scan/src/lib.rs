// trustlayer-scan/src/lib.rs
#![no_std]

extern crate alloc;

#[cfg(feature = "std")]
extern crate std;

pub mod token;
pub mod automaton;
pub mod rewriter;

pub use automaton::{AutomatonError, TokenAutomaton, TokenHit};
pub use rewriter::{rewrite_all, ChunkRewriter, ReplacementTable};
pub use token::{format_token, normalize_entity_type, parse_token};
