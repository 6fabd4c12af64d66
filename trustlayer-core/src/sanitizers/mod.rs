//! Rule compilation for the built-in regex detector.
//!
//! `compiler` turns validated `DetectorRule`s into compiled regular
//! expressions and caches them per rule set.

pub mod compiler;
