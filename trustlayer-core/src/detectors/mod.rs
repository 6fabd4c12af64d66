//! Concrete `PiiDetector` implementations.
//!
//! `regex_detector` is the built-in rule-driven detector. `literal` holds
//! deterministic detectors for tests, built only under `cfg(test)` or the
//! `test-util` feature: one that reports fixed literals and one that always
//! fails.
//!
//! # License
//! MIT OR Apache-2.0

#[cfg(any(test, feature = "test-util"))]
pub mod literal;
pub mod regex_detector;
