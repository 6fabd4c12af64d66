// trustlayer/src/lib.rs
//! # TrustLayer CLI
//!
//! Command-line front end for `trustlayer-core`: redact text, restore it
//! from a saved mapping, send a prompt through the provider round trip, and
//! summarise the audit log.

pub mod cli;
pub mod commands;
pub mod logger;
pub mod ui;
