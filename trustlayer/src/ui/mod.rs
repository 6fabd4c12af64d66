//! Terminal output helpers.

pub mod output;
pub mod stats_table;
