// trustlayer/src/logger.rs
//! Logger setup for the CLI. All log output goes to stderr so stdout stays
//! clean for redacted text and JSON.

use env_logger::{Builder, Env, Target};
use log::LevelFilter;

/// Initialises `env_logger`.
///
/// `level` overrides `RUST_LOG` when given; otherwise `RUST_LOG` applies,
/// falling back to `warn`. Calling this more than once is harmless.
pub fn init_logger(level: Option<LevelFilter>) {
    let mut builder = Builder::from_env(Env::default().default_filter_or("warn"));
    builder.target(Target::Stderr).format_timestamp(None);
    if let Some(level) = level {
        builder.filter_level(level);
    }
    let _ = builder.try_init();
}

/// Maps the global `--quiet` / `--debug` flags to a level override.
pub fn level_from_flags(quiet: bool, debug: bool) -> Option<LevelFilter> {
    if quiet {
        Some(LevelFilter::Off)
    } else if debug {
        Some(LevelFilter::Debug)
    } else {
        None
    }
}
