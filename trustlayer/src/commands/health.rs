//! `trustlayer health`: liveness probe.

use anyhow::Result;
use serde_json::json;
use std::io::{self, Write};

pub fn run_health() -> Result<()> {
    let mut writer = io::stdout().lock();
    writeln!(writer, "{}", json!({ "status": "ok" }))?;
    Ok(())
}
