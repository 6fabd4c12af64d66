//! Subcommand implementations and the loaders they share.

pub mod health;
pub mod prompt;
pub mod redact;
pub mod restore;
pub mod stats;

use anyhow::{Context, Result};
use log::debug;
use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use trustlayer_core::{merge_rules, DetectorConfig, TrustLayerConfig};

/// Default settings file: `<config dir>/trustlayer/config.yaml`.
pub fn default_settings_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("trustlayer").join("config.yaml"))
}

/// Loads pipeline settings from `path`, else the default settings file if it
/// exists, else built-in defaults. Environment overrides are applied last.
pub fn load_settings(path: Option<&Path>) -> Result<TrustLayerConfig> {
    let mut settings = match path {
        Some(p) => TrustLayerConfig::load_from_file(p)?,
        None => match default_settings_path().filter(|p| p.is_file()) {
            Some(p) => TrustLayerConfig::load_from_file(&p)?,
            None => {
                debug!("No settings file found, using defaults.");
                TrustLayerConfig::default()
            }
        },
    };
    settings
        .apply_env_overrides()
        .context("Invalid TrustLayer environment override")?;
    Ok(settings)
}

/// Built-in detector rules, merged with a user rules file when given.
pub fn load_rules(path: Option<&Path>) -> Result<DetectorConfig> {
    let defaults = DetectorConfig::load_default_rules()?;
    let user = path.map(DetectorConfig::load_from_file).transpose()?;
    Ok(merge_rules(defaults, user))
}

/// Reads a whole file, or stdin when `path` is `None`.
pub fn read_input_bytes(path: Option<&Path>) -> Result<Vec<u8>> {
    match path {
        Some(p) => fs::read(p).with_context(|| format!("Failed to read input file {}", p.display())),
        None => {
            let mut buf = Vec::new();
            io::stdin()
                .read_to_end(&mut buf)
                .context("Failed to read from stdin")?;
            Ok(buf)
        }
    }
}

pub fn read_input_string(path: Option<&Path>) -> Result<String> {
    let bytes = read_input_bytes(path)?;
    String::from_utf8(bytes).context("Input is not valid UTF-8")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_load_rules_merges_user_file() -> Result<()> {
        let mut file = NamedTempFile::new()?;
        writeln!(
            file,
            "rules:\n  - name: employee_id\n    pattern: 'EMP-\\d{{6}}'\n    entity_type: EMPLOYEE_ID\n"
        )?;
        let rules = load_rules(Some(file.path()))?;
        assert!(rules.rules.iter().any(|r| r.name == "employee_id"));
        assert!(rules.rules.iter().any(|r| r.entity_type == "EMAIL_ADDRESS"));
        Ok(())
    }

    #[test]
    fn test_load_settings_from_file() -> Result<()> {
        let mut file = NamedTempFile::new()?;
        writeln!(file, "language: de\nmin_leaf_len: 3\n")?;
        let settings = load_settings(Some(file.path()))?;
        assert_eq!(settings.language, "de");
        assert_eq!(settings.min_leaf_len, 3);
        Ok(())
    }
}
