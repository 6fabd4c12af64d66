//! Configuration management for `trustlayer-core`.
//!
//! Two documents are configured here. Detector rules (`DetectorConfig`) tell
//! the built-in regex detector what to look for; they load from YAML, merge by
//! rule name and are validated before use. Pipeline settings
//! (`TrustLayerConfig`) control failure policy, store lifetime, stream
//! strategy, interception scope and the upstream provider; every field has a
//! serde default and a handful can be overridden from the environment.
//!
//! License: MIT OR Apache-2.0

use anyhow::{anyhow, Context, Result};
use log::{debug, info, warn};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Maximum allowed length for a regex pattern string.
pub const MAX_PATTERN_LENGTH: usize = 500;

/// Default language passed to the detector.
pub const DEFAULT_LANGUAGE: &str = "en";

/// A single rule of the built-in regex detector.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct DetectorRule {
    /// Unique identifier for the rule (e.g., "email_address").
    pub name: String,
    pub description: Option<String>,
    /// Entity label reported for matches (e.g., "EMAIL_ADDRESS").
    pub entity_type: String,
    /// The regex pattern string.
    pub pattern: Option<String>,
    /// Capture group whose span is reported. `None` reports the whole match.
    pub capture_group: Option<usize>,
    pub multiline: bool,
    pub dot_matches_new_line: bool,
    pub case_insensitive: bool,
    /// If true, the rule is disabled unless explicitly enabled.
    pub opt_in: bool,
    /// If true, matches must also pass a programmatic check (e.g., Luhn).
    pub programmatic_validation: bool,
    /// Explicit override for enabling/disabling the rule.
    pub enabled: Option<bool>,
    /// Languages the rule applies to. `None` means every language.
    pub languages: Option<Vec<String>>,
    pub tags: Option<Vec<String>>,
}

impl Hash for DetectorRule {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name.hash(state);
        self.entity_type.hash(state);
        self.pattern.hash(state);
        self.capture_group.hash(state);
        self.multiline.hash(state);
        self.dot_matches_new_line.hash(state);
        self.case_insensitive.hash(state);
        self.opt_in.hash(state);
        self.programmatic_validation.hash(state);
        self.enabled.hash(state);
        self.languages.hash(state);
    }
}

impl Default for DetectorRule {
    fn default() -> Self {
        Self {
            name: String::new(),
            description: None,
            entity_type: "PII".to_string(),
            pattern: None,
            capture_group: None,
            multiline: false,
            dot_matches_new_line: false,
            case_insensitive: false,
            opt_in: false,
            programmatic_validation: false,
            enabled: None,
            languages: None,
            tags: None,
        }
    }
}

impl DetectorRule {
    pub fn is_active(&self) -> bool {
        self.enabled.unwrap_or(!self.opt_in)
    }

    pub fn applies_to(&self, language: &str) -> bool {
        match &self.languages {
            Some(langs) => langs.iter().any(|l| l.eq_ignore_ascii_case(language)),
            None => true,
        }
    }
}

/// The rule set of the built-in regex detector.
#[derive(Debug, Default, Deserialize, Serialize, Clone, PartialEq)]
pub struct DetectorConfig {
    pub rules: Vec<DetectorRule>,
}

impl DetectorConfig {
    /// Loads detector rules from a YAML file.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!("Loading detector rules from: {}", path.display());
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read rules file {}", path.display()))?;
        let config: DetectorConfig = serde_yml::from_str(&text)
            .with_context(|| format!("Failed to parse rules file {}", path.display()))?;

        validate_rules(&config.rules)?;
        info!("Loaded {} rules from file {}.", config.rules.len(), path.display());

        Ok(config)
    }

    /// Loads the built-in rules embedded at compile time.
    pub fn load_default_rules() -> Result<Self> {
        debug!("Loading default detector rules from embedded string...");
        let default_yaml = include_str!("../config/default_rules.yaml");
        let config: DetectorConfig =
            serde_yml::from_str(default_yaml).context("Failed to parse default rules")?;

        validate_rules(&config.rules).context("Embedded default rules are invalid")?;
        debug!("Loaded {} default rules.", config.rules.len());
        Ok(config)
    }

    /// Filters active rules based on explicit enable/disable lists.
    pub fn set_active_rules(&mut self, enable_rules: &[String], disable_rules: &[String]) {
        let enable_set: HashSet<&str> = enable_rules.iter().map(String::as_str).collect();
        let disable_set: HashSet<&str> = disable_rules.iter().map(String::as_str).collect();
        let all_rule_names: HashSet<&str> = self.rules.iter().map(|r| r.name.as_str()).collect();

        for rule_name in enable_set.difference(&all_rule_names) {
            warn!("Rule '{}' in `enable_rules` list does not exist.", rule_name);
        }
        for rule_name in disable_set.difference(&all_rule_names) {
            warn!("Rule '{}' in `disable_rules` list does not exist.", rule_name);
        }

        self.rules.retain(|rule| {
            let name = rule.name.as_str();
            !disable_set.contains(name) && (!rule.opt_in || enable_set.contains(name))
        });
        for rule in self.rules.iter_mut() {
            if enable_set.contains(rule.name.as_str()) {
                rule.enabled = Some(true);
            }
        }

        debug!("Active rules after filtering: {}", self.rules.len());
    }
}

/// Merges user-defined rules over the defaults; user rules win by name.
pub fn merge_rules(default_config: DetectorConfig, user_config: Option<DetectorConfig>) -> DetectorConfig {
    debug!("merge_rules called. Default rules: {}", default_config.rules.len());

    let mut order: Vec<String> = default_config.rules.iter().map(|r| r.name.clone()).collect();
    let mut final_rules_map: HashMap<String, DetectorRule> = default_config
        .rules
        .into_iter()
        .map(|rule| (rule.name.clone(), rule))
        .collect();

    if let Some(user_cfg) = user_config {
        debug!("Merging {} user rules.", user_cfg.rules.len());
        for user_rule in user_cfg.rules {
            if !final_rules_map.contains_key(&user_rule.name) {
                order.push(user_rule.name.clone());
            }
            final_rules_map.insert(user_rule.name.clone(), user_rule);
        }
    }

    let rules: Vec<DetectorRule> = order
        .into_iter()
        .filter_map(|name| final_rules_map.remove(&name))
        .collect();
    debug!("Final total rules after merge: {}", rules.len());

    DetectorConfig { rules }
}

/// Validates rule integrity (names, regex compilation, capture groups).
pub fn validate_rules(rules: &[DetectorRule]) -> Result<()> {
    let mut rule_names = HashSet::new();
    let mut errors = Vec::new();

    for rule in rules {
        if rule.name.is_empty() {
            errors.push("A rule has an empty `name` field.".to_string());
        } else if !rule_names.insert(rule.name.clone()) {
            errors.push(format!("Duplicate rule name found: '{}'.", rule.name));
        }

        if rule.entity_type.trim().is_empty() {
            errors.push(format!("Rule '{}' has an empty `entity_type` field.", rule.name));
        }

        let pattern = match &rule.pattern {
            Some(p) if !p.is_empty() => p,
            Some(_) => {
                errors.push(format!("Rule '{}' has an empty `pattern` field.", rule.name));
                continue;
            }
            None => {
                errors.push(format!("Rule '{}' is missing the `pattern` field.", rule.name));
                continue;
            }
        };

        if pattern.len() > MAX_PATTERN_LENGTH {
            errors.push(format!(
                "Rule '{}': pattern length ({}) exceeds maximum allowed ({}).",
                rule.name,
                pattern.len(),
                MAX_PATTERN_LENGTH
            ));
            continue;
        }

        let regex = match Regex::new(pattern) {
            Ok(r) => r,
            Err(e) => {
                errors.push(format!("Rule '{}' has an invalid regex pattern: {}", rule.name, e));
                continue;
            }
        };

        if let Some(group) = rule.capture_group {
            // captures_len() counts the implicit whole-match group 0.
            if group >= regex.captures_len() {
                errors.push(format!(
                    "Rule '{}': capture_group {} does not exist in pattern.",
                    rule.name, group
                ));
            }
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(anyhow!("Rule validation failed:\n{}", errors.join("\n")))
    }
}

/// What to do when the detector cannot analyse a text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectionFailurePolicy {
    /// Forward the text unchanged and log. Favors availability.
    #[default]
    FailOpen,
    /// Reject the exchange.
    FailClosed,
}

impl std::str::FromStr for DetectionFailurePolicy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "fail_open" | "open" => Ok(Self::FailOpen),
            "fail_closed" | "closed" => Ok(Self::FailClosed),
            other => Err(anyhow!("Unknown detection failure policy '{}'", other)),
        }
    }
}

/// How responses of exchanges that carry a mapping are delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamStrategy {
    /// Materialize the full body, restore once, deliver.
    #[default]
    Buffered,
    /// Restore chunk by chunk through the carry-over rewriter.
    Incremental,
    /// Incremental for `text/event-stream`, buffered otherwise.
    Auto,
}

impl std::str::FromStr for StreamStrategy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "buffered" => Ok(Self::Buffered),
            "incremental" | "streaming" => Ok(Self::Incremental),
            "auto" => Ok(Self::Auto),
            other => Err(anyhow!("Unknown stream strategy '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct FlowConfig {
    /// Entries older than this are reclaimed even if no response arrives.
    pub ttl_secs: u64,
    pub reaper_interval_secs: u64,
}

impl Default for FlowConfig {
    fn default() -> Self {
        Self {
            ttl_secs: 300,
            reaper_interval_secs: 30,
        }
    }
}

impl FlowConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }

    pub fn reaper_interval(&self) -> Duration {
        Duration::from_secs(self.reaper_interval_secs.max(1))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct StreamConfig {
    pub strategy: StreamStrategy,
    /// Upper bound on a buffered response body.
    pub max_buffer_bytes: usize,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            strategy: StreamStrategy::Buffered,
            max_buffer_bytes: 16 * 1024 * 1024,
        }
    }
}

/// Which intercepted flows the pipeline touches.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct InterceptionFilter {
    pub target_hosts: Vec<String>,
    pub methods: Vec<String>,
}

impl Default for InterceptionFilter {
    fn default() -> Self {
        Self {
            target_hosts: vec![
                "chat.openai.com".to_string(),
                "chatgpt.com".to_string(),
                "gemini.google.com".to_string(),
                "claude.ai".to_string(),
            ],
            methods: vec!["POST".to_string(), "PUT".to_string()],
        }
    }
}

impl InterceptionFilter {
    /// Only outbound writes to known AI hosts are inspected.
    pub fn matches(&self, host: &str, method: &str) -> bool {
        let host = host.to_ascii_lowercase();
        self.methods.iter().any(|m| m.eq_ignore_ascii_case(method))
            && self
                .target_hosts
                .iter()
                .any(|target| host.contains(&target.to_ascii_lowercase()))
    }
}

/// Bounded exponential backoff for transient upstream failures.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 250,
            max_delay_ms: 4_000,
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `attempt` (1-based).
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        let delay = self.base_delay_ms.saturating_mul(1u64 << exponent);
        Duration::from_millis(delay.min(self.max_delay_ms))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct UpstreamConfig {
    pub endpoint: String,
    pub api_key: String,
    pub model: String,
    pub timeout_secs: u64,
    pub retry: RetryPolicy,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://api.openai.com/v1/chat/completions".to_string(),
            api_key: "sk-mock-key".to_string(),
            model: "gpt-3.5-turbo".to_string(),
            timeout_secs: 30,
            retry: RetryPolicy::default(),
        }
    }
}

impl UpstreamConfig {
    /// A `sk-mock` key selects the offline mock provider.
    pub fn is_mock(&self) -> bool {
        self.api_key.starts_with("sk-mock")
    }
}

/// Top-level pipeline settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct TrustLayerConfig {
    pub language: String,
    pub detection_failure: DetectionFailurePolicy,
    /// String leaves shorter than this (in chars) are not analysed.
    pub min_leaf_len: usize,
    /// Redact request bodies that are not JSON as plain text.
    pub redact_plain_text: bool,
    pub flow: FlowConfig,
    pub stream: StreamConfig,
    pub intercept: InterceptionFilter,
    pub upstream: UpstreamConfig,
    pub audit_path: Option<PathBuf>,
}

impl Default for TrustLayerConfig {
    fn default() -> Self {
        Self {
            language: DEFAULT_LANGUAGE.to_string(),
            detection_failure: DetectionFailurePolicy::FailOpen,
            min_leaf_len: 0,
            redact_plain_text: true,
            flow: FlowConfig::default(),
            stream: StreamConfig::default(),
            intercept: InterceptionFilter::default(),
            upstream: UpstreamConfig::default(),
            audit_path: None,
        }
    }
}

impl TrustLayerConfig {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!("Loading pipeline settings from: {}", path.display());
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        serde_yml::from_str(&text).with_context(|| format!("Failed to parse config file {}", path.display()))
    }

    /// Applies overrides from the process environment.
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        self.apply_overrides_from(|key| std::env::var(key).ok())
    }

    /// Applies overrides from an arbitrary key lookup.
    pub fn apply_overrides_from<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(key) = lookup("OPENAI_API_KEY") {
            debug!("Upstream API key taken from environment.");
            self.upstream.api_key = key;
        }
        if let Some(url) = lookup("TRUSTLAYER_UPSTREAM_URL") {
            self.upstream.endpoint = url;
        }
        if let Some(model) = lookup("TRUSTLAYER_MODEL") {
            self.upstream.model = model;
        }
        if let Some(path) = lookup("TRUSTLAYER_AUDIT_PATH") {
            self.audit_path = Some(PathBuf::from(path));
        }
        if let Some(strategy) = lookup("TRUSTLAYER_STREAM_STRATEGY") {
            self.stream.strategy = strategy.parse()?;
        }
        if let Some(policy) = lookup("TRUSTLAYER_FAILURE_POLICY") {
            self.detection_failure = policy.parse()?;
        }
        Ok(())
    }

    /// Audit file location: configured path, or `<data dir>/trustlayer/audit.jsonl`.
    pub fn resolved_audit_path(&self) -> Option<PathBuf> {
        self.audit_path
            .clone()
            .or_else(|| dirs::data_dir().map(|d| d.join("trustlayer").join("audit.jsonl")))
    }
}
