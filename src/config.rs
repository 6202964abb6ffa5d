//! Serializable limiter configuration.
//!
//! ```json
//! {
//!   "enabled": true,
//!   "global_min_interval_ms": 100,
//!   "use_default_rules": true,
//!   "rules": [
//!     { "method": "GET", "path_prefix": "/iserver/marketdata/history", "max_concurrent": 2 }
//!   ]
//! }
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::limiter::RateLimiter;
use crate::rule::{default_rules, AdmissionRule, DEFAULT_GLOBAL_MIN_INTERVAL};

/// Errors loading a [`LimiterConfig`].
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid limiter configuration: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("reading limiter configuration: {0}")]
    Io(#[from] std::io::Error),
}

/// Top-level limiter configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LimiterConfig {
    /// Build a limiter at all. `false` yields no limiter.
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Global pacing interval; zero disables global pacing.
    #[serde(default = "default_global_min_interval_ms")]
    pub global_min_interval_ms: u64,

    /// Start from the built-in service quotas.
    #[serde(default = "default_enabled")]
    pub use_default_rules: bool,

    /// Extra rules, appended after the defaults when those are used.
    #[serde(default)]
    pub rules: Vec<RuleConfig>,
}

/// One configured rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleConfig {
    #[serde(default)]
    pub method: String,
    pub path_prefix: String,
    #[serde(default)]
    pub min_interval_ms: u64,
    #[serde(default)]
    pub max_concurrent: usize,
    #[serde(default)]
    pub per_account: bool,
}

impl Default for LimiterConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            global_min_interval_ms: default_global_min_interval_ms(),
            use_default_rules: default_enabled(),
            rules: Vec::new(),
        }
    }
}

fn default_enabled() -> bool {
    true
}

fn default_global_min_interval_ms() -> u64 {
    u64::try_from(DEFAULT_GLOBAL_MIN_INTERVAL.as_millis()).unwrap_or(u64::MAX)
}

impl From<&RuleConfig> for AdmissionRule {
    fn from(cfg: &RuleConfig) -> Self {
        AdmissionRule {
            method: cfg.method.clone(),
            path_prefix: cfg.path_prefix.clone(),
            min_interval: Duration::from_millis(cfg.min_interval_ms),
            max_concurrent: cfg.max_concurrent,
            per_account: cfg.per_account,
        }
    }
}

impl LimiterConfig {
    /// Parse configuration from a JSON string.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Load configuration from a JSON file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_json(&contents)
    }

    /// Rules this configuration resolves to, in table order.
    pub fn resolved_rules(&self) -> Vec<AdmissionRule> {
        let mut rules = if self.use_default_rules { default_rules() } else { Vec::new() };
        rules.extend(self.rules.iter().map(AdmissionRule::from));
        rules
    }

    /// Build the configured limiter, or `None` when disabled.
    pub fn build(&self) -> Option<RateLimiter> {
        if !self.enabled {
            return None;
        }
        Some(RateLimiter::new(
            self.resolved_rules(),
            Duration::from_millis(self.global_min_interval_ms),
        ))
    }
}
