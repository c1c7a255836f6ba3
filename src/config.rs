//! Pipeline configuration
//!
//! Defaults suit an interactive session. Every field can be overridden from
//! the environment (the binary loads `.env` first).

use crate::error::{QueryPilotError, Result};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

pub const ENV_MAX_REPAIR_ATTEMPTS: &str = "QUERYPILOT_MAX_REPAIR_ATTEMPTS";
pub const ENV_HISTORY_CAPACITY: &str = "QUERYPILOT_HISTORY_CAPACITY";
pub const ENV_RULE_CONFIDENCE: &str = "QUERYPILOT_RULE_CONFIDENCE";
pub const ENV_LEARNING: &str = "QUERYPILOT_LEARNING";
pub const ENV_EXECUTION_TIMEOUT_MS: &str = "QUERYPILOT_EXECUTION_TIMEOUT_MS";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Repair attempts allowed after the first execution failure
    pub max_repair_attempts: u8,
    /// Ring buffer size of the correction history
    pub history_capacity: usize,
    /// Intent confidence used when no semantic scorer is available
    pub rule_confidence: f64,
    /// Whether the learning strategy may replay past corrections
    pub learning_enabled: bool,
    /// Deadline handed to the SQLite executor
    pub execution_timeout_ms: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_repair_attempts: 3,
            history_capacity: 1000,
            rule_confidence: 0.6,
            learning_enabled: true,
            execution_timeout_ms: 5_000,
        }
    }
}

impl PipelineConfig {
    /// Defaults overlaid with any `QUERYPILOT_*` environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) but reads from an arbitrary source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(raw) = lookup(ENV_MAX_REPAIR_ATTEMPTS) {
            config.max_repair_attempts = parse_var(ENV_MAX_REPAIR_ATTEMPTS, &raw)?;
        }
        if let Some(raw) = lookup(ENV_HISTORY_CAPACITY) {
            config.history_capacity = parse_var(ENV_HISTORY_CAPACITY, &raw)?;
        }
        if let Some(raw) = lookup(ENV_RULE_CONFIDENCE) {
            config.rule_confidence = parse_var(ENV_RULE_CONFIDENCE, &raw)?;
        }
        if let Some(raw) = lookup(ENV_LEARNING) {
            config.learning_enabled = parse_flag(ENV_LEARNING, &raw)?;
        }
        if let Some(raw) = lookup(ENV_EXECUTION_TIMEOUT_MS) {
            config.execution_timeout_ms = parse_var(ENV_EXECUTION_TIMEOUT_MS, &raw)?;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.history_capacity == 0 {
            return Err(QueryPilotError::Config(
                "history capacity must be at least 1".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.rule_confidence) {
            return Err(QueryPilotError::Config(format!(
                "rule confidence must be within [0, 1], got {}",
                self.rule_confidence
            )));
        }
        Ok(())
    }
}

fn parse_var<T: FromStr>(key: &str, raw: &str) -> Result<T> {
    raw.trim()
        .parse::<T>()
        .map_err(|_| QueryPilotError::Config(format!("invalid value for {}: '{}'", key, raw)))
}

fn parse_flag(key: &str, raw: &str) -> Result<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(QueryPilotError::Config(format!(
            "invalid value for {}: '{}'",
            key, raw
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_without_overrides() {
        let config = PipelineConfig::from_lookup(|_| None).unwrap();
        assert_eq!(config, PipelineConfig::default());
        assert_eq!(config.max_repair_attempts, 3);
    }

    #[test]
    fn test_overrides_are_applied() {
        let config = PipelineConfig::from_lookup(lookup_from(&[
            (ENV_MAX_REPAIR_ATTEMPTS, "5"),
            (ENV_HISTORY_CAPACITY, "16"),
            (ENV_LEARNING, "off"),
        ]))
        .unwrap();
        assert_eq!(config.max_repair_attempts, 5);
        assert_eq!(config.history_capacity, 16);
        assert!(!config.learning_enabled);
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        assert!(PipelineConfig::from_lookup(lookup_from(&[(ENV_MAX_REPAIR_ATTEMPTS, "many")])).is_err());
        assert!(PipelineConfig::from_lookup(lookup_from(&[(ENV_HISTORY_CAPACITY, "0")])).is_err());
        assert!(PipelineConfig::from_lookup(lookup_from(&[(ENV_RULE_CONFIDENCE, "1.5")])).is_err());
    }
}
