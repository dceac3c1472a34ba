//! Application configuration
//!
//! This module provides centralized configuration management using the `config` crate.
//! Configuration can be loaded from environment variables and config files.

use crate::models::BalanceType;
use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::env;

/// Main application configuration
#[derive(Debug, Deserialize, Clone, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Charging engine configuration
#[derive(Debug, Deserialize, Clone)]
pub struct EngineConfig {
    /// Decimals kept on balance values and factor-divided unit amounts
    #[serde(default = "default_rounding_decimals")]
    pub rounding_decimals: u32,

    /// Drop expired balances during cleanup
    #[serde(default = "default_remove_expired")]
    pub remove_expired: bool,

    /// Zero-rating subject used by voice balances without a rating subject
    #[serde(default = "default_voice_rating_subject")]
    pub voice_rating_subject: String,

    /// Zero-rating subject used by every other unit balance without a rating subject
    #[serde(default = "default_rating_subject")]
    pub default_rating_subject: String,

    /// Shortest dialed-number prefix considered by destination matching
    #[serde(default = "default_min_prefix_match")]
    pub min_prefix_match: usize,

    /// Attempts at locking a stable set of accounts for one debit
    #[serde(default = "default_max_lock_attempts")]
    pub max_lock_attempts: u32,
}

fn default_rounding_decimals() -> u32 {
    6
}

fn default_remove_expired() -> bool {
    true
}

fn default_voice_rating_subject() -> String {
    BalanceType::Voice.default_rating_subject().to_string()
}

fn default_rating_subject() -> String {
    BalanceType::Generic.default_rating_subject().to_string()
}

fn default_min_prefix_match() -> usize {
    1
}

fn default_max_lock_attempts() -> u32 {
    5
}

impl EngineConfig {
    /// Rating subject applied to a unit balance of `tor` that names none
    pub fn balance_rating_subject(&self, tor: BalanceType) -> &str {
        match tor {
            BalanceType::Voice => &self.voice_rating_subject,
            _ => &self.default_rating_subject,
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            rounding_decimals: default_rounding_decimals(),
            remove_expired: default_remove_expired(),
            voice_rating_subject: default_voice_rating_subject(),
            default_rating_subject: default_rating_subject(),
            min_prefix_match: default_min_prefix_match(),
            max_lock_attempts: default_max_lock_attempts(),
        }
    }
}

/// Log output configuration
#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    /// Default filter directive when RUST_LOG is unset
    #[serde(default = "default_log_level")]
    pub level: String,

    /// `pretty` or `json`
    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl AppConfig {
    /// Load configuration from environment and optional config files
    pub fn load() -> Result<Self, ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".to_string());

        let config = Config::builder()
            .set_default("engine.rounding_decimals", 6)?
            .set_default("engine.remove_expired", true)?
            .set_default("engine.voice_rating_subject", default_voice_rating_subject())?
            .set_default("engine.default_rating_subject", default_rating_subject())?
            .set_default("engine.min_prefix_match", 1)?
            .set_default("engine.max_lock_attempts", 5)?
            .set_default("logging.level", "info")?
            .set_default("logging.format", "pretty")?
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", run_mode)).required(false))
            .add_source(
                Environment::with_prefix("OCS")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }

    /// Load configuration from a specific file
    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        let config = Config::builder()
            .add_source(File::with_name(path))
            .add_source(Environment::with_prefix("OCS").separator("__"))
            .build()?;

        config.try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_engine_config() {
        let config = EngineConfig::default();
        assert_eq!(config.rounding_decimals, 6);
        assert!(config.remove_expired);
        assert_eq!(config.balance_rating_subject(BalanceType::Voice), "*zero1s");
        assert_eq!(config.balance_rating_subject(BalanceType::Sms), "*zero1ns");
    }

    #[test]
    fn test_partial_config_fills_defaults() {
        let config: AppConfig = Config::builder()
            .set_override("engine.rounding_decimals", 4)
            .and_then(|b| b.build())
            .and_then(|c| c.try_deserialize())
            .expect("config should deserialize");
        assert_eq!(config.engine.rounding_decimals, 4);
        assert_eq!(config.engine.max_lock_attempts, 5);
        assert_eq!(config.logging.level, "info");
    }
}
