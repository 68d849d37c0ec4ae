//! Configuration for the custody engine

use crate::retry::RetryConfig;
use ledger_gateway::RecallSeverity;
use serde::{Deserialize, Serialize};

/// Custody engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Service name
    pub service_name: String,

    /// Service version
    pub service_version: String,

    /// Ledger connection configuration
    pub ledger: ledger_gateway::Config,

    /// Conflict retry budget
    pub retry: RetryConfig,

    /// Mirror write handling
    pub mirror: MirrorConfig,

    /// Recall handling
    pub recall: RecallConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            service_name: "custody-engine".to_string(),
            service_version: env!("CARGO_PKG_VERSION").to_string(),
            ledger: ledger_gateway::Config::default(),
            retry: RetryConfig::default(),
            mirror: MirrorConfig::default(),
            recall: RecallConfig::default(),
        }
    }
}

/// Mirror write handling
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MirrorConfig {
    /// Keep failed mirror writes for reconciliation
    pub queue_warnings: bool,

    /// Oldest warnings are dropped beyond this many
    pub max_pending_warnings: usize,
}

impl Default for MirrorConfig {
    fn default() -> Self {
        Self {
            queue_warnings: true,
            max_pending_warnings: 10_000,
        }
    }
}

/// Recall handling
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecallConfig {
    /// Severity when the caller gives none
    pub default_severity: RecallSeverity,

    /// Split generations followed below the recalled batch
    pub max_cascade_depth: usize,
}

impl Default for RecallConfig {
    fn default() -> Self {
        Self {
            default_severity: RecallSeverity::High,
            max_cascade_depth: 64,
        }
    }
}

impl Config {
    /// Load from file
    pub fn from_file(path: impl AsRef<std::path::Path>) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| crate::Error::Config(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from environment variables
    pub fn from_env() -> crate::Result<Self> {
        let mut config = Config {
            ledger: ledger_gateway::Config::from_env()
                .map_err(|e| crate::Error::Config(e.to_string()))?,
            ..Config::default()
        };

        if let Ok(name) = std::env::var("CUSTODY_SERVICE_NAME") {
            config.service_name = name;
        }

        if let Ok(value) = std::env::var("CUSTODY_RETRY_MAX_ATTEMPTS") {
            config.retry.max_attempts = parse_env("CUSTODY_RETRY_MAX_ATTEMPTS", &value)?;
        }

        if let Ok(value) = std::env::var("CUSTODY_RETRY_INITIAL_DELAY_MS") {
            config.retry.initial_delay_ms = parse_env("CUSTODY_RETRY_INITIAL_DELAY_MS", &value)?;
        }

        if let Ok(value) = std::env::var("CUSTODY_RETRY_MAX_DELAY_MS") {
            config.retry.max_delay_ms = parse_env("CUSTODY_RETRY_MAX_DELAY_MS", &value)?;
        }

        if let Ok(value) = std::env::var("CUSTODY_MIRROR_QUEUE_WARNINGS") {
            config.mirror.queue_warnings = parse_env("CUSTODY_MIRROR_QUEUE_WARNINGS", &value)?;
        }

        if let Ok(value) = std::env::var("CUSTODY_RECALL_MAX_CASCADE_DEPTH") {
            config.recall.max_cascade_depth =
                parse_env("CUSTODY_RECALL_MAX_CASCADE_DEPTH", &value)?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Reject values the engine cannot run with
    pub fn validate(&self) -> crate::Result<()> {
        self.ledger
            .validate()
            .map_err(|e| crate::Error::Config(e.to_string()))?;
        self.retry.validate()?;
        if self.recall.max_cascade_depth == 0 {
            return Err(crate::Error::Config(
                "recall.max_cascade_depth must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

fn parse_env<T: std::str::FromStr>(name: &str, value: &str) -> crate::Result<T> {
    value
        .parse()
        .map_err(|_| crate::Error::Config(format!("{name} has invalid value {value:?}")))
}
