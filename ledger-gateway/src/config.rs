//! Configuration for the ledger gateway

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Ledger gateway configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Channel the chaincode is installed on
    pub channel: String,

    /// Chaincode name
    pub chaincode: String,

    /// Membership service provider of the client identity
    pub msp_id: String,

    /// Connection pool configuration
    pub gateway: GatewayConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            channel: "mychannel".to_string(),
            chaincode: "agricultural-contract".to_string(),
            msp_id: "Org1MSP".to_string(),
            gateway: GatewayConfig::default(),
        }
    }
}

/// Connection pool and round-trip deadlines
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Leases that may be held at once
    pub max_connections: usize,

    /// Wait for a free lease (milliseconds)
    pub acquire_timeout_ms: u64,

    /// Deadline for a submit round trip (milliseconds)
    pub submit_timeout_ms: u64,

    /// Deadline for an evaluate round trip (milliseconds)
    pub evaluate_timeout_ms: u64,

    /// Commit mailbox capacity of the reference ledger
    pub commit_mailbox_capacity: usize,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            max_connections: 16,
            acquire_timeout_ms: 5_000,      // 5 seconds
            submit_timeout_ms: 30_000,      // Fabric default commit timeout
            evaluate_timeout_ms: 10_000,    // 10 seconds
            commit_mailbox_capacity: 1000,
        }
    }
}

impl GatewayConfig {
    /// Acquire timeout
    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_millis(self.acquire_timeout_ms)
    }

    /// Submit deadline
    pub fn submit_timeout(&self) -> Duration {
        Duration::from_millis(self.submit_timeout_ms)
    }

    /// Evaluate deadline
    pub fn evaluate_timeout(&self) -> Duration {
        Duration::from_millis(self.evaluate_timeout_ms)
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
        let mut config = Config::default();

        if let Ok(channel) = std::env::var("LEDGER_CHANNEL") {
            config.channel = channel;
        }

        if let Ok(chaincode) = std::env::var("LEDGER_CHAINCODE") {
            config.chaincode = chaincode;
        }

        if let Ok(msp_id) = std::env::var("LEDGER_MSP_ID") {
            config.msp_id = msp_id;
        }

        if let Ok(value) = std::env::var("LEDGER_MAX_CONNECTIONS") {
            config.gateway.max_connections = parse_env("LEDGER_MAX_CONNECTIONS", &value)?;
        }

        if let Ok(value) = std::env::var("LEDGER_SUBMIT_TIMEOUT_MS") {
            config.gateway.submit_timeout_ms = parse_env("LEDGER_SUBMIT_TIMEOUT_MS", &value)?;
        }

        if let Ok(value) = std::env::var("LEDGER_EVALUATE_TIMEOUT_MS") {
            config.gateway.evaluate_timeout_ms =
                parse_env("LEDGER_EVALUATE_TIMEOUT_MS", &value)?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Reject values the pool cannot run with
    pub fn validate(&self) -> crate::Result<()> {
        if self.gateway.max_connections == 0 {
            return Err(crate::Error::Config(
                "gateway.max_connections must be at least 1".to_string(),
            ));
        }
        if self.gateway.submit_timeout_ms == 0 || self.gateway.evaluate_timeout_ms == 0 {
            return Err(crate::Error::Config(
                "gateway timeouts must be non-zero".to_string(),
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
