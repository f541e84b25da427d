//! Configuration system for the uplink daemons
//!
//! Every section is optional; missing values fall back to the firmware
//! defaults below. Credentials and broker settings are NOT part of this file:
//! they arrive through provisioning and live in the persistent store.

use crate::network::backoff::ReconnectConfig;
use crate::network::topics::validate_device_id;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Smallest frame that can carry a status response
pub const MIN_RELAY_FRAME_BYTES: usize = 64;

/// Main uplink configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct UplinkConfig {
    #[serde(default)]
    pub device: DeviceSection,
    #[serde(default)]
    pub link: LinkSection,
    #[serde(default)]
    pub broker: BrokerSection,
    #[serde(default)]
    pub relay: RelaySection,
}

/// Which publish path this device runs. Exactly one is active per device.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum DeviceMode {
    /// Local radio plus broker client on this unit
    #[default]
    Direct,
    /// Everything delegated to the companion chip over the serial link
    Relay,
}

/// Device section
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DeviceSection {
    /// Device identifier (must match [a-zA-Z0-9._-]+)
    #[serde(default = "default_device_id")]
    pub id: String,
    #[serde(default)]
    pub mode: DeviceMode,
    /// Location of the durable key/value store
    #[serde(default = "default_store_path")]
    pub store_path: PathBuf,
    /// Period of the driver loop
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,
}

impl Default for DeviceSection {
    fn default() -> Self {
        Self {
            id: default_device_id(),
            mode: DeviceMode::default(),
            store_path: default_store_path(),
            tick_interval_ms: default_tick_interval_ms(),
        }
    }
}

fn default_device_id() -> String {
    "uplink-0001".to_string()
}

fn default_store_path() -> PathBuf {
    PathBuf::from("uplink-store.json")
}

fn default_tick_interval_ms() -> u64 {
    500 // 2Hz network task
}

/// Local-area link timing
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LinkSection {
    #[serde(default = "default_connection_timeout_ms")]
    pub connection_timeout_ms: u32,
    #[serde(default = "default_reconnect_interval_ms")]
    pub reconnect_interval_ms: u32,
    #[serde(default = "default_max_reconnect_interval_ms")]
    pub max_reconnect_interval_ms: u32,
    #[serde(default = "default_max_reconnect_attempts")]
    pub max_reconnect_attempts: u32,
}

impl Default for LinkSection {
    fn default() -> Self {
        Self {
            connection_timeout_ms: default_connection_timeout_ms(),
            reconnect_interval_ms: default_reconnect_interval_ms(),
            max_reconnect_interval_ms: default_max_reconnect_interval_ms(),
            max_reconnect_attempts: default_max_reconnect_attempts(),
        }
    }
}

impl LinkSection {
    pub fn reconnect_config(&self) -> ReconnectConfig {
        ReconnectConfig {
            base_interval_ms: self.reconnect_interval_ms,
            max_interval_ms: self.max_reconnect_interval_ms,
            max_attempts: Some(self.max_reconnect_attempts),
        }
    }
}

/// Broker timing and publish limits
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BrokerSection {
    #[serde(default = "default_connection_timeout_ms")]
    pub connection_timeout_ms: u32,
    #[serde(default = "default_reconnect_interval_ms")]
    pub reconnect_interval_ms: u32,
    #[serde(default = "default_max_reconnect_interval_ms")]
    pub max_reconnect_interval_ms: u32,
    #[serde(default = "default_keep_alive_secs")]
    pub keep_alive_secs: u16,
    /// Largest encoded record accepted for publishing
    #[serde(default = "default_max_payload_bytes")]
    pub max_payload_bytes: usize,
    #[serde(default = "default_topic_prefix")]
    pub topic_prefix: String,
}

impl Default for BrokerSection {
    fn default() -> Self {
        Self {
            connection_timeout_ms: default_connection_timeout_ms(),
            reconnect_interval_ms: default_reconnect_interval_ms(),
            max_reconnect_interval_ms: default_max_reconnect_interval_ms(),
            keep_alive_secs: default_keep_alive_secs(),
            max_payload_bytes: default_max_payload_bytes(),
            topic_prefix: default_topic_prefix(),
        }
    }
}

impl BrokerSection {
    /// Broker reconnects are unbounded while enabled
    pub fn reconnect_config(&self) -> ReconnectConfig {
        ReconnectConfig {
            base_interval_ms: self.reconnect_interval_ms,
            max_interval_ms: self.max_reconnect_interval_ms,
            max_attempts: None,
        }
    }
}

/// Companion-chip serial link
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RelaySection {
    #[serde(default = "default_relay_port")]
    pub port: String,
    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,
    #[serde(default = "default_status_interval_ms")]
    pub status_interval_ms: u32,
    #[serde(default = "default_max_frame_bytes")]
    pub max_frame_bytes: usize,
}

impl Default for RelaySection {
    fn default() -> Self {
        Self {
            port: default_relay_port(),
            baud_rate: default_baud_rate(),
            status_interval_ms: default_status_interval_ms(),
            max_frame_bytes: default_max_frame_bytes(),
        }
    }
}

fn default_connection_timeout_ms() -> u32 {
    10_000
}

fn default_reconnect_interval_ms() -> u32 {
    5_000
}

fn default_max_reconnect_interval_ms() -> u32 {
    30_000
}

fn default_max_reconnect_attempts() -> u32 {
    3
}

fn default_keep_alive_secs() -> u16 {
    60
}

fn default_max_payload_bytes() -> usize {
    512
}

fn default_topic_prefix() -> String {
    "records".to_string()
}

fn default_relay_port() -> String {
    "/dev/ttyUSB0".to_string()
}

fn default_baud_rate() -> u32 {
    115_200
}

fn default_status_interval_ms() -> u32 {
    10_000
}

fn default_max_frame_bytes() -> usize {
    768
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),
    #[error("Failed to parse TOML: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("Invalid device ID format: {0}")]
    InvalidDeviceId(String),
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl UplinkConfig {
    /// Load and validate configuration from a TOML file
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: UplinkConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Check cross-field consistency
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_device_id(&self.device.id)
            .map_err(|e| ConfigError::InvalidDeviceId(format!("'{}': {e}", self.device.id)))?;

        if self.device.tick_interval_ms == 0 {
            return Err(ConfigError::InvalidConfig(
                "device.tick_interval_ms must be greater than 0".to_string(),
            ));
        }

        self.link
            .reconnect_config()
            .validate()
            .map_err(|e| ConfigError::InvalidConfig(format!("[link] {e}")))?;
        self.broker
            .reconnect_config()
            .validate()
            .map_err(|e| ConfigError::InvalidConfig(format!("[broker] {e}")))?;

        if self.link.connection_timeout_ms == 0 || self.broker.connection_timeout_ms == 0 {
            return Err(ConfigError::InvalidConfig(
                "connection_timeout_ms must be greater than 0".to_string(),
            ));
        }

        if self.broker.max_payload_bytes == 0 {
            return Err(ConfigError::InvalidConfig(
                "broker.max_payload_bytes must be greater than 0".to_string(),
            ));
        }

        if self.broker.topic_prefix.is_empty() || self.broker.topic_prefix.contains(['+', '#']) {
            return Err(ConfigError::InvalidConfig(format!(
                "broker.topic_prefix '{}' must be non-empty and free of wildcards",
                self.broker.topic_prefix
            )));
        }

        if self.relay.max_frame_bytes < MIN_RELAY_FRAME_BYTES {
            return Err(ConfigError::InvalidConfig(format!(
                "relay.max_frame_bytes must be at least {MIN_RELAY_FRAME_BYTES}"
            )));
        }

        if self.relay.status_interval_ms == 0 {
            return Err(ConfigError::InvalidConfig(
                "relay.status_interval_ms must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    /// Create a test configuration for unit testing
    #[cfg(test)]
    pub fn test_config() -> Self {
        let toml_content = r#"
[device]
id = "test-device"
mode = "direct"
"#;
        Self::from_toml_str(toml_content).expect("Test config should parse")
    }
}
