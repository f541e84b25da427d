//! Topic construction and device id validation

use thiserror::Error;

/// Device id validation errors
#[derive(Debug, Error, PartialEq)]
pub enum DeviceIdError {
    #[error("Device ID cannot be empty")]
    Empty,
    #[error("Device ID contains invalid character: '{0}'")]
    InvalidChar(char),
}

/// Validate a device id: `[a-zA-Z0-9._-]+`
///
/// The id is embedded in every topic and used as the client id, so MQTT
/// wildcards and separators must never appear in it.
pub fn validate_device_id(device_id: &str) -> Result<(), DeviceIdError> {
    if device_id.is_empty() {
        return Err(DeviceIdError::Empty);
    }

    for ch in device_id.chars() {
        if !ch.is_ascii_alphanumeric() && ch != '.' && ch != '_' && ch != '-' {
            return Err(DeviceIdError::InvalidChar(ch));
        }
    }

    Ok(())
}

/// Builds the topics a device publishes on
#[derive(Debug, Clone, PartialEq)]
pub struct TopicBuilder {
    prefix: String,
    device_id: String,
}

impl TopicBuilder {
    pub fn new(prefix: impl Into<String>, device_id: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            device_id: device_id.into(),
        }
    }

    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    /// Build record topic: `{prefix}/{device_id}/items/{item_id}`
    pub fn item_topic(&self, item_id: u32) -> String {
        format!("{}/{}/items/{item_id}", self.prefix, self.device_id)
    }

    /// Build presence topic: `{prefix}/{device_id}/status`
    pub fn presence_topic(&self) -> String {
        format!("{}/{}/status", self.prefix, self.device_id)
    }
}
