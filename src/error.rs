//! Error taxonomy for the uplink subsystem
//!
//! Every failure path in this crate resolves to one of these variants and
//! returns to a well-defined state; nothing here is allowed to halt the
//! periodic driver.

use crate::config::ConfigError;
use crate::storage::StoreError;
use crate::transport::TransportError;
use thiserror::Error;

/// Main error type for uplink operations
#[derive(Debug, Error)]
pub enum UplinkError {
    /// Bad or missing credentials / broker configuration, rejected at the setter
    #[error("Invalid configuration: {message}")]
    ConfigInvalid { message: String },

    /// Operation attempted against a disabled or unconfigured component
    #[error("Not ready: {message}")]
    NotReady { message: String },

    /// Connect timeout, link drop, or a refused hand-off to the transport
    #[error("Transient connectivity failure: {message}")]
    TransientConnectivity { message: String },

    #[error("Payload too large: {size} bytes exceeds maximum {max}")]
    PayloadTooLarge { size: usize, max: usize },

    #[error("Malformed frame: {message}")]
    FrameMalformed { message: String },

    /// Retry queue full; the record was dropped rather than queued
    #[error("Retry queue exhausted (capacity {capacity})")]
    QueueExhausted { capacity: usize },

    #[error("Storage error: {0}")]
    Storage(#[from] StoreError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),
}

impl UplinkError {
    /// Create invalid configuration error
    pub fn config_invalid<S: Into<String>>(message: S) -> Self {
        Self::ConfigInvalid {
            message: message.into(),
        }
    }

    /// Create not-ready error
    pub fn not_ready<S: Into<String>>(message: S) -> Self {
        Self::NotReady {
            message: message.into(),
        }
    }

    /// Create transient connectivity error
    pub fn transient<S: Into<String>>(message: S) -> Self {
        Self::TransientConnectivity {
            message: message.into(),
        }
    }

    /// Create payload-too-large error
    pub fn payload_too_large(size: usize, max: usize) -> Self {
        Self::PayloadTooLarge { size, max }
    }

    /// Create malformed frame error
    pub fn frame_malformed<S: Into<String>>(message: S) -> Self {
        Self::FrameMalformed {
            message: message.into(),
        }
    }

    /// Create queue exhausted error
    pub fn queue_exhausted(capacity: usize) -> Self {
        Self::QueueExhausted { capacity }
    }

    /// Stable label for structured logs
    pub fn kind(&self) -> &'static str {
        match self {
            UplinkError::ConfigInvalid { .. } => "config_invalid",
            UplinkError::NotReady { .. } => "not_ready",
            UplinkError::TransientConnectivity { .. } => "transient_connectivity",
            UplinkError::PayloadTooLarge { .. } => "payload_too_large",
            UplinkError::FrameMalformed { .. } => "frame_malformed",
            UplinkError::QueueExhausted { .. } => "queue_exhausted",
            UplinkError::Storage(_) => "storage",
            UplinkError::Config(_) => "config",
            UplinkError::Transport(_) => "transport",
        }
    }
}

/// Result type for uplink operations
pub type UplinkResult<T> = Result<T, UplinkError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_invalid_constructor() {
        let error = UplinkError::config_invalid("identity too long");
        assert!(matches!(error, UplinkError::ConfigInvalid { .. }));
        assert_eq!(error.to_string(), "Invalid configuration: identity too long");
    }

    #[test]
    fn test_not_ready_constructor() {
        let error = UplinkError::not_ready("broker disabled");
        assert!(matches!(error, UplinkError::NotReady { .. }));
        assert_eq!(error.to_string(), "Not ready: broker disabled");
    }

    #[test]
    fn test_payload_too_large_display() {
        let error = UplinkError::payload_too_large(900, 512);
        assert!(error.to_string().contains("900"));
        assert!(error.to_string().contains("512"));
    }

    #[test]
    fn test_queue_exhausted_display() {
        let error = UplinkError::queue_exhausted(10);
        assert_eq!(error.to_string(), "Retry queue exhausted (capacity 10)");
    }

    #[test]
    fn test_kind_labels() {
        assert_eq!(UplinkError::transient("x").kind(), "transient_connectivity");
        assert_eq!(UplinkError::frame_malformed("x").kind(), "frame_malformed");
        assert_eq!(UplinkError::queue_exhausted(1).kind(), "queue_exhausted");
        assert_eq!(
            UplinkError::from(TransportError::Unavailable("radio off".to_string())).kind(),
            "transport"
        );
    }
}
