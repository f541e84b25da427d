//! Hardware seams for the local radio and the broker client
//!
//! These traits are the black-box primitives the managers drive. They are
//! injected at construction so tests can substitute the mocks in
//! [`crate::testing::mocks`] and host builds can use the adapters below.

pub mod host_radio;
pub mod mqtt;

pub use host_radio::HostRadio;
pub use mqtt::MqttBrokerClient;

use thiserror::Error;

/// Transport-level failures reported by the primitives
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Transport unavailable: {0}")]
    Unavailable(String),
    #[error("Transport rejected request: {0}")]
    Rejected(String),
    #[error("Transport I/O failed: {0}")]
    Io(#[from] std::io::Error),
}

/// Local-area radio
pub trait Radio {
    /// Start an association attempt. Completion is observed via `is_connected`.
    fn begin(&mut self, identity: &str, secret: &str) -> Result<(), TransportError>;

    fn is_connected(&self) -> bool;

    /// Drop the association; `power_down` also switches the radio off
    fn disconnect(&mut self, power_down: bool);

    /// Local address, if associated
    fn address(&self) -> Option<String>;

    /// Signal strength in dBm
    fn signal_strength(&self) -> i32;
}

/// Last-will registration requested at connect time
#[derive(Debug, Clone, PartialEq)]
pub struct LastWill {
    pub topic: String,
    pub payload: String,
    pub retain: bool,
}

/// Everything the broker client needs to open a session
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectOptions {
    pub client_id: String,
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    pub keep_alive_secs: u16,
    pub last_will: LastWill,
}

/// Message broker client
pub trait BrokerClient {
    /// Start a session. Completion is observed via `is_connected`.
    fn begin_connection(&mut self, options: &ConnectOptions) -> Result<(), TransportError>;

    fn is_connected(&self) -> bool;

    fn disconnect(&mut self);

    /// Hand a message to the client for delivery
    fn publish(&mut self, topic: &str, payload: &[u8], retain: bool)
        -> Result<(), TransportError>;
}
