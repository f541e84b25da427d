//! rumqttc-backed broker client
//!
//! The module is split the same way the connection logic is split elsewhere
//! in the crate: pure decisions in one place, I/O in another.
//!
//! - [`message_handler`] - Pure mapping of rumqttc events to session changes
//! - [`client`] - The `BrokerClient` implementation and its event-loop task
//!
//! # Usage
//!
//! ```rust,no_run
//! use uplink::transport::{BrokerClient, ConnectOptions, LastWill, MqttBrokerClient};
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), uplink::transport::TransportError> {
//! let mut client = MqttBrokerClient::new(tokio::runtime::Handle::current());
//! let options = ConnectOptions {
//!     client_id: "esp32-00a1b2c3".to_string(),
//!     host: "broker.local".to_string(),
//!     port: 1883,
//!     username: None,
//!     password: None,
//!     keep_alive_secs: 60,
//!     last_will: LastWill {
//!         topic: "records/esp32-00a1b2c3/status".to_string(),
//!         payload: "offline".to_string(),
//!         retain: true,
//!     },
//! };
//! client.begin_connection(&options)?;
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod message_handler;

pub use client::{configure_mqtt_options, MqttBrokerClient};
pub use message_handler::{route_mqtt_event, SessionEvent};
