//! Uplink - telemetry uplink for embedded controllers
//!
//! Delivers telemetry records from a device to a publish/subscribe broker
//! over an unreliable wireless link.
//!
//! # Overview
//!
//! - Link connection management with bounded exponential backoff
//! - Broker session management with a bounded retry queue
//! - A newline-delimited JSON relay protocol for delegating all network work
//!   to a companion chip over a serial link
//! - Provisioning of credentials and broker settings from short text payloads
//!
//! Everything is driven from a periodic `tick()`; no operation blocks.
//!
//! # Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//! use uplink::testing::{ManualClock, MockBrokerClient, MockRadio};
//! use uplink::{DirectUplinkBuilder, JsonRecord, MemoryStore, PublishResult, Uplink, UplinkConfig};
//!
//! let radio = MockRadio::new();
//! let client = MockBrokerClient::new();
//! let clock = ManualClock::new(0);
//! let store = MemoryStore::shared();
//!
//! let mut uplink = DirectUplinkBuilder::new(
//!     UplinkConfig::default(),
//!     radio.clone(),
//!     client.clone(),
//!     store,
//!     clock.clone(),
//! )
//! .init();
//!
//! uplink.link_mut().set_credentials("MyNet", "secret").unwrap();
//! uplink.link_mut().enable();
//! radio.set_connected(true);
//! uplink.tick();
//! assert!(uplink.connectivity().link_connected);
//!
//! uplink
//!     .broker_mut()
//!     .set_broker_config("broker.local", 1883, None, None)
//!     .unwrap();
//! uplink.broker_mut().enable(true);
//!
//! // The broker session is still opening, so the record waits in the retry queue
//! let record = JsonRecord::new(7).with_field("temp_c", 21.5);
//! assert_eq!(uplink.publish(&record), PublishResult::Queued);
//!
//! client.set_connected(true);
//! uplink.tick();
//! assert!(uplink.is_online());
//! assert_eq!(uplink.broker().pending_count(), 0);
//! ```

pub mod clock;
pub mod config;
pub mod error;
pub mod network;
pub mod observability;
pub mod provisioning;
pub mod record;
pub mod relay;
pub mod storage;
pub mod testing;
pub mod transport;
pub mod uplink;

pub use clock::{Clock, SystemClock};
pub use config::{ConfigError, DeviceMode, UplinkConfig};
pub use error::{UplinkError, UplinkResult};
pub use network::{BrokerManager, ConnectionStatus, LinkManager, PublishResult, RetryQueue};
pub use provisioning::ProvisioningAdapter;
pub use record::{JsonRecord, Record};
pub use relay::{RelayBridge, RelayGateway};
pub use storage::{FileStore, KeyValueStore, MemoryStore, SharedStore};
pub use transport::{BrokerClient, Radio, TransportError};
pub use uplink::{Connectivity, DirectUplink, DirectUplinkBuilder, Uplink};
