//! Companion-chip relay path
//!
//! When the main unit cannot use its own radio, all network work is delegated
//! to a companion microcontroller over a point-to-point serial link carrying
//! newline-delimited JSON frames.
//!
//! - [`bridge`] - main-unit side, implements [`crate::uplink::Uplink`]
//! - [`gateway`] - companion side, runs its own link and broker managers
//! - [`frame`] - wire frames and the bounded line assembler
//! - [`serial`] - byte transport seam and the serial-port adapter
//! - [`console`] - companion configuration console

pub mod bridge;
pub mod console;
pub mod frame;
pub mod gateway;
pub mod serial;

pub use bridge::RelayBridge;
pub use frame::{InboundFrame, LineAccumulator, RelayCommand, RelayStatusFrame};
pub use gateway::RelayGateway;
pub use serial::{open_serial, RelayTransport, StreamTransport};
