//! Testing utilities and mock implementations
//!
//! Scriptable stand-ins for the radio, broker client, relay link and clock so
//! the managers can be driven tick by tick without hardware or a broker.

pub mod mocks;

pub use mocks::*;
