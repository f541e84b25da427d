//! Out-of-band provisioning
//!
//! Two free-form configuration strings and a control byte come in from an
//! untrusted channel; a JSON status blob goes back out.

pub mod parser;
pub mod service;

pub use parser::{ControlOpcode, ParseError, MAX_PROVISIONING_PAYLOAD};
pub use service::{ControlOutcome, ProvisioningAdapter, StatusReport};
