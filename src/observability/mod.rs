//! Observability: structured logging via `tracing`

pub mod logging;

pub use logging::{init_default_logging, init_logging, parse_level, LogFormat};
pub use logging::{relay_span, tick_span};
