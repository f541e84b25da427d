//! Radio adapter for hosts that are already on a network
//!
//! A workstation or single-board computer running the uplink has its network
//! link managed by the OS, so "associating" only validates credentials and
//! records that the link was requested. The address is the local interface
//! the OS would route outbound traffic through.

use crate::transport::{Radio, TransportError};
use std::net::UdpSocket;
use tracing::debug;

/// Address used only to pick the outbound interface. No packet is sent.
const ROUTE_PROBE: &str = "192.0.2.1:9";

#[derive(Debug, Default)]
pub struct HostRadio {
    associated: bool,
    identity: Option<String>,
}

impl HostRadio {
    pub fn new() -> Self {
        Self::default()
    }

    /// Identity from the last association request
    pub fn identity(&self) -> Option<&str> {
        self.identity.as_deref()
    }

    fn local_address() -> Option<String> {
        let socket = UdpSocket::bind("0.0.0.0:0").ok()?;
        socket.connect(ROUTE_PROBE).ok()?;
        socket.local_addr().ok().map(|addr| addr.ip().to_string())
    }
}

impl Radio for HostRadio {
    fn begin(&mut self, identity: &str, secret: &str) -> Result<(), TransportError> {
        if identity.is_empty() || secret.is_empty() {
            return Err(TransportError::Rejected("empty network credentials".into()));
        }
        debug!("Host network link requested for {}", identity);
        self.identity = Some(identity.to_string());
        self.associated = true;
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.associated
    }

    fn disconnect(&mut self, power_down: bool) {
        debug!("Host network link released (power_down={})", power_down);
        self.associated = false;
    }

    fn address(&self) -> Option<String> {
        if self.associated {
            Self::local_address()
        } else {
            None
        }
    }

    fn signal_strength(&self) -> i32 {
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_begin_requires_credentials() {
        let mut radio = HostRadio::new();
        assert!(radio.begin("", "secret").is_err());
        assert!(!radio.is_connected());

        radio.begin("workshop", "hunter22").unwrap();
        assert!(radio.is_connected());
        assert_eq!(radio.identity(), Some("workshop"));
    }

    #[test]
    fn test_disconnect_clears_association() {
        let mut radio = HostRadio::new();
        radio.begin("workshop", "hunter22").unwrap();
        radio.disconnect(true);
        assert!(!radio.is_connected());
        assert_eq!(radio.address(), None);
    }
}
