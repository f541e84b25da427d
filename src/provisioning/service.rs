//! Applies provisioning writes to the managers and reports their state

use super::parser::{
    decode_payload, parse_broker_config, parse_control, parse_credentials, ControlOpcode,
};
use crate::clock::Clock;
use crate::error::{UplinkError, UplinkResult};
use crate::network::{BrokerManager, ConnectionStatus, LinkManager};
use crate::transport::{BrokerClient, Radio};
use serde::Serialize;
use tracing::{info, warn};

/// Result of a control write
#[derive(Debug, Clone, PartialEq)]
pub enum ControlOutcome {
    Applied,
    ConnectionTest { accepted: bool },
    /// Status blob, also readable through [`ProvisioningAdapter::read_status`]
    Status(String),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LinkReport {
    pub enabled: bool,
    pub connected: bool,
    pub has_credentials: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub identity: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signal_strength: Option<i32>,
    pub status: ConnectionStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BrokerReport {
    pub enabled: bool,
    pub connected: bool,
    pub has_config: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    pub pending_publishes: usize,
    pub status: ConnectionStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusReport {
    pub link: LinkReport,
    pub broker: BrokerReport,
}

/// The only validated entry point for provisioning input
pub struct ProvisioningAdapter<'a, R, B, C> {
    link: &'a mut LinkManager<R, C>,
    broker: &'a mut BrokerManager<B, C>,
}

impl<'a, R: Radio, B: BrokerClient, C: Clock> ProvisioningAdapter<'a, R, B, C> {
    pub fn new(link: &'a mut LinkManager<R, C>, broker: &'a mut BrokerManager<B, C>) -> Self {
        Self { link, broker }
    }

    /// Apply an `identity|secret` write
    pub fn write_credentials(&mut self, raw: &[u8]) -> UplinkResult<()> {
        let parsed = decode_payload(raw).and_then(parse_credentials).map_err(|e| {
            warn!("Rejected credentials write: {}", e);
            UplinkError::from(e)
        })?;
        self.link.set_credentials(&parsed.identity, &parsed.secret)
    }

    /// Apply a `host:port|username|password` write
    pub fn write_broker_config(&mut self, raw: &[u8]) -> UplinkResult<()> {
        let parsed = decode_payload(raw).and_then(parse_broker_config).map_err(|e| {
            warn!("Rejected broker config write: {}", e);
            UplinkError::from(e)
        })?;
        self.broker.set_broker_config(
            &parsed.host,
            parsed.port,
            parsed.username.as_deref(),
            parsed.password.as_deref(),
        )
    }

    /// Execute a one-byte control command
    pub fn control(&mut self, raw: &[u8]) -> UplinkResult<ControlOutcome> {
        let opcode = parse_control(raw).map_err(|e| {
            warn!("Rejected control write: {}", e);
            UplinkError::from(e)
        })?;
        info!("Provisioning control: {:?}", opcode);

        let outcome = match opcode {
            ControlOpcode::EnableLink => {
                self.link.enable();
                ControlOutcome::Applied
            }
            ControlOpcode::DisableLink => {
                self.link.disable();
                ControlOutcome::Applied
            }
            ControlOpcode::EnableBroker => {
                let link_up = self.link.is_connected();
                self.broker.enable(link_up);
                ControlOutcome::Applied
            }
            ControlOpcode::DisableBroker => {
                self.broker.disable();
                ControlOutcome::Applied
            }
            ControlOpcode::TestConnection => ControlOutcome::ConnectionTest {
                accepted: self.broker.test_connection(),
            },
            ControlOpcode::GetStatus => ControlOutcome::Status(self.status_json()?),
        };
        Ok(outcome)
    }

    pub fn status(&self) -> StatusReport {
        let link_connected = self.link.is_connected();
        let link = LinkReport {
            enabled: self.link.is_enabled(),
            connected: link_connected,
            has_credentials: self.link.has_credentials(),
            identity: self.link.identity().map(str::to_string),
            address: self.link.address(),
            signal_strength: link_connected.then(|| self.link.signal_strength()),
            status: self.link.status(),
        };

        let broker = BrokerReport {
            enabled: self.broker.is_enabled(),
            connected: self.broker.is_connected(),
            has_config: self.broker.is_configured(),
            host: self.broker.host().map(str::to_string),
            port: self.broker.port(),
            pending_publishes: self.broker.pending_count(),
            status: self.broker.status(),
        };

        StatusReport { link, broker }
    }

    pub fn status_json(&self) -> UplinkResult<String> {
        serde_json::to_string(&self.status())
            .map_err(|e| UplinkError::not_ready(format!("status encoding failed: {e}")))
    }

    /// Copy the status blob into `out`, truncating to fit; returns bytes written
    pub fn read_status(&self, out: &mut [u8]) -> usize {
        match self.status_json() {
            Ok(json) => {
                let len = json.len().min(out.len());
                out[..len].copy_from_slice(&json.as_bytes()[..len]);
                len
            }
            Err(e) => {
                warn!("Status read failed: {}", e);
                0
            }
        }
    }
}
