//! Companion side of the relay path
//!
//! The gateway owns the radio and the broker session. It executes `pub` and
//! `status` frames from the main unit, answers status queries, and pushes an
//! unsolicited status frame whenever link or broker connectivity flips.

use crate::clock::Clock;
use crate::config::RelaySection;
use crate::network::PublishResult;
use crate::relay::console::{parse_console_line, ConsoleCommand, HELP_LINES};
use crate::relay::frame::{
    encode_frame, parse_frame, InboundFrame, LineAccumulator, RelayCommand, RelayStatusFrame,
};
use crate::relay::serial::RelayTransport;
use crate::storage::SharedStore;
use crate::transport::{BrokerClient, Radio};
use crate::uplink::{DirectUplink, Uplink};
use serde_json::Value;
use tracing::{debug, error, info, warn};

const READ_CHUNK: usize = 64;
const MAX_READ_PER_TICK: usize = 4096;

pub struct RelayGateway<T, R, B, C> {
    transport: T,
    uplink: DirectUplink<R, B, C>,
    store: SharedStore,
    accumulator: LineAccumulator,
    max_frame_bytes: usize,
    reported: (bool, bool),
}

impl<T, R, B, C> RelayGateway<T, R, B, C>
where
    T: RelayTransport,
    R: Radio,
    B: BrokerClient,
    C: Clock,
{
    pub fn new(
        transport: T,
        uplink: DirectUplink<R, B, C>,
        store: SharedStore,
        settings: &RelaySection,
    ) -> Self {
        Self {
            transport,
            uplink,
            store,
            accumulator: LineAccumulator::new(settings.max_frame_bytes),
            max_frame_bytes: settings.max_frame_bytes,
            reported: (false, false),
        }
    }

    /// Serve pending frames, advance the managers, report connectivity flips
    pub fn tick(&mut self) {
        self.pump_input();
        self.uplink.tick();

        let current = self.connectivity_pair();
        if current != self.reported {
            info!(
                "Gateway connectivity changed: link={}, broker={}",
                current.0, current.1
            );
            self.send_status();
        }
    }

    fn connectivity_pair(&self) -> (bool, bool) {
        let connectivity = self.uplink.connectivity();
        (connectivity.link_connected, connectivity.broker_connected)
    }

    fn pump_input(&mut self) {
        let mut buf = [0u8; READ_CHUNK];
        let mut total = 0;
        while total < MAX_READ_PER_TICK {
            let n = match self.transport.read_available(&mut buf) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) => {
                    warn!("Relay read failed: {}", e);
                    break;
                }
            };
            total += n;
            for line in self.accumulator.extend(&buf[..n]) {
                self.handle_line(&line);
            }
        }
    }

    /// Handle one frame from the main unit
    pub fn handle_line(&mut self, line: &str) {
        debug!("Relay frame: {}", line);
        match parse_frame(line) {
            Ok(InboundFrame::Command(RelayCommand::Publish { data })) => {
                self.publish_data(&data);
            }
            Ok(InboundFrame::Command(RelayCommand::StatusQuery)) => self.send_status(),
            Ok(InboundFrame::Status(_)) | Ok(InboundFrame::Ignored) => {}
            Err(e) => warn!("Dropping relay frame: {}", e),
        }
    }

    /// Publish a record object on the topic derived from its `item_id`
    pub fn publish_data(&mut self, data: &Value) -> PublishResult {
        let id = data
            .get("item_id")
            .and_then(Value::as_u64)
            .and_then(|id| u32::try_from(id).ok())
            .unwrap_or(0);

        let payload = match serde_json::to_vec(data) {
            Ok(payload) => payload,
            Err(e) => {
                warn!("Relayed record {} not encodable: {}", id, e);
                return PublishResult::Dropped;
            }
        };

        let broker = self.uplink.broker_mut();
        let topic = broker.topics().item_topic(id);
        let result = broker.publish(id, &topic, payload);
        info!("Relayed record {} -> {}", id, result);
        result
    }

    fn send_status(&mut self) {
        let connectivity = self.uplink.connectivity();
        let frame = RelayStatusFrame::ok(
            connectivity.link_connected,
            connectivity.broker_connected,
            connectivity.address,
        );
        self.reported = (frame.wifi, frame.mqtt);

        let line = match encode_frame(&frame, self.max_frame_bytes) {
            Ok(line) => line,
            Err(e) => {
                warn!("Status frame not encoded: {}", e);
                return;
            }
        };
        if let Err(e) = self.transport.write_line(&line) {
            warn!("Status frame not sent: {}", e);
        }
    }

    /// Execute one console line and return the text to print
    pub fn handle_console_line(&mut self, line: &str) -> Vec<String> {
        let command = match parse_console_line(line) {
            Ok(Some(command)) => command,
            Ok(None) => return Vec::new(),
            Err(e) => return vec![format!("Error: {e}")],
        };

        match command {
            ConsoleCommand::Help => HELP_LINES.iter().map(|l| l.to_string()).collect(),
            ConsoleCommand::Status => self.status_lines(),
            ConsoleCommand::Reset => self.reset(),
            ConsoleCommand::Wifi { ssid, pass } => {
                let link = self.uplink.link_mut();
                match link.set_credentials(&ssid, &pass) {
                    Ok(()) => {
                        link.disable();
                        link.enable();
                        vec![format!("WiFi configuration saved, connecting to {ssid}")]
                    }
                    Err(e) => vec![format!("Error: {e}")],
                }
            }
            ConsoleCommand::Mqtt {
                host,
                port,
                user,
                pass,
            } => {
                let link_up = self.uplink.link().is_connected();
                let broker = self.uplink.broker_mut();
                match broker.set_broker_config(&host, port, user.as_deref(), pass.as_deref()) {
                    Ok(()) => {
                        broker.disable();
                        broker.enable(link_up);
                        vec![format!("MQTT configuration saved: {host}:{port}")]
                    }
                    Err(e) => vec![format!("Error: {e}")],
                }
            }
        }
    }

    fn status_lines(&self) -> Vec<String> {
        let link = self.uplink.link();
        let broker = self.uplink.broker();
        let link_detail = match link.address() {
            Some(address) => format!("{} ({address})", link.status()),
            None => link.status().to_string(),
        };
        let broker_target = match (broker.host(), broker.port()) {
            (Some(host), Some(port)) => format!("{host}:{port}"),
            _ => "(not configured)".to_string(),
        };

        vec![
            "=== Gateway Status ===".to_string(),
            format!("Device ID: {}", broker.topics().device_id()),
            format!(
                "WiFi SSID: {}",
                link.identity().unwrap_or("(not configured)")
            ),
            format!("WiFi Status: {link_detail}"),
            format!("MQTT Broker: {broker_target}"),
            format!("MQTT Status: {}", broker.status()),
            format!("Pending publishes: {}", broker.pending_count()),
        ]
    }

    fn reset(&mut self) -> Vec<String> {
        let mut lines = Vec::new();
        if let Err(e) = self.uplink.broker_mut().clear_broker_config() {
            lines.push(format!("Error: {e}"));
        }
        if let Err(e) = self.uplink.link_mut().clear_credentials() {
            lines.push(format!("Error: {e}"));
        }
        if let Err(e) = self.store.clear() {
            error!("Failed to clear store: {}", e);
            lines.push(format!("Error: {e}"));
        }
        lines.push("All settings cleared".to_string());
        lines
    }

    pub fn uplink(&self) -> &DirectUplink<R, B, C> {
        &self.uplink
    }

    pub fn uplink_mut(&mut self) -> &mut DirectUplink<R, B, C> {
        &mut self.uplink
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::UplinkConfig;
    use crate::network::ConnectionStatus;
    use crate::storage::{keys, KeyValueStore, MemoryStore};
    use crate::testing::mocks::{ManualClock, MockBrokerClient, MockRadio, MockRelayTransport};
    use crate::uplink::DirectUplinkBuilder;
    use std::sync::Arc;

    struct Harness {
        gateway: RelayGateway<MockRelayTransport, MockRadio, MockBrokerClient, ManualClock>,
        transport: MockRelayTransport,
        radio: MockRadio,
        client: MockBrokerClient,
        store: Arc<MemoryStore>,
    }

    fn harness() -> Harness {
        let transport = MockRelayTransport::new();
        let radio = MockRadio::new();
        let client = MockBrokerClient::new();
        let store = MemoryStore::shared();
        let config = UplinkConfig::test_config();
        let uplink = DirectUplinkBuilder::new(
            config.clone(),
            radio.clone(),
            client.clone(),
            store.clone(),
            ManualClock::new(0),
        )
        .init();
        let gateway = RelayGateway::new(transport.clone(), uplink, store.clone(), &config.relay);
        Harness {
            gateway,
            transport,
            radio,
            client,
            store,
        }
    }

    fn bring_online(h: &mut Harness) {
        h.gateway.handle_console_line("wifi ssid=workshop pass=hunter22");
        h.radio.set_connected(true);
        h.gateway.tick();
        h.gateway.handle_console_line("mqtt broker=broker.local port=1883");
        h.client.set_connected(true);
        h.gateway.tick();
        assert!(h.gateway.uplink().is_online());
    }

    fn last_frame(transport: &MockRelayTransport) -> serde_json::Value {
        let written = transport.written();
        serde_json::from_str(written.last().unwrap()).unwrap()
    }

    #[test]
    fn test_status_query_gets_reply() {
        let mut h = harness();
        h.transport.push_inbound(b"{\"cmd\":\"status\"}\n");
        h.gateway.tick();
        let reply = last_frame(&h.transport);
        assert_eq!(reply["status"], "ok");
        assert_eq!(reply["wifi"], false);
        assert_eq!(reply["mqtt"], false);
        assert!(reply.get("ip").is_none());
    }

    #[test]
    fn test_connectivity_flips_push_status() {
        let mut h = harness();
        bring_online(&mut h);

        let pushed = last_frame(&h.transport);
        assert_eq!(pushed["wifi"], true);
        assert_eq!(pushed["mqtt"], true);
        assert_eq!(pushed["ip"], "192.168.1.50");

        let count = h.transport.written().len();
        h.gateway.tick();
        assert_eq!(h.transport.written().len(), count);
    }

    #[test]
    fn test_pub_frame_publishes_on_item_topic() {
        let mut h = harness();
        bring_online(&mut h);
        h.client.clear_published();

        h.transport
            .push_inbound(b"{\"cmd\":\"pub\",\"data\":{\"item_id\":42,\"final_weight\":18.1}}\n");
        h.gateway.tick();

        let published = h.client.published();
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].topic, "records/test-device/items/42");
        assert!(published[0].retain);
    }

    #[test]
    fn test_pub_without_item_id_uses_zero() {
        let mut h = harness();
        bring_online(&mut h);
        let data = serde_json::json!({"mode": "weight"});
        assert_eq!(h.gateway.publish_data(&data), PublishResult::Success);
        assert!(h
            .client
            .published()
            .iter()
            .any(|m| m.topic == "records/test-device/items/0"));
    }

    #[test]
    fn test_console_reset_clears_everything() {
        let mut h = harness();
        bring_online(&mut h);
        let lines = h.gateway.handle_console_line("reset");
        assert_eq!(lines.last().map(String::as_str), Some("All settings cleared"));
        assert_eq!(
            h.gateway.uplink().link().status(),
            ConnectionStatus::Disabled
        );
        assert_eq!(h.store.get_string(keys::LINK_IDENTITY), None);
        assert_eq!(h.store.get_bool(keys::BROKER_ENABLED), None);
    }

    #[test]
    fn test_console_status_and_errors() {
        let mut h = harness();
        let lines = h.gateway.handle_console_line("status");
        assert!(lines.iter().any(|l| l == "MQTT Broker: (not configured)"));
        assert!(lines.iter().any(|l| l == "Device ID: test-device"));

        let error = h.gateway.handle_console_line("mqtt port=1883");
        assert!(error[0].starts_with("Error: Usage: mqtt"));
        assert_eq!(h.gateway.handle_console_line("help").len(), 6);
    }
}
