//! Main-unit side of the relay path
//!
//! The bridge holds no connection state machine. It forwards publishes as
//! fire-and-forget frames and caches whatever connectivity the companion last
//! reported. A publish counts as successful once the frame is handed to the
//! transport; the protocol has no delivery acknowledgement.

use crate::clock::{elapsed_ms, Clock};
use crate::config::RelaySection;
use crate::error::{UplinkError, UplinkResult};
use crate::network::PublishResult;
use crate::record::{encode_record, Record};
use crate::relay::frame::{
    encode_frame, parse_frame, InboundFrame, LineAccumulator, RelayCommand, RelayStatusFrame,
};
use crate::relay::serial::RelayTransport;
use crate::uplink::{Connectivity, Uplink};
use tracing::{debug, info, warn};

/// Read chunk size and per-tick read ceiling
const READ_CHUNK: usize = 64;
const MAX_READ_PER_TICK: usize = 4096;

pub struct RelayBridge<T, C> {
    transport: T,
    clock: C,
    accumulator: LineAccumulator,
    max_frame_bytes: usize,
    max_payload_bytes: usize,
    status_interval_ms: u32,
    last_query: Option<u32>,
    last_report: Option<RelayStatusFrame>,
}

impl<T: RelayTransport, C: Clock> RelayBridge<T, C> {
    pub fn new(transport: T, clock: C, settings: &RelaySection, max_payload_bytes: usize) -> Self {
        Self {
            transport,
            clock,
            accumulator: LineAccumulator::new(settings.max_frame_bytes),
            max_frame_bytes: settings.max_frame_bytes,
            max_payload_bytes,
            status_interval_ms: settings.status_interval_ms,
            last_query: None,
            last_report: None,
        }
    }

    /// Ask the companion for its connectivity right away
    pub fn init(&mut self) {
        info!("Relay bridge started");
        self.send_status_query();
    }

    /// Encode a record into a publish frame and hand it to the transport
    pub fn publish_record(&mut self, record: &dyn Record) -> UplinkResult<()> {
        let payload = encode_record(record, self.max_payload_bytes)?;
        let data = serde_json::from_slice(&payload)
            .map_err(|e| UplinkError::frame_malformed(format!("record payload: {e}")))?;
        let line = encode_frame(&RelayCommand::Publish { data }, self.max_frame_bytes)?;
        self.transport.write_line(&line)?;
        debug!("Relayed record {}", record.item_id());
        Ok(())
    }

    fn send_status_query(&mut self) {
        self.last_query = Some(self.clock.now_ms());
        match encode_frame(&RelayCommand::StatusQuery, self.max_frame_bytes) {
            Ok(line) => {
                if let Err(e) = self.transport.write_line(&line) {
                    warn!("Relay status query failed: {}", e);
                }
            }
            Err(e) => warn!("Relay status query not encoded: {}", e),
        }
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

    fn handle_line(&mut self, line: &str) {
        match parse_frame(line) {
            Ok(InboundFrame::Status(report)) => self.apply_report(report),
            Ok(InboundFrame::Command(command)) => {
                debug!("Ignoring command frame from companion: {:?}", command);
            }
            Ok(InboundFrame::Ignored) => {}
            Err(e) => warn!("Dropping relay frame: {}", e),
        }
    }

    fn apply_report(&mut self, report: RelayStatusFrame) {
        let changed = self
            .last_report
            .as_ref()
            .map_or(true, |prev| prev.wifi != report.wifi || prev.mqtt != report.mqtt);
        if changed {
            info!(
                "Companion connectivity: link={}, broker={}, address={}",
                report.wifi,
                report.mqtt,
                report.ip.as_deref().unwrap_or("-")
            );
        }
        self.last_report = Some(report);
    }

    pub fn is_link_connected(&self) -> bool {
        self.last_report.as_ref().is_some_and(|r| r.wifi)
    }

    pub fn is_broker_connected(&self) -> bool {
        self.last_report.as_ref().is_some_and(|r| r.mqtt)
    }

    pub fn address(&self) -> Option<&str> {
        self.last_report.as_ref().and_then(|r| r.ip.as_deref())
    }

    /// Whether any status report has arrived yet
    pub fn has_report(&self) -> bool {
        self.last_report.is_some()
    }

    pub fn dropped_frames(&self) -> u32 {
        self.accumulator.dropped_frames()
    }

    pub fn buffered_len(&self) -> usize {
        self.accumulator.buffered_len()
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }
}

impl<T: RelayTransport, C: Clock> Uplink for RelayBridge<T, C> {
    fn tick(&mut self) {
        self.pump_input();

        let now = self.clock.now_ms();
        let due = self
            .last_query
            .map_or(true, |last| elapsed_ms(now, last) >= self.status_interval_ms);
        if due {
            self.send_status_query();
        }
    }

    fn publish(&mut self, record: &dyn Record) -> PublishResult {
        match self.publish_record(record) {
            Ok(()) => PublishResult::Success,
            Err(e) => {
                warn!("Record {} not relayed: {} ({})", record.item_id(), e, e.kind());
                PublishResult::Dropped
            }
        }
    }

    fn connectivity(&self) -> Connectivity {
        Connectivity {
            link_connected: self.is_link_connected(),
            broker_connected: self.is_broker_connected(),
            address: self.address().map(str::to_string),
        }
    }
}
