//! Mock hardware seams
//!
//! Every mock is a cheap handle over shared state, so a test keeps one clone
//! to script and inspect while the manager under test owns the other.

use crate::clock::Clock;
use crate::network::broker::{BoxedPublishObserver, PublishResult};
use crate::network::status::{BoxedStatusObserver, ConnectionStatus};
use crate::relay::serial::RelayTransport;
use crate::storage::{KeyValueStore, MemoryStore, StoreError};
use crate::transport::{BrokerClient, ConnectOptions, Radio, TransportError};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

fn lock<T>(state: &Mutex<T>) -> MutexGuard<'_, T> {
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Clock advanced by hand
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now: Arc<AtomicU32>,
}

impl ManualClock {
    pub fn new(start_ms: u32) -> Self {
        Self {
            now: Arc::new(AtomicU32::new(start_ms)),
        }
    }

    /// Advance, wrapping at `u32::MAX` like a hardware tick counter
    pub fn advance(&self, ms: u32) {
        let now = self.now.load(Ordering::SeqCst);
        self.now.store(now.wrapping_add(ms), Ordering::SeqCst);
    }

    pub fn set(&self, ms: u32) {
        self.now.store(ms, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> u32 {
        self.now.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Default)]
struct RadioState {
    connected: bool,
    begin_fails: bool,
    begin_calls: u32,
    disconnect_calls: u32,
    last_identity: Option<String>,
}

/// Scriptable radio; association only completes when the test says so
#[derive(Debug, Clone, Default)]
pub struct MockRadio {
    state: Arc<Mutex<RadioState>>,
}

impl MockRadio {
    pub const ADDRESS: &'static str = "192.168.1.50";
    pub const SIGNAL_DBM: i32 = -60;

    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_connected(&self, connected: bool) {
        lock(&self.state).connected = connected;
    }

    pub fn set_begin_fails(&self, fails: bool) {
        lock(&self.state).begin_fails = fails;
    }

    pub fn begin_calls(&self) -> u32 {
        lock(&self.state).begin_calls
    }

    pub fn disconnect_calls(&self) -> u32 {
        lock(&self.state).disconnect_calls
    }

    pub fn last_identity(&self) -> Option<String> {
        lock(&self.state).last_identity.clone()
    }
}

impl Radio for MockRadio {
    fn begin(&mut self, identity: &str, _secret: &str) -> Result<(), TransportError> {
        let mut state = lock(&self.state);
        state.begin_calls += 1;
        state.last_identity = Some(identity.to_string());
        if state.begin_fails {
            return Err(TransportError::Unavailable("radio busy".into()));
        }
        Ok(())
    }

    fn is_connected(&self) -> bool {
        lock(&self.state).connected
    }

    fn disconnect(&mut self, _power_down: bool) {
        let mut state = lock(&self.state);
        state.disconnect_calls += 1;
        state.connected = false;
    }

    fn address(&self) -> Option<String> {
        lock(&self.state)
            .connected
            .then(|| Self::ADDRESS.to_string())
    }

    fn signal_strength(&self) -> i32 {
        Self::SIGNAL_DBM
    }
}

/// A message the mock broker accepted
#[derive(Debug, Clone, PartialEq)]
pub struct PublishedMessage {
    pub topic: String,
    pub payload: Vec<u8>,
    pub retain: bool,
}

#[derive(Debug, Default)]
struct BrokerState {
    connected: bool,
    publish_fails: bool,
    begin_calls: u32,
    disconnect_calls: u32,
    publish_attempts: u32,
    last_options: Option<ConnectOptions>,
    published: Vec<PublishedMessage>,
}

/// Scriptable broker client recording every accepted publish
#[derive(Debug, Clone, Default)]
pub struct MockBrokerClient {
    state: Arc<Mutex<BrokerState>>,
}

impl MockBrokerClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_connected(&self, connected: bool) {
        lock(&self.state).connected = connected;
    }

    pub fn set_publish_fails(&self, fails: bool) {
        lock(&self.state).publish_fails = fails;
    }

    pub fn begin_calls(&self) -> u32 {
        lock(&self.state).begin_calls
    }

    pub fn disconnect_calls(&self) -> u32 {
        lock(&self.state).disconnect_calls
    }

    /// Every publish call, accepted or not
    pub fn publish_attempts(&self) -> u32 {
        lock(&self.state).publish_attempts
    }

    pub fn last_options(&self) -> Option<ConnectOptions> {
        lock(&self.state).last_options.clone()
    }

    pub fn published(&self) -> Vec<PublishedMessage> {
        lock(&self.state).published.clone()
    }

    pub fn clear_published(&self) {
        let mut state = lock(&self.state);
        state.published.clear();
        state.publish_attempts = 0;
    }
}

impl BrokerClient for MockBrokerClient {
    fn begin_connection(&mut self, options: &ConnectOptions) -> Result<(), TransportError> {
        let mut state = lock(&self.state);
        state.begin_calls += 1;
        state.last_options = Some(options.clone());
        Ok(())
    }

    fn is_connected(&self) -> bool {
        lock(&self.state).connected
    }

    fn disconnect(&mut self) {
        let mut state = lock(&self.state);
        state.disconnect_calls += 1;
        state.connected = false;
    }

    fn publish(&mut self, topic: &str, payload: &[u8], retain: bool) -> Result<(), TransportError> {
        let mut state = lock(&self.state);
        state.publish_attempts += 1;
        if state.publish_fails || !state.connected {
            return Err(TransportError::Rejected("publish refused".into()));
        }
        state.published.push(PublishedMessage {
            topic: topic.to_string(),
            payload: payload.to_vec(),
            retain,
        });
        Ok(())
    }
}

#[derive(Debug, Default)]
struct RelayState {
    inbound: VecDeque<u8>,
    written: Vec<String>,
    write_fails: bool,
}

/// In-memory relay link: tests push inbound bytes and read written frames
#[derive(Debug, Clone, Default)]
pub struct MockRelayTransport {
    state: Arc<Mutex<RelayState>>,
}

impl MockRelayTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_inbound(&self, bytes: &[u8]) {
        lock(&self.state).inbound.extend(bytes.iter().copied());
    }

    pub fn written(&self) -> Vec<String> {
        lock(&self.state).written.clone()
    }

    pub fn set_write_fails(&self, fails: bool) {
        lock(&self.state).write_fails = fails;
    }
}

impl RelayTransport for MockRelayTransport {
    fn write_line(&mut self, line: &str) -> Result<(), TransportError> {
        let mut state = lock(&self.state);
        if state.write_fails {
            return Err(TransportError::Io(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "relay link down",
            )));
        }
        state.written.push(line.to_string());
        Ok(())
    }

    fn read_available(&mut self, buf: &mut [u8]) -> Result<usize, TransportError> {
        let mut state = lock(&self.state);
        let n = buf.len().min(state.inbound.len());
        for (slot, byte) in buf.iter_mut().zip(state.inbound.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }
}

/// Memory store whose writes to one chosen key fail
#[derive(Debug, Default)]
pub struct FaultyStore {
    inner: MemoryStore,
    failing_key: Mutex<Option<String>>,
}

impl FaultyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Every later write or removal of `key` fails
    pub fn fail_writes_to(&self, key: &str) {
        *lock(&self.failing_key) = Some(key.to_string());
    }

    fn check(&self, key: &str) -> Result<(), StoreError> {
        if lock(&self.failing_key).as_deref() == Some(key) {
            return Err(StoreError::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                "flash write failed",
            )));
        }
        Ok(())
    }
}

impl KeyValueStore for FaultyStore {
    fn get_string(&self, key: &str) -> Option<String> {
        self.inner.get_string(key)
    }

    fn set_string(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.check(key)?;
        self.inner.set_string(key, value)
    }

    fn get_integer(&self, key: &str) -> Option<i64> {
        self.inner.get_integer(key)
    }

    fn set_integer(&self, key: &str, value: i64) -> Result<(), StoreError> {
        self.check(key)?;
        self.inner.set_integer(key, value)
    }

    fn get_bool(&self, key: &str) -> Option<bool> {
        self.inner.get_bool(key)
    }

    fn set_bool(&self, key: &str, value: bool) -> Result<(), StoreError> {
        self.check(key)?;
        self.inner.set_bool(key, value)
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        self.check(key)?;
        self.inner.remove(key)
    }

    fn clear(&self) -> Result<(), StoreError> {
        self.inner.clear()
    }
}

/// Collects status notifications
#[derive(Debug, Clone, Default)]
pub struct StatusRecorder {
    seen: Arc<Mutex<Vec<ConnectionStatus>>>,
}

impl StatusRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn observer(&self) -> BoxedStatusObserver {
        let seen = Arc::clone(&self.seen);
        Box::new(move |status: ConnectionStatus| lock(&seen).push(status))
    }

    pub fn seen(&self) -> Vec<ConnectionStatus> {
        lock(&self.seen).clone()
    }
}

/// Collects publish results keyed by caller id
#[derive(Debug, Clone, Default)]
pub struct PublishRecorder {
    seen: Arc<Mutex<Vec<(u32, PublishResult)>>>,
}

impl PublishRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn observer(&self) -> BoxedPublishObserver {
        let seen = Arc::clone(&self.seen);
        Box::new(move |id: u32, result: PublishResult| lock(&seen).push((id, result)))
    }

    pub fn seen(&self) -> Vec<(u32, PublishResult)> {
        lock(&self.seen).clone()
    }

    /// Results recorded for one id, in order
    pub fn results_for(&self, id: u32) -> Vec<PublishResult> {
        lock(&self.seen)
            .iter()
            .filter(|(seen_id, _)| *seen_id == id)
            .map(|(_, result)| *result)
            .collect()
    }
}
