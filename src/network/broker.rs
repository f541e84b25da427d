//! Broker connectivity and record delivery
//!
//! The broker only connects while the link is up. Publishes that cannot go
//! out immediately land in the [`RetryQueue`], which is drained a few entries
//! per tick while connected.

use crate::clock::{elapsed_ms, Clock};
use crate::config::BrokerSection;
use crate::error::{UplinkError, UplinkResult};
use crate::network::backoff::{ReconnectDecision, ReconnectState};
use crate::network::retry_queue::{DrainOutcome, PendingPublish, RetryQueue};
use crate::network::status::{BoxedStatusObserver, ConnectionStatus, StatusTracker};
use crate::network::topics::TopicBuilder;
use crate::record::{encode_record, Record};
use crate::storage::{keys, write_group, SharedStore, StoredValue};
use crate::transport::{BrokerClient, ConnectOptions, LastWill};
use serde::Serialize;
use std::fmt;
use tracing::{debug, error, info, warn};

pub const MAX_HOST_LEN: usize = 128;
pub const MAX_USERNAME_LEN: usize = 64;
pub const MAX_PASSWORD_LEN: usize = 64;

const PRESENCE_ONLINE: &str = "online";
const PRESENCE_OFFLINE: &str = "offline";

/// Broker endpoint and optional username/password
#[derive(Clone, PartialEq)]
pub struct BrokerConfig {
    host: String,
    port: u16,
    username: Option<String>,
    password: Option<String>,
}

impl BrokerConfig {
    /// Validate and build. Empty username or password means "none".
    pub fn new(
        host: impl Into<String>,
        port: u16,
        username: Option<String>,
        password: Option<String>,
    ) -> UplinkResult<Self> {
        let host = host.into();
        let username = username.filter(|u| !u.is_empty());
        let password = password.filter(|p| !p.is_empty());

        if host.is_empty() || host.len() > MAX_HOST_LEN {
            return Err(UplinkError::config_invalid(format!(
                "broker host must be 1-{MAX_HOST_LEN} bytes, got {}",
                host.len()
            )));
        }
        if port == 0 {
            return Err(UplinkError::config_invalid("broker port must be non-zero"));
        }
        if username.as_ref().is_some_and(|u| u.len() > MAX_USERNAME_LEN) {
            return Err(UplinkError::config_invalid(format!(
                "broker username exceeds {MAX_USERNAME_LEN} bytes"
            )));
        }
        if password.as_ref().is_some_and(|p| p.len() > MAX_PASSWORD_LEN) {
            return Err(UplinkError::config_invalid(format!(
                "broker password exceeds {MAX_PASSWORD_LEN} bytes"
            )));
        }

        Ok(Self {
            host,
            port,
            username,
            password,
        })
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn username(&self) -> Option<&str> {
        self.username.as_deref()
    }

    pub fn password(&self) -> Option<&str> {
        self.password.as_deref()
    }
}

impl fmt::Debug for BrokerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BrokerConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Outcome of a publish request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PublishResult {
    Success,
    Queued,
    Dropped,
}

impl PublishResult {
    pub fn as_str(&self) -> &'static str {
        match self {
            PublishResult::Success => "success",
            PublishResult::Queued => "queued",
            PublishResult::Dropped => "dropped",
        }
    }
}

impl fmt::Display for PublishResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Receives every publish result, keyed by the caller's identifier
pub trait PublishObserver {
    fn on_publish_result(&mut self, id: u32, result: PublishResult);
}

impl<F> PublishObserver for F
where
    F: FnMut(u32, PublishResult),
{
    fn on_publish_result(&mut self, id: u32, result: PublishResult) {
        self(id, result)
    }
}

pub type BoxedPublishObserver = Box<dyn PublishObserver + Send>;

pub struct BrokerManager<B, C> {
    client: B,
    clock: C,
    store: SharedStore,
    settings: BrokerSection,
    topics: TopicBuilder,
    config: Option<BrokerConfig>,
    enabled: bool,
    status: StatusTracker,
    reconnect: ReconnectState,
    connect_started: u32,
    queue: RetryQueue,
    publish_observer: Option<BoxedPublishObserver>,
}

impl<B: BrokerClient, C: Clock> BrokerManager<B, C> {
    /// Construct from persisted state. Call [`BrokerManager::init`] afterwards.
    pub fn new(
        client: B,
        clock: C,
        store: SharedStore,
        settings: &BrokerSection,
        device_id: &str,
    ) -> Self {
        let config = Self::load_config(&store);
        Self {
            client,
            clock,
            store,
            topics: TopicBuilder::new(settings.topic_prefix.clone(), device_id),
            reconnect: ReconnectState::new(settings.reconnect_config()),
            settings: settings.clone(),
            config,
            enabled: false,
            status: StatusTracker::new(ConnectionStatus::Disabled),
            connect_started: 0,
            queue: RetryQueue::new(),
            publish_observer: None,
        }
    }

    fn load_config(store: &SharedStore) -> Option<BrokerConfig> {
        let host = store.get_string(keys::BROKER_HOST)?;
        let port = store
            .get_integer(keys::BROKER_PORT)
            .and_then(|p| u16::try_from(p).ok())?;
        let username = store.get_string(keys::BROKER_USERNAME);
        let password = store.get_string(keys::BROKER_PASSWORD);

        match BrokerConfig::new(host, port, username, password) {
            Ok(config) => Some(config),
            Err(e) => {
                warn!("Ignoring stored broker config: {}", e);
                None
            }
        }
    }

    pub fn set_status_observer(&mut self, observer: BoxedStatusObserver) {
        self.status.set_observer(observer);
    }

    pub fn set_publish_observer(&mut self, observer: BoxedPublishObserver) {
        self.publish_observer = Some(observer);
    }

    /// Restore the persisted intent. With the link down this lands in
    /// `Error` but keeps the intent, so the first tick with the link up connects.
    pub fn init(&mut self, link_up: bool) {
        let persisted = self.store.get_bool(keys::BROKER_ENABLED).unwrap_or(false);
        info!(
            "Broker init: persisted_enabled={}, configured={}",
            persisted,
            self.is_configured()
        );
        if persisted && self.is_configured() {
            self.enable(link_up);
        }
    }

    /// Validate, persist, then adopt a new broker config without reconnecting
    pub fn set_broker_config(
        &mut self,
        host: &str,
        port: u16,
        username: Option<&str>,
        password: Option<&str>,
    ) -> UplinkResult<()> {
        let config = BrokerConfig::new(
            host,
            port,
            username.map(str::to_string),
            password.map(str::to_string),
        )?;

        let optional = |value: Option<&str>| value.map(|v| StoredValue::String(v.to_string()));
        write_group(
            &*self.store,
            &[
                (
                    keys::BROKER_HOST,
                    Some(StoredValue::String(config.host().to_string())),
                ),
                (
                    keys::BROKER_PORT,
                    Some(StoredValue::Integer(i64::from(config.port()))),
                ),
                (keys::BROKER_USERNAME, optional(config.username())),
                (keys::BROKER_PASSWORD, optional(config.password())),
            ],
        )?;

        info!("Broker config updated: {}:{}", config.host(), config.port());
        self.config = Some(config);
        Ok(())
    }

    /// Forget the broker config everywhere and turn the broker off
    pub fn clear_broker_config(&mut self) -> UplinkResult<()> {
        if self.enabled {
            self.disable();
        }
        for key in [
            keys::BROKER_HOST,
            keys::BROKER_PORT,
            keys::BROKER_USERNAME,
            keys::BROKER_PASSWORD,
        ] {
            self.store.remove(key)?;
        }
        self.config = None;
        info!("Broker config cleared");
        Ok(())
    }

    pub fn enable(&mut self, link_up: bool) {
        if self.enabled && self.status.get() != ConnectionStatus::Disabled {
            debug!("Broker already enabled");
            return;
        }

        if self.config.is_none() {
            warn!("Cannot enable broker: not configured");
            self.status.set(ConnectionStatus::Error);
            return;
        }

        self.enabled = true;
        self.persist_enabled(true);
        self.reconnect.reset();

        if !link_up {
            warn!("Broker enabled while link is down, waiting for link");
            self.status.set(ConnectionStatus::Error);
            return;
        }

        info!("Broker enabled");
        self.start_connect();
    }

    /// Disconnect, drop all queued work and persist the disabled intent
    pub fn disable(&mut self) {
        self.enabled = false;
        self.client.disconnect();
        self.discard_queue();
        self.persist_enabled(false);
        self.status.set(ConnectionStatus::Disabled);
        info!("Broker disabled");
    }

    pub fn tick(&mut self, link_up: bool) {
        if !self.enabled {
            return;
        }

        self.status.begin_tick();

        if !link_up {
            match self.status.get() {
                ConnectionStatus::Connected | ConnectionStatus::Connecting => {
                    warn!("Link down, broker session abandoned");
                    self.client.disconnect();
                }
                ConnectionStatus::Disconnected => {
                    debug!("Link down, broker waiting");
                }
                ConnectionStatus::Error | ConnectionStatus::Disabled => {}
            }
            self.status.set(ConnectionStatus::Error);
            self.reconnect.reset();
            self.status.end_tick();
            return;
        }

        let now = self.clock.now_ms();
        match self.status.get() {
            ConnectionStatus::Connecting => {
                if self.client.is_connected() {
                    info!("Broker connected");
                    self.status.set(ConnectionStatus::Connected);
                    self.reconnect.reset();
                    self.announce_presence();
                    self.drain_queue();
                } else if elapsed_ms(now, self.connect_started)
                    > self.settings.connection_timeout_ms
                {
                    warn!(
                        "Broker connection timed out after {}ms",
                        self.settings.connection_timeout_ms
                    );
                    self.client.disconnect();
                    self.status.set(ConnectionStatus::Disconnected);
                    self.reconnect_if_due(now);
                }
            }
            ConnectionStatus::Connected => {
                if self.client.is_connected() {
                    self.drain_queue();
                } else {
                    warn!("Broker connection lost");
                    self.status.set(ConnectionStatus::Disconnected);
                    self.reconnect.reset();
                    self.reconnect_if_due(now);
                }
            }
            ConnectionStatus::Disconnected | ConnectionStatus::Error => {
                self.reconnect_if_due(now);
            }
            ConnectionStatus::Disabled => {}
        }

        self.status.end_tick();
    }

    /// Publish a record on its item topic
    pub fn publish_record(&mut self, record: &dyn Record) -> PublishResult {
        let id = record.item_id();
        match encode_record(record, self.settings.max_payload_bytes) {
            Ok(payload) => {
                let topic = self.topics.item_topic(id);
                self.publish(id, &topic, payload)
            }
            Err(e) => {
                warn!("Record {} not published: {}", id, e);
                self.report(id, PublishResult::Dropped);
                PublishResult::Dropped
            }
        }
    }

    /// Publish an encoded payload, queueing it when it cannot go out now
    pub fn publish(&mut self, id: u32, topic: &str, payload: Vec<u8>) -> PublishResult {
        let result = self.try_publish(id, topic, payload);
        self.report(id, result);
        result
    }

    fn try_publish(&mut self, id: u32, topic: &str, payload: Vec<u8>) -> PublishResult {
        if !self.enabled {
            let e = UplinkError::not_ready("broker disabled");
            warn!("Publish {} dropped: {}", id, e);
            return PublishResult::Dropped;
        }

        if payload.len() > self.settings.max_payload_bytes {
            let e = UplinkError::payload_too_large(payload.len(), self.settings.max_payload_bytes);
            warn!("Publish {} dropped: {}", id, e);
            return PublishResult::Dropped;
        }

        if self.status.get() == ConnectionStatus::Connected {
            match self.client.publish(topic, &payload, true) {
                Ok(()) => {
                    debug!("Published {} to {}", id, topic);
                    return PublishResult::Success;
                }
                Err(e) => warn!("Immediate publish {} failed: {}", id, e),
            }
        }

        match self.queue.push(PendingPublish::new(id, topic, payload)) {
            Ok(()) => PublishResult::Queued,
            Err(_) => PublishResult::Dropped,
        }
    }

    /// Publish a non-retained presence message; true if the client accepted it
    pub fn test_connection(&mut self) -> bool {
        if self.status.get() != ConnectionStatus::Connected {
            debug!("Connection test skipped: broker {}", self.status.get());
            return false;
        }
        let topic = self.topics.presence_topic();
        match self.client.publish(&topic, PRESENCE_ONLINE.as_bytes(), false) {
            Ok(()) => true,
            Err(e) => {
                warn!("Connection test publish failed: {}", e);
                false
            }
        }
    }

    fn reconnect_if_due(&mut self, now: u32) {
        if let ReconnectDecision::Attempt(attempt) = self.reconnect.poll(now) {
            info!(
                "Broker reconnect attempt {} (next interval {}ms)",
                attempt,
                self.reconnect.current_interval()
            );
            self.start_connect();
        }
    }

    fn start_connect(&mut self) {
        let Some(options) = self.connect_options() else {
            self.status.set(ConnectionStatus::Error);
            return;
        };

        let now = self.clock.now_ms();
        self.connect_started = now;
        if self.reconnect.attempt_count() == 0 {
            self.reconnect.mark_started(now);
        }

        match self.client.begin_connection(&options) {
            Ok(()) => self.status.set(ConnectionStatus::Connecting),
            Err(e) => {
                warn!("Broker client refused connection attempt: {}", e);
                self.status.set(ConnectionStatus::Disconnected);
            }
        }
    }

    fn connect_options(&self) -> Option<ConnectOptions> {
        let config = self.config.as_ref()?;
        Some(ConnectOptions {
            client_id: self.topics.device_id().to_string(),
            host: config.host().to_string(),
            port: config.port(),
            username: config.username().map(str::to_string),
            password: config.password().map(str::to_string),
            keep_alive_secs: self.settings.keep_alive_secs,
            last_will: LastWill {
                topic: self.topics.presence_topic(),
                payload: PRESENCE_OFFLINE.to_string(),
                retain: true,
            },
        })
    }

    fn announce_presence(&mut self) {
        let topic = self.topics.presence_topic();
        if let Err(e) = self.client.publish(&topic, PRESENCE_ONLINE.as_bytes(), true) {
            warn!("Presence announcement failed: {}", e);
        }
    }

    fn drain_queue(&mut self) {
        if self.queue.is_empty() {
            return;
        }

        let client = &mut self.client;
        let outcomes = self.queue.drain(|entry| {
            match client.publish(&entry.topic, &entry.payload, true) {
                Ok(()) => true,
                Err(e) => {
                    debug!("Retry of {} failed: {}", entry.id, e);
                    false
                }
            }
        });

        for outcome in outcomes {
            match outcome {
                DrainOutcome::Delivered { id } => self.report(id, PublishResult::Success),
                DrainOutcome::Dropped { id } => self.report(id, PublishResult::Dropped),
                DrainOutcome::Requeued { .. } => {}
            }
        }
    }

    fn discard_queue(&mut self) {
        let ids: Vec<u32> = self.queue.iter().map(|entry| entry.id).collect();
        self.queue.clear();
        if !ids.is_empty() {
            warn!("Discarding {} queued publishes", ids.len());
        }
        for id in ids {
            self.report(id, PublishResult::Dropped);
        }
    }

    fn report(&mut self, id: u32, result: PublishResult) {
        if let Some(observer) = self.publish_observer.as_mut() {
            observer.on_publish_result(id, result);
        }
    }

    fn persist_enabled(&self, enabled: bool) {
        if let Err(e) = self.store.set_bool(keys::BROKER_ENABLED, enabled) {
            error!("Failed to persist broker enabled flag: {}", e);
        }
    }

    pub fn status(&self) -> ConnectionStatus {
        self.status.get()
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn is_connected(&self) -> bool {
        self.status.get().is_connected()
    }

    pub fn is_configured(&self) -> bool {
        self.config.is_some()
    }

    pub fn config(&self) -> Option<&BrokerConfig> {
        self.config.as_ref()
    }

    pub fn host(&self) -> Option<&str> {
        self.config.as_ref().map(BrokerConfig::host)
    }

    pub fn port(&self) -> Option<u16> {
        self.config.as_ref().map(BrokerConfig::port)
    }

    pub fn has_username(&self) -> bool {
        self.config
            .as_ref()
            .is_some_and(|config| config.username().is_some())
    }

    pub fn pending_count(&self) -> usize {
        self.queue.len()
    }

    pub fn topics(&self) -> &TopicBuilder {
        &self.topics
    }

    pub fn client(&self) -> &B {
        &self.client
    }
}

impl<B, C> fmt::Debug for BrokerManager<B, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BrokerManager")
            .field("enabled", &self.enabled)
            .field("status", &self.status.get())
            .field("config", &self.config)
            .field("pending", &self.queue.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::JsonRecord;
    use crate::storage::{KeyValueStore, MemoryStore};
    use crate::testing::mocks::{FaultyStore, ManualClock, MockBrokerClient, PublishRecorder};
    use std::sync::Arc;

    struct Harness {
        broker: BrokerManager<MockBrokerClient, ManualClock>,
        client: MockBrokerClient,
        clock: ManualClock,
        store: Arc<MemoryStore>,
        results: PublishRecorder,
    }

    fn harness() -> Harness {
        let client = MockBrokerClient::new();
        let clock = ManualClock::new(0);
        let store = MemoryStore::shared();
        let results = PublishRecorder::new();
        let mut broker = BrokerManager::new(
            client.clone(),
            clock.clone(),
            store.clone(),
            &BrokerSection::default(),
            "esp32-00a1b2c3",
        );
        broker.set_publish_observer(results.observer());
        Harness {
            broker,
            client,
            clock,
            store,
            results,
        }
    }

    fn connected_harness() -> Harness {
        let mut h = harness();
        h.broker
            .set_broker_config("broker.local", 1883, None, None)
            .unwrap();
        h.broker.enable(true);
        h.client.set_connected(true);
        h.broker.tick(true);
        assert_eq!(h.broker.status(), ConnectionStatus::Connected);
        h.client.clear_published();
        h
    }

    #[test]
    fn test_failed_port_write_restores_previous_host() {
        let store = FaultyStore::shared();
        let mut broker = BrokerManager::new(
            MockBrokerClient::new(),
            ManualClock::new(0),
            store.clone(),
            &BrokerSection::default(),
            "esp32-00a1b2c3",
        );
        broker
            .set_broker_config("broker.local", 1883, Some("device"), Some("s3cret"))
            .unwrap();

        store.fail_writes_to(keys::BROKER_PORT);
        let result = broker.set_broker_config("other.local", 8883, None, None);

        assert!(matches!(result, Err(UplinkError::Storage(_))));
        assert_eq!(broker.host(), Some("broker.local"));
        assert_eq!(
            store.get_string(keys::BROKER_HOST),
            Some("broker.local".to_string())
        );
        assert_eq!(store.get_integer(keys::BROKER_PORT), Some(1883));
        assert_eq!(
            store.get_string(keys::BROKER_USERNAME),
            Some("device".to_string())
        );
    }

    #[test]
    fn test_broker_config_validation() {
        assert!(BrokerConfig::new("", 1883, None, None).is_err());
        assert!(BrokerConfig::new("broker.local", 0, None, None).is_err());
        assert!(BrokerConfig::new("h".repeat(129), 1883, None, None).is_err());
        assert!(BrokerConfig::new("broker.local", 1883, Some("u".repeat(65)), None).is_err());

        let config =
            BrokerConfig::new("broker.local", 1883, Some(String::new()), Some("pw".into()))
                .unwrap();
        assert_eq!(config.username(), None);
        assert!(!format!("{config:?}").contains("pw\""));
    }

    #[test]
    fn test_set_broker_config_persists() {
        let mut h = harness();
        h.broker
            .set_broker_config("broker.local", 8883, Some("device"), Some("secret"))
            .unwrap();
        assert_eq!(
            h.store.get_string(keys::BROKER_HOST),
            Some("broker.local".to_string())
        );
        assert_eq!(h.store.get_integer(keys::BROKER_PORT), Some(8883));
        assert!(h.broker.has_username());
        assert_eq!(h.client.begin_calls(), 0);
    }

    #[test]
    fn test_enable_requires_config() {
        let mut h = harness();
        h.broker.enable(true);
        assert_eq!(h.broker.status(), ConnectionStatus::Error);
        assert!(!h.broker.is_enabled());
    }

    #[test]
    fn test_enable_with_link_down_keeps_intent() {
        let mut h = harness();
        h.broker
            .set_broker_config("broker.local", 1883, None, None)
            .unwrap();
        h.broker.enable(false);
        assert_eq!(h.broker.status(), ConnectionStatus::Error);
        assert!(h.broker.is_enabled());
        assert_eq!(h.store.get_bool(keys::BROKER_ENABLED), Some(true));

        h.broker.tick(true);
        assert_eq!(h.broker.status(), ConnectionStatus::Connecting);
        assert_eq!(h.client.begin_calls(), 1);
    }

    #[test]
    fn test_connect_requests_will_and_announces_presence() {
        let h = connected_harness();
        let options = h.client.last_options().unwrap();
        assert_eq!(options.client_id, "esp32-00a1b2c3");
        assert_eq!(options.last_will.topic, "records/esp32-00a1b2c3/status");
        assert_eq!(options.last_will.payload, "offline");
        assert!(options.last_will.retain);
        assert_eq!(h.client.begin_calls(), 1);
    }

    #[test]
    fn test_presence_published_retained_on_connect() {
        let mut h = harness();
        h.broker
            .set_broker_config("broker.local", 1883, None, None)
            .unwrap();
        h.broker.enable(true);
        h.client.set_connected(true);
        h.broker.tick(true);

        let published = h.client.published();
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].topic, "records/esp32-00a1b2c3/status");
        assert_eq!(published[0].payload, b"online".to_vec());
        assert!(published[0].retain);
    }

    #[test]
    fn test_publish_when_connected_succeeds_retained() {
        let mut h = connected_harness();
        let record = JsonRecord::new(12).with_field("final_weight", 18.1);
        assert_eq!(h.broker.publish_record(&record), PublishResult::Success);

        let published = h.client.published();
        assert_eq!(published[0].topic, "records/esp32-00a1b2c3/items/12");
        assert!(published[0].retain);
        assert_eq!(h.results.seen(), vec![(12, PublishResult::Success)]);
    }

    #[test]
    fn test_publish_while_not_connected_never_sends() {
        let mut h = harness();
        h.broker
            .set_broker_config("broker.local", 1883, None, None)
            .unwrap();
        h.broker.enable(true);
        assert_eq!(h.broker.status(), ConnectionStatus::Connecting);

        let result = h.broker.publish(1, "records/esp32-00a1b2c3/items/1", b"{}".to_vec());
        assert_eq!(result, PublishResult::Queued);
        assert_eq!(h.client.publish_attempts(), 0);
        assert_eq!(h.broker.pending_count(), 1);
    }

    #[test]
    fn test_publish_on_disabled_broker_is_dropped() {
        let mut h = harness();
        let result = h.broker.publish(3, "records/x/items/3", b"{}".to_vec());
        assert_eq!(result, PublishResult::Dropped);
        assert_eq!(h.broker.pending_count(), 0);
        assert_eq!(h.results.seen(), vec![(3, PublishResult::Dropped)]);
    }

    #[test]
    fn test_oversized_record_is_dropped_not_queued() {
        let mut h = connected_harness();
        let record = JsonRecord::new(5).with_field("blob", "x".repeat(1024));
        assert_eq!(h.broker.publish_record(&record), PublishResult::Dropped);
        assert_eq!(h.broker.pending_count(), 0);
        assert_eq!(h.client.publish_attempts(), 0);
    }

    #[test]
    fn test_failed_publishes_queue_then_drain() {
        let mut h = connected_harness();
        h.client.set_publish_fails(true);
        for id in 1..=3 {
            let topic = format!("records/esp32-00a1b2c3/items/{id}");
            assert_eq!(
                h.broker.publish(id, &topic, b"{}".to_vec()),
                PublishResult::Queued
            );
        }
        assert_eq!(h.broker.pending_count(), 3);

        h.client.set_publish_fails(false);
        h.client.clear_published();
        h.broker.tick(true);

        assert_eq!(h.broker.pending_count(), 0);
        assert_eq!(h.client.published().len(), 3);
        let successes: Vec<u32> = h
            .results
            .seen()
            .into_iter()
            .filter(|(_, result)| *result == PublishResult::Success)
            .map(|(id, _)| id)
            .collect();
        assert_eq!(successes, vec![1, 2, 3]);
    }

    #[test]
    fn test_link_drop_forces_error_then_recovers() {
        let mut h = connected_harness();
        h.broker.tick(false);
        assert_eq!(h.broker.status(), ConnectionStatus::Error);
        assert!(h.client.disconnect_calls() >= 1);

        h.client.set_connected(false);
        h.clock.advance(100);
        h.broker.tick(true);
        assert_eq!(h.broker.status(), ConnectionStatus::Connecting);
        assert_eq!(h.client.begin_calls(), 2);
    }

    #[test]
    fn test_broker_retries_are_unbounded() {
        let mut h = harness();
        h.broker
            .set_broker_config("broker.local", 1883, None, None)
            .unwrap();
        h.broker.enable(true);
        for _ in 0..30 {
            h.clock.advance(40_000);
            h.broker.tick(true);
        }
        assert_ne!(h.broker.status(), ConnectionStatus::Error);
        assert!(h.client.begin_calls() > 10);
    }

    #[test]
    fn test_disable_clears_queue_and_reports_drops() {
        let mut h = harness();
        h.broker
            .set_broker_config("broker.local", 1883, None, None)
            .unwrap();
        h.broker.enable(true);
        h.broker.publish(9, "records/esp32-00a1b2c3/items/9", b"{}".to_vec());
        h.broker.disable();

        assert_eq!(h.broker.pending_count(), 0);
        assert_eq!(h.broker.status(), ConnectionStatus::Disabled);
        assert_eq!(
            h.results.seen(),
            vec![(9, PublishResult::Queued), (9, PublishResult::Dropped)]
        );
    }

    #[test]
    fn test_test_connection() {
        let mut h = harness();
        assert!(!h.broker.test_connection());

        let mut h = connected_harness();
        assert!(h.broker.test_connection());
        let published = h.client.published();
        assert_eq!(published[0].payload, b"online".to_vec());
        assert!(!published[0].retain);
    }

    #[test]
    fn test_init_restores_config_and_intent() {
        let store = MemoryStore::shared();
        store.set_string(keys::BROKER_HOST, "broker.local").unwrap();
        store.set_integer(keys::BROKER_PORT, 1883).unwrap();
        store.set_bool(keys::BROKER_ENABLED, true).unwrap();

        let mut broker = BrokerManager::new(
            MockBrokerClient::new(),
            ManualClock::new(0),
            store,
            &BrokerSection::default(),
            "dev",
        );
        broker.init(false);
        assert!(broker.is_enabled());
        assert_eq!(broker.status(), ConnectionStatus::Error);
        assert_eq!(broker.port(), Some(1883));
    }

    #[test]
    fn test_clear_broker_config() {
        let mut h = connected_harness();
        h.broker.clear_broker_config().unwrap();
        assert_eq!(h.broker.status(), ConnectionStatus::Disabled);
        assert!(!h.broker.is_configured());
        assert_eq!(h.store.get_string(keys::BROKER_HOST), None);
    }
}
