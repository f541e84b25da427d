//! Direct uplink behavior tests
//!
//! Drives link and broker managers together through `DirectUplink::tick`,
//! using scripted radio and broker fakes and a hand-advanced clock.

use std::sync::Arc;
use uplink::network::ConnectionStatus;
use uplink::storage::keys;
use uplink::testing::{
    ManualClock, MockBrokerClient, MockRadio, PublishRecorder, StatusRecorder,
};
use uplink::{
    DirectUplink, DirectUplinkBuilder, JsonRecord, KeyValueStore, MemoryStore, PublishResult,
    Uplink, UplinkConfig,
};

struct Device {
    uplink: DirectUplink<MockRadio, MockBrokerClient, ManualClock>,
    radio: MockRadio,
    client: MockBrokerClient,
    clock: ManualClock,
    link_seen: StatusRecorder,
    broker_seen: StatusRecorder,
    results: PublishRecorder,
}

fn boot(store: Arc<MemoryStore>) -> Device {
    let radio = MockRadio::new();
    let client = MockBrokerClient::new();
    let clock = ManualClock::new(0);
    let link_seen = StatusRecorder::new();
    let broker_seen = StatusRecorder::new();
    let results = PublishRecorder::new();

    let uplink = DirectUplinkBuilder::new(
        UplinkConfig::default(),
        radio.clone(),
        client.clone(),
        store,
        clock.clone(),
    )
    .with_link_observer(link_seen.observer())
    .with_broker_observer(broker_seen.observer())
    .with_publish_observer(results.observer())
    .init();

    Device {
        uplink,
        radio,
        client,
        clock,
        link_seen,
        broker_seen,
        results,
    }
}

fn provisioned_store() -> Arc<MemoryStore> {
    let store = MemoryStore::shared();
    store.set_string(keys::LINK_IDENTITY, "FieldNet").unwrap();
    store.set_string(keys::LINK_SECRET, "hunter22").unwrap();
    store.set_string(keys::BROKER_HOST, "broker.local").unwrap();
    store.set_integer(keys::BROKER_PORT, 1883).unwrap();
    store.set_bool(keys::BROKER_ENABLED, true).unwrap();
    store
}

/// Link and broker both connected, with the presence publish cleared
fn online_device() -> Device {
    let mut device = boot(provisioned_store());
    device.uplink.link_mut().enable();
    device.radio.set_connected(true);
    device.uplink.tick();
    device.client.set_connected(true);
    device.uplink.tick();
    assert!(device.uplink.is_online());
    device.client.clear_published();
    device
}

#[test]
fn test_enable_brings_up_link_then_broker() {
    let mut device = boot(provisioned_store());

    // Broker intent restored while the link is still off
    assert_eq!(device.uplink.link().status(), ConnectionStatus::Disabled);
    assert_eq!(device.uplink.broker().status(), ConnectionStatus::Error);

    device.uplink.link_mut().enable();
    assert_eq!(device.uplink.link().status(), ConnectionStatus::Connecting);
    assert_eq!(device.radio.last_identity().as_deref(), Some("FieldNet"));

    device.radio.set_connected(true);
    device.uplink.tick();
    assert_eq!(device.uplink.link().status(), ConnectionStatus::Connected);
    assert_eq!(device.uplink.broker().status(), ConnectionStatus::Connecting);

    device.client.set_connected(true);
    device.uplink.tick();
    assert_eq!(device.uplink.broker().status(), ConnectionStatus::Connected);

    assert_eq!(
        device.link_seen.seen(),
        vec![ConnectionStatus::Connecting, ConnectionStatus::Connected]
    );
    assert_eq!(
        device.broker_seen.seen(),
        vec![
            ConnectionStatus::Error,
            ConnectionStatus::Connecting,
            ConnectionStatus::Connected
        ]
    );

    let connectivity = device.uplink.connectivity();
    assert!(connectivity.link_connected);
    assert!(connectivity.broker_connected);
    assert_eq!(connectivity.address.as_deref(), Some(MockRadio::ADDRESS));
}

#[test]
fn test_failed_publishes_are_delivered_on_next_tick() {
    let mut device = online_device();
    device.client.set_publish_fails(true);

    for id in 1..=3 {
        let record = JsonRecord::new(id).with_field("weight_g", 250);
        assert_eq!(device.uplink.publish(&record), PublishResult::Queued);
    }
    assert_eq!(device.uplink.broker().pending_count(), 3);

    device.client.set_publish_fails(false);
    device.uplink.tick();

    assert_eq!(device.uplink.broker().pending_count(), 0);
    for id in 1..=3 {
        let successes = device
            .results
            .results_for(id)
            .into_iter()
            .filter(|result| *result == PublishResult::Success)
            .count();
        assert_eq!(successes, 1, "record {id} should succeed exactly once");
    }
    // One immediate attempt and one retry each
    assert_eq!(device.client.publish_attempts(), 6);
}

#[test]
fn test_publish_while_connecting_only_queues() {
    let mut device = boot(provisioned_store());
    device.uplink.link_mut().enable();
    device.radio.set_connected(true);
    device.uplink.tick();
    assert_eq!(device.uplink.broker().status(), ConnectionStatus::Connecting);

    let record = JsonRecord::new(5);
    assert_eq!(device.uplink.publish(&record), PublishResult::Queued);
    assert_eq!(device.client.publish_attempts(), 0);
}

#[test]
fn test_eleventh_publish_is_dropped_and_order_kept() {
    let mut device = boot(provisioned_store());
    device.uplink.link_mut().enable();
    device.radio.set_connected(true);
    device.uplink.tick();

    for id in 1..=10 {
        assert_eq!(
            device.uplink.publish(&JsonRecord::new(id)),
            PublishResult::Queued
        );
    }
    assert_eq!(
        device.uplink.publish(&JsonRecord::new(11)),
        PublishResult::Dropped
    );
    assert_eq!(device.uplink.broker().pending_count(), 10);

    device.client.set_connected(true);
    for _ in 0..4 {
        device.uplink.tick();
    }
    assert_eq!(device.uplink.broker().pending_count(), 0);

    let delivered: Vec<String> = device
        .client
        .published()
        .into_iter()
        .map(|message| message.topic)
        .filter(|topic| topic.contains("/items/"))
        .collect();
    let expected: Vec<String> = (1..=10)
        .map(|id| format!("records/uplink-0001/items/{id}"))
        .collect();
    assert_eq!(delivered, expected);
}

#[test]
fn test_entry_dropped_on_third_failed_retry() {
    let mut device = online_device();
    device.client.set_publish_fails(true);

    assert_eq!(
        device.uplink.publish(&JsonRecord::new(9)),
        PublishResult::Queued
    );
    for _ in 0..5 {
        device.uplink.tick();
    }

    assert_eq!(device.uplink.broker().pending_count(), 0);
    // Immediate attempt plus exactly three retries
    assert_eq!(device.client.publish_attempts(), 4);
    assert_eq!(
        device.results.results_for(9),
        vec![PublishResult::Queued, PublishResult::Dropped]
    );
}

#[test]
fn test_link_gives_up_after_reconnect_budget() {
    let mut device = boot(provisioned_store());
    device.uplink.link_mut().enable();

    // Radio never associates; step well past every timeout and backoff
    for _ in 0..200 {
        device.clock.advance(1_000);
        device.uplink.tick();
    }

    assert_eq!(device.uplink.link().status(), ConnectionStatus::Error);
    assert!(device.uplink.link().is_enabled());
    // Enable attempt plus three reconnects
    assert_eq!(device.radio.begin_calls(), 4);
    assert_eq!(device.uplink.broker().status(), ConnectionStatus::Error);
    assert_eq!(device.client.begin_calls(), 0);
}

#[test]
fn test_enable_link_control_recovers_spent_link() {
    let mut device = boot(provisioned_store());
    device.uplink.link_mut().enable();
    for _ in 0..20 {
        device.clock.advance(11_000);
        device.uplink.tick();
    }
    assert_eq!(device.uplink.link().status(), ConnectionStatus::Error);
    assert_eq!(device.radio.begin_calls(), 4);

    device.uplink.provisioning().control(&[0x01]).unwrap();
    device.radio.set_connected(true);
    device.uplink.tick();

    assert_eq!(device.radio.begin_calls(), 5);
    assert_eq!(device.uplink.link().status(), ConnectionStatus::Connected);
    assert_eq!(device.uplink.broker().status(), ConnectionStatus::Connecting);
}

#[test]
fn test_link_drop_abandons_broker_session() {
    let mut device = online_device();

    device.radio.set_connected(false);
    device.uplink.tick();

    assert_eq!(device.uplink.broker().status(), ConnectionStatus::Error);
    assert!(device.client.disconnect_calls() >= 1);
    assert!(!device.uplink.is_online());
}

#[test]
fn test_oversized_credentials_leave_prior_state() {
    let mut device = boot(provisioned_store());
    let link = device.uplink.link_mut();

    assert!(link.set_credentials(&"n".repeat(33), "hunter22").is_err());
    assert!(link.set_credentials("FieldNet", &"s".repeat(65)).is_err());
    assert_eq!(link.identity(), Some("FieldNet"));
}

#[test]
fn test_enabled_intent_survives_restart() {
    let store = provisioned_store();
    {
        let mut device = boot(Arc::clone(&store));
        device.uplink.link_mut().enable();
    }
    assert_eq!(store.get_bool(keys::LINK_ENABLED), Some(true));

    let device = boot(store);
    assert!(device.uplink.link().is_enabled());
    assert_eq!(device.uplink.link().status(), ConnectionStatus::Connecting);
    assert_eq!(device.radio.begin_calls(), 1);
}

#[test]
fn test_disable_discards_queue_and_reports_drops() {
    let mut device = boot(provisioned_store());
    device.uplink.link_mut().enable();
    device.radio.set_connected(true);
    device.uplink.tick();

    device.uplink.publish(&JsonRecord::new(1));
    device.uplink.publish(&JsonRecord::new(2));
    device.uplink.broker_mut().disable();

    assert_eq!(device.uplink.broker().status(), ConnectionStatus::Disabled);
    assert_eq!(device.uplink.broker().pending_count(), 0);
    assert_eq!(
        device.results.results_for(2),
        vec![PublishResult::Queued, PublishResult::Dropped]
    );
    assert_eq!(
        device.uplink.publish(&JsonRecord::new(3)),
        PublishResult::Dropped
    );
}
