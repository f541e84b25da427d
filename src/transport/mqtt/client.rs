//! Impure I/O side of the broker client
//!
//! `BrokerClient` is a poll-style trait, so the rumqttc event loop runs in a
//! background task and publishes its view of the session through a shared
//! flag. Each session gets a fresh flag so a stale task can never mark a new
//! session as connected.

use super::message_handler::{route_mqtt_event, SessionEvent};
use crate::transport::{BrokerClient, ConnectOptions, TransportError};
use rumqttc::{AsyncClient, EventLoop, LastWill, MqttOptions, QoS};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Request channel depth between the client handle and the event loop
const REQUEST_CAPACITY: usize = 16;

/// Build rumqttc options from connect options (pure function)
pub fn configure_mqtt_options(options: &ConnectOptions) -> MqttOptions {
    let mut mqtt_options =
        MqttOptions::new(options.client_id.clone(), options.host.clone(), options.port);
    mqtt_options.set_keep_alive(Duration::from_secs(u64::from(options.keep_alive_secs.max(5))));
    mqtt_options.set_clean_session(true);

    if let Some(username) = options.username.as_deref().filter(|u| !u.is_empty()) {
        let password = options.password.clone().unwrap_or_default();
        mqtt_options.set_credentials(username, password);
    }

    mqtt_options.set_last_will(LastWill::new(
        options.last_will.topic.clone(),
        options.last_will.payload.clone().into_bytes(),
        QoS::AtLeastOnce,
        options.last_will.retain,
    ));

    mqtt_options
}

/// Broker client driven by a rumqttc event loop on a tokio runtime
pub struct MqttBrokerClient {
    runtime: Handle,
    client: Option<AsyncClient>,
    event_loop_handle: Option<JoinHandle<()>>,
    connected: Arc<AtomicBool>,
}

impl MqttBrokerClient {
    pub fn new(runtime: Handle) -> Self {
        Self {
            runtime,
            client: None,
            event_loop_handle: None,
            connected: Arc::new(AtomicBool::new(false)),
        }
    }

    fn stop_event_loop(&mut self) {
        self.connected.store(false, Ordering::SeqCst);
        if let Some(handle) = self.event_loop_handle.take() {
            handle.abort();
        }
    }

    /// Poll the event loop until the session ends or fails
    async fn run_event_loop(mut event_loop: EventLoop, connected: Arc<AtomicBool>) {
        loop {
            match event_loop.poll().await {
                Ok(event) => match route_mqtt_event(&event) {
                    SessionEvent::Established => {
                        info!(target: "mqtt_transport", "Broker session established");
                        connected.store(true, Ordering::SeqCst);
                    }
                    SessionEvent::Refused(code) => {
                        warn!(target: "mqtt_transport", "Broker refused session: {}", code);
                        connected.store(false, Ordering::SeqCst);
                        break;
                    }
                    SessionEvent::Closed => {
                        info!(target: "mqtt_transport", "Broker session closed");
                        connected.store(false, Ordering::SeqCst);
                        break;
                    }
                    SessionEvent::Traffic(description) => {
                        debug!(target: "mqtt_transport", "MQTT event: {}", description);
                    }
                },
                Err(e) => {
                    warn!(target: "mqtt_transport", "MQTT event loop error: {}", e);
                    connected.store(false, Ordering::SeqCst);
                    break;
                }
            }
        }
    }
}

impl BrokerClient for MqttBrokerClient {
    fn begin_connection(&mut self, options: &ConnectOptions) -> Result<(), TransportError> {
        self.stop_event_loop();

        let mqtt_options = configure_mqtt_options(options);
        let (client, event_loop) = AsyncClient::new(mqtt_options, REQUEST_CAPACITY);

        let connected = Arc::new(AtomicBool::new(false));
        self.connected = Arc::clone(&connected);
        self.event_loop_handle = Some(
            self.runtime
                .spawn(Self::run_event_loop(event_loop, connected)),
        );
        self.client = Some(client);

        debug!(
            target: "mqtt_transport",
            "Connecting to {}:{} as {}", options.host, options.port, options.client_id
        );
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn disconnect(&mut self) {
        if let Some(client) = self.client.take() {
            if let Err(e) = client.try_disconnect() {
                debug!(target: "mqtt_transport", "Disconnect request not queued: {}", e);
            }
        }
        self.stop_event_loop();
    }

    fn publish(&mut self, topic: &str, payload: &[u8], retain: bool) -> Result<(), TransportError> {
        if !self.is_connected() {
            return Err(TransportError::Unavailable("broker session not established".into()));
        }
        let client = self
            .client
            .as_ref()
            .ok_or_else(|| TransportError::Unavailable("no broker session".into()))?;

        client
            .try_publish(topic, QoS::AtLeastOnce, retain, payload.to_vec())
            .map_err(|e| TransportError::Rejected(e.to_string()))
    }
}

impl Drop for MqttBrokerClient {
    fn drop(&mut self) {
        self.stop_event_loop();
    }
}
