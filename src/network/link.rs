//! Local-area link management
//!
//! `enabled` is the persisted intent and survives restarts. `status` is
//! derived from the radio on every tick. Keeping them apart lets callers tell
//! "turned off" from "trying and failing".

use crate::clock::{elapsed_ms, Clock};
use crate::config::LinkSection;
use crate::error::{UplinkError, UplinkResult};
use crate::network::backoff::{ReconnectDecision, ReconnectState};
use crate::network::status::{BoxedStatusObserver, ConnectionStatus, StatusTracker};
use crate::storage::{keys, write_group, SharedStore, StoredValue};
use crate::transport::Radio;
use std::fmt;
use tracing::{debug, error, info, warn};

pub const MAX_IDENTITY_LEN: usize = 32;
pub const MAX_SECRET_LEN: usize = 64;

/// Network credentials
#[derive(Clone, PartialEq)]
pub struct Credentials {
    identity: String,
    secret: String,
}

impl Credentials {
    /// Validate and build; both fields must be non-empty and within bounds
    pub fn new(identity: impl Into<String>, secret: impl Into<String>) -> UplinkResult<Self> {
        let identity = identity.into();
        let secret = secret.into();

        if identity.is_empty() || identity.len() > MAX_IDENTITY_LEN {
            return Err(UplinkError::config_invalid(format!(
                "network identity must be 1-{MAX_IDENTITY_LEN} bytes, got {}",
                identity.len()
            )));
        }
        if secret.is_empty() || secret.len() > MAX_SECRET_LEN {
            return Err(UplinkError::config_invalid(format!(
                "network secret must be 1-{MAX_SECRET_LEN} bytes, got {}",
                secret.len()
            )));
        }

        Ok(Self { identity, secret })
    }

    pub fn identity(&self) -> &str {
        &self.identity
    }

    pub fn secret(&self) -> &str {
        &self.secret
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("identity", &self.identity)
            .field("secret", &"<redacted>")
            .finish()
    }
}

pub struct LinkManager<R, C> {
    radio: R,
    clock: C,
    store: SharedStore,
    connection_timeout_ms: u32,
    credentials: Option<Credentials>,
    enabled: bool,
    status: StatusTracker,
    reconnect: ReconnectState,
    connect_started: u32,
}

impl<R: Radio, C: Clock> LinkManager<R, C> {
    /// Construct from persisted state. Call [`LinkManager::init`] afterwards.
    pub fn new(radio: R, clock: C, store: SharedStore, settings: &LinkSection) -> Self {
        let credentials = match (
            store.get_string(keys::LINK_IDENTITY),
            store.get_string(keys::LINK_SECRET),
        ) {
            (Some(identity), Some(secret)) => match Credentials::new(identity, secret) {
                Ok(credentials) => Some(credentials),
                Err(e) => {
                    warn!("Ignoring stored network credentials: {}", e);
                    None
                }
            },
            _ => None,
        };

        Self {
            radio,
            clock,
            store,
            connection_timeout_ms: settings.connection_timeout_ms,
            credentials,
            enabled: false,
            status: StatusTracker::new(ConnectionStatus::Disabled),
            reconnect: ReconnectState::new(settings.reconnect_config()),
            connect_started: 0,
        }
    }

    pub fn set_observer(&mut self, observer: BoxedStatusObserver) {
        self.status.set_observer(observer);
    }

    /// Restore the persisted intent
    pub fn init(&mut self) {
        let persisted = self.store.get_bool(keys::LINK_ENABLED).unwrap_or(false);
        info!(
            "Link init: persisted_enabled={}, has_credentials={}",
            persisted,
            self.has_credentials()
        );
        if persisted && self.has_credentials() {
            self.enable();
        }
    }

    /// Validate, persist, then adopt new credentials without reconnecting
    pub fn set_credentials(&mut self, identity: &str, secret: &str) -> UplinkResult<()> {
        let credentials = Credentials::new(identity, secret)?;

        write_group(
            &*self.store,
            &[
                (
                    keys::LINK_IDENTITY,
                    Some(StoredValue::String(credentials.identity().to_string())),
                ),
                (
                    keys::LINK_SECRET,
                    Some(StoredValue::String(credentials.secret().to_string())),
                ),
            ],
        )?;

        info!("Network credentials updated for {}", credentials.identity());
        self.credentials = Some(credentials);
        self.reconnect.reset();
        Ok(())
    }

    /// Forget credentials everywhere and turn the link off
    pub fn clear_credentials(&mut self) -> UplinkResult<()> {
        if self.enabled {
            self.disable();
        }
        self.store.remove(keys::LINK_IDENTITY)?;
        self.store.remove(keys::LINK_SECRET)?;
        self.credentials = None;
        info!("Network credentials cleared");
        Ok(())
    }

    /// Start connecting; from `Error` this also restores a spent reconnect budget
    pub fn enable(&mut self) {
        let active = matches!(
            self.status.get(),
            ConnectionStatus::Connecting | ConnectionStatus::Connected
        );
        if self.enabled && active {
            debug!("Link already enabled");
            return;
        }

        let Some(credentials) = self.credentials.clone() else {
            warn!("Cannot enable link: no credentials configured");
            self.status.set(ConnectionStatus::Error);
            return;
        };

        self.enabled = true;
        self.persist_enabled(true);
        self.reconnect.reset();
        info!("Link enabled, connecting to {}", credentials.identity());
        self.start_connect(&credentials);
    }

    pub fn disable(&mut self) {
        self.enabled = false;
        self.radio.disconnect(true);
        self.persist_enabled(false);
        self.status.set(ConnectionStatus::Disabled);
        info!("Link disabled");
    }

    pub fn tick(&mut self) {
        if !self.enabled {
            return;
        }

        self.status.begin_tick();
        let now = self.clock.now_ms();

        match self.status.get() {
            ConnectionStatus::Connecting => {
                if self.radio.is_connected() {
                    info!(
                        "Link connected, address {}",
                        self.radio.address().unwrap_or_default()
                    );
                    self.status.set(ConnectionStatus::Connected);
                    self.reconnect.reset();
                } else if elapsed_ms(now, self.connect_started) > self.connection_timeout_ms {
                    warn!(
                        "Link connection timed out after {}ms",
                        self.connection_timeout_ms
                    );
                    self.radio.disconnect(false);
                    self.status.set(ConnectionStatus::Disconnected);
                    self.reconnect_if_due(now);
                }
            }
            ConnectionStatus::Connected => {
                if !self.radio.is_connected() {
                    warn!("Link lost");
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

    fn reconnect_if_due(&mut self, now: u32) {
        match self.reconnect.poll(now) {
            ReconnectDecision::Wait => {}
            ReconnectDecision::Exhausted => {
                if self.status.get() != ConnectionStatus::Error {
                    error!(
                        "Link reconnect budget spent after {} attempts",
                        self.reconnect.attempt_count()
                    );
                }
                self.status.set(ConnectionStatus::Error);
            }
            ReconnectDecision::Attempt(attempt) => {
                let Some(credentials) = self.credentials.clone() else {
                    self.status.set(ConnectionStatus::Error);
                    return;
                };
                info!(
                    "Link reconnect attempt {} (next interval {}ms)",
                    attempt,
                    self.reconnect.current_interval()
                );
                self.start_connect(&credentials);
            }
        }
    }

    fn start_connect(&mut self, credentials: &Credentials) {
        let now = self.clock.now_ms();
        self.connect_started = now;
        if self.reconnect.attempt_count() == 0 {
            self.reconnect.mark_started(now);
        }

        match self.radio.begin(credentials.identity(), credentials.secret()) {
            Ok(()) => self.status.set(ConnectionStatus::Connecting),
            Err(e) => {
                warn!("Radio refused connection attempt: {}", e);
                self.status.set(ConnectionStatus::Disconnected);
            }
        }
    }

    fn persist_enabled(&self, enabled: bool) {
        if let Err(e) = self.store.set_bool(keys::LINK_ENABLED, enabled) {
            error!("Failed to persist link enabled flag: {}", e);
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

    pub fn has_credentials(&self) -> bool {
        self.credentials.is_some()
    }

    pub fn identity(&self) -> Option<&str> {
        self.credentials.as_ref().map(Credentials::identity)
    }

    /// Local address, only while connected
    pub fn address(&self) -> Option<String> {
        if self.is_connected() {
            self.radio.address()
        } else {
            None
        }
    }

    /// Signal strength in dBm while connected, 0 otherwise
    pub fn signal_strength(&self) -> i32 {
        if self.is_connected() {
            self.radio.signal_strength()
        } else {
            0
        }
    }

    pub fn radio(&self) -> &R {
        &self.radio
    }
}

impl<R, C> fmt::Debug for LinkManager<R, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LinkManager")
            .field("enabled", &self.enabled)
            .field("status", &self.status.get())
            .field("credentials", &self.credentials)
            .finish()
    }
}
