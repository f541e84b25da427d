//! Connection status shared by the link and broker managers

use serde::Serialize;
use std::fmt;

/// Five-state connection status
///
/// `Disabled` is entered only by an explicit disable and left only by an
/// explicit enable. Every other transition is driven by `tick()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStatus {
    Disabled,
    Disconnected,
    Connecting,
    Connected,
    Error,
}

impl ConnectionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionStatus::Disabled => "disabled",
            ConnectionStatus::Disconnected => "disconnected",
            ConnectionStatus::Connecting => "connecting",
            ConnectionStatus::Connected => "connected",
            ConnectionStatus::Error => "error",
        }
    }

    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionStatus::Connected)
    }
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Receives status changes from one manager
pub trait StatusObserver {
    fn on_status_change(&mut self, status: ConnectionStatus);
}

impl<F> StatusObserver for F
where
    F: FnMut(ConnectionStatus),
{
    fn on_status_change(&mut self, status: ConnectionStatus) {
        self(status)
    }
}

pub type BoxedStatusObserver = Box<dyn StatusObserver + Send>;

/// Current status plus its notification policy
///
/// Changes made outside a tick notify immediately. Changes made between
/// `begin_tick` and `end_tick` are coalesced into at most one notification
/// carrying the final value.
pub struct StatusTracker {
    current: ConnectionStatus,
    tick_start: Option<ConnectionStatus>,
    observer: Option<BoxedStatusObserver>,
}

impl StatusTracker {
    pub fn new(initial: ConnectionStatus) -> Self {
        Self {
            current: initial,
            tick_start: None,
            observer: None,
        }
    }

    pub fn set_observer(&mut self, observer: BoxedStatusObserver) {
        self.observer = Some(observer);
    }

    pub fn get(&self) -> ConnectionStatus {
        self.current
    }

    pub fn set(&mut self, status: ConnectionStatus) {
        if self.current == status {
            return;
        }
        self.current = status;
        if self.tick_start.is_none() {
            self.notify();
        }
    }

    pub fn begin_tick(&mut self) {
        self.tick_start = Some(self.current);
    }

    pub fn end_tick(&mut self) {
        if let Some(start) = self.tick_start.take() {
            if start != self.current {
                self.notify();
            }
        }
    }

    fn notify(&mut self) {
        let status = self.current;
        if let Some(observer) = self.observer.as_mut() {
            observer.on_status_change(status);
        }
    }
}

impl fmt::Debug for StatusTracker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StatusTracker")
            .field("current", &self.current)
            .field("has_observer", &self.observer.is_some())
            .finish()
    }
}
