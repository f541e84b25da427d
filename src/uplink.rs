//! The publish path a device runs
//!
//! Exactly one implementation is active per device: [`DirectUplink`] drives
//! the local link and broker managers, [`crate::relay::RelayBridge`] forwards
//! everything to a companion chip. Callers see the same interface either way.

use crate::clock::Clock;
use crate::config::UplinkConfig;
use crate::network::broker::BoxedPublishObserver;
use crate::network::status::BoxedStatusObserver;
use crate::network::{BrokerManager, LinkManager, PublishResult};
use crate::provisioning::ProvisioningAdapter;
use crate::record::Record;
use crate::storage::SharedStore;
use crate::transport::{BrokerClient, Radio};
use serde::Serialize;
use tracing::info;

/// Connectivity as seen by the caller
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Connectivity {
    pub link_connected: bool,
    pub broker_connected: bool,
    pub address: Option<String>,
}

pub trait Uplink {
    /// Advance connection state; called by the periodic driver
    fn tick(&mut self);

    fn publish(&mut self, record: &dyn Record) -> PublishResult;

    fn connectivity(&self) -> Connectivity;

    fn is_online(&self) -> bool {
        let connectivity = self.connectivity();
        connectivity.link_connected && connectivity.broker_connected
    }
}

/// Link and broker managers driven from one tick
pub struct DirectUplink<R, B, C> {
    link: LinkManager<R, C>,
    broker: BrokerManager<B, C>,
}

impl<R: Radio, B: BrokerClient, C: Clock> DirectUplink<R, B, C> {
    pub fn link(&self) -> &LinkManager<R, C> {
        &self.link
    }

    pub fn link_mut(&mut self) -> &mut LinkManager<R, C> {
        &mut self.link
    }

    pub fn broker(&self) -> &BrokerManager<B, C> {
        &self.broker
    }

    pub fn broker_mut(&mut self) -> &mut BrokerManager<B, C> {
        &mut self.broker
    }

    /// Provisioning entry point bound to both managers
    pub fn provisioning(&mut self) -> ProvisioningAdapter<'_, R, B, C> {
        ProvisioningAdapter::new(&mut self.link, &mut self.broker)
    }
}

impl<R: Radio, B: BrokerClient, C: Clock> Uplink for DirectUplink<R, B, C> {
    fn tick(&mut self) {
        self.link.tick();
        self.broker.tick(self.link.is_connected());
    }

    fn publish(&mut self, record: &dyn Record) -> PublishResult {
        self.broker.publish_record(record)
    }

    fn connectivity(&self) -> Connectivity {
        Connectivity {
            link_connected: self.link.is_connected(),
            broker_connected: self.broker.is_connected(),
            address: self.link.address(),
        }
    }
}

/// Two-phase construction of a [`DirectUplink`]
///
/// Nothing talks to hardware until [`DirectUplinkBuilder::init`]. The link is
/// constructed and restored first so the broker can see whether it is up.
pub struct DirectUplinkBuilder<R, B, C> {
    config: UplinkConfig,
    radio: R,
    client: B,
    store: SharedStore,
    clock: C,
    link_observer: Option<BoxedStatusObserver>,
    broker_observer: Option<BoxedStatusObserver>,
    publish_observer: Option<BoxedPublishObserver>,
}

impl<R: Radio, B: BrokerClient, C: Clock + Clone> DirectUplinkBuilder<R, B, C> {
    pub fn new(config: UplinkConfig, radio: R, client: B, store: SharedStore, clock: C) -> Self {
        Self {
            config,
            radio,
            client,
            store,
            clock,
            link_observer: None,
            broker_observer: None,
            publish_observer: None,
        }
    }

    pub fn with_link_observer(mut self, observer: BoxedStatusObserver) -> Self {
        self.link_observer = Some(observer);
        self
    }

    pub fn with_broker_observer(mut self, observer: BoxedStatusObserver) -> Self {
        self.broker_observer = Some(observer);
        self
    }

    pub fn with_publish_observer(mut self, observer: BoxedPublishObserver) -> Self {
        self.publish_observer = Some(observer);
        self
    }

    pub fn init(self) -> DirectUplink<R, B, C> {
        let mut link = LinkManager::new(
            self.radio,
            self.clock.clone(),
            self.store.clone(),
            &self.config.link,
        );
        if let Some(observer) = self.link_observer {
            link.set_observer(observer);
        }
        link.init();

        let mut broker = BrokerManager::new(
            self.client,
            self.clock,
            self.store,
            &self.config.broker,
            &self.config.device.id,
        );
        if let Some(observer) = self.broker_observer {
            broker.set_status_observer(observer);
        }
        if let Some(observer) = self.publish_observer {
            broker.set_publish_observer(observer);
        }
        broker.init(link.is_connected());

        info!(
            "Direct uplink ready for {} (link {}, broker {})",
            self.config.device.id,
            link.status(),
            broker.status()
        );
        DirectUplink { link, broker }
    }
}
