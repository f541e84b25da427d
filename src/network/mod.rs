//! Connection state machines for the direct path
//!
//! - [`link`] - local-area link with bounded reconnection
//! - [`broker`] - broker session, publish path and retry queue ownership
//! - [`retry_queue`] - bounded delivery queue policy
//! - [`backoff`] - pure doubling backoff state
//! - [`status`] - five-state status and observer plumbing
//! - [`topics`] - topic builders

pub mod backoff;
pub mod broker;
pub mod link;
pub mod retry_queue;
pub mod status;
pub mod topics;

pub use backoff::{ReconnectConfig, ReconnectDecision, ReconnectState};
pub use broker::{BrokerConfig, BrokerManager, PublishObserver, PublishResult};
pub use link::{Credentials, LinkManager};
pub use retry_queue::{DrainOutcome, PendingPublish, RetryQueue};
pub use status::{ConnectionStatus, StatusObserver};
pub use topics::TopicBuilder;
