//! tracking-client
//!
//! Client engine for real-time driver presence and location tracking:
//! - [`connection`]   : single multiplexed channel, reconnect with backoff
//! - [`event_bus`]    : typed in-process pub/sub for cross-cutting signals
//! - [`subscription`] : per-driver / all-drivers push subscriptions
//! - [`cache`]        : latest-known location per driver
//! - `query`          : point queries with ack correlation
//! - [`tracker`]      : per-consumer view (single driver or fleet)

pub mod cache;
pub mod config;
pub mod connection;
pub mod error;
pub mod event_bus;
mod query;
pub mod reporter;
pub mod subscription;
pub mod tracker;
pub mod transport;

pub use cache::LocationCache;
pub use config::ClientConfig;
pub use connection::{ConnectionManager, ConnectionState, WeakConnectionManager};
pub use error::TrackingError;
pub use event_bus::{BusEvent, EventBus, EventKind, Handler};
pub use subscription::{LocationHandler, Scope, Subscription, SubscriptionRegistry};
pub use tracker::{Tracker, TrackerPhase, TrackingTarget};
pub use transport::{Connector, Link, TcpConnector};
