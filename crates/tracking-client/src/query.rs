//! Request/response correlation for point queries.
//!
//! Each request carries a fresh ack id and parks a oneshot sender in
//! the pending table. The sender is consumed by the first matching ack,
//! so a query resolves at most once; a late ack for an abandoned id is
//! ignored.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::oneshot;
use tokio::time::timeout;
use tracing::{debug, warn};
use tracking_core::{ClientMessage, DriverId, DriverLocationReply, OnlineDriversReply};
use tracking_protocol::ClientFrame;

use crate::connection::ConnectionManager;
use crate::error::TrackingError;

/// Pending acknowledgements keyed by ack id.
#[derive(Default)]
pub(crate) struct Correlator {
    next_id: AtomicU64,
    pending: Mutex<HashMap<u64, oneshot::Sender<Value>>>,
}

impl Correlator {
    fn register(&self) -> (u64, oneshot::Receiver<Value>) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        let (tx, rx) = oneshot::channel();
        self.pending.lock().insert(id, tx);
        (id, rx)
    }

    fn forget(&self, id: u64) {
        self.pending.lock().remove(&id);
    }

    /// Hand `payload` to the waiting query. `false` if nobody is waiting.
    pub(crate) fn resolve(&self, id: u64, payload: Value) -> bool {
        match self.pending.lock().remove(&id) {
            Some(tx) => tx.send(payload).is_ok(),
            None => false,
        }
    }

    /// Abandon every pending query; waiters resolve as "not found".
    pub(crate) fn fail_all(&self) {
        self.pending.lock().clear();
    }

    pub(crate) fn pending_count(&self) -> usize {
        self.pending.lock().len()
    }
}

impl ConnectionManager {
    /// Latest location and presence for one driver.
    ///
    /// Resolves to the "not found" shape when disconnected, on timeout,
    /// on connection loss, or on a malformed reply. A found location is
    /// written through to the cache.
    pub async fn get_driver_location(&self, driver_id: DriverId) -> DriverLocationReply {
        let reply: Option<DriverLocationReply> = self
            .request("getDriverLocation", ClientMessage::get_driver_location(driver_id))
            .await;

        let Some(reply) = reply else {
            return DriverLocationReply::not_found();
        };

        let DriverLocationReply { location, is_online } = reply;
        match location {
            Some(loc) => match loc.validate() {
                Ok(()) => {
                    let loc = loc.with_presence(is_online);
                    self.store(loc.clone());
                    DriverLocationReply {
                        location: Some(loc),
                        is_online,
                    }
                }
                Err(e) => {
                    let e = TrackingError::ProtocolViolation(e.to_string());
                    warn!("getDriverLocation reply dropped: {}", e);
                    DriverLocationReply::not_found()
                }
            },
            None => DriverLocationReply {
                location: None,
                is_online,
            },
        }
    }

    /// Every online driver. Empty when disconnected or on failure.
    pub async fn get_online_drivers(&self) -> OnlineDriversReply {
        let reply: Option<OnlineDriversReply> = self
            .request("getOnlineDrivers", ClientMessage::GetOnlineDrivers)
            .await;

        let Some(reply) = reply else {
            return OnlineDriversReply::default();
        };

        let drivers = reply
            .drivers
            .into_iter()
            .filter(|loc| match loc.validate() {
                Ok(()) => true,
                Err(e) => {
                    warn!("Dropping roster entry for driver {}: {}", loc.driver_id, e);
                    false
                }
            })
            .collect::<Vec<_>>();

        for loc in &drivers {
            self.store(loc.clone());
        }

        OnlineDriversReply { drivers }
    }

    /// Number of queries still waiting for an acknowledgement.
    pub fn pending_queries(&self) -> usize {
        self.inner.queries.pending_count()
    }

    async fn request<T: DeserializeOwned>(
        &self,
        query: &'static str,
        message: ClientMessage,
    ) -> Option<T> {
        if !self.is_connected() {
            debug!("{} skipped: not connected", query);
            return None;
        }

        let queries = &self.inner.queries;
        let (id, rx) = queries.register();
        if let Err(e) = self.send_frame(ClientFrame::request(id, message)) {
            queries.forget(id);
            debug!("{} not sent: {}", query, e);
            return None;
        }

        let waited = self.config().query_timeout();
        match timeout(waited, rx).await {
            Ok(Ok(payload)) => match serde_json::from_value::<T>(payload) {
                Ok(reply) => Some(reply),
                Err(e) => {
                    warn!("{} reply dropped: {}", query, TrackingError::from(e));
                    None
                }
            },
            Ok(Err(_)) => {
                debug!("{} abandoned: connection closed", query);
                None
            }
            Err(_) => {
                queries.forget(id);
                warn!("{}", TrackingError::QueryTimeout { query, waited });
                None
            }
        }
    }
}
