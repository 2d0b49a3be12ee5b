//! Subscription registry: turns "I want updates for target T" into
//! outbound subscribe messages plus local push listeners.
//!
//! The registry keeps no memory of past subscriptions; replaying them
//! after a reconnect is the tracker's job.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;
use tracking_core::{ClientMessage, DriverId, DriverLocation};

use crate::connection::ConnectionManager;
use crate::event_bus::invoke_isolated;

/// Callback for pushed location samples.
pub type LocationHandler = Arc<dyn Fn(&DriverLocation) + Send + Sync>;

/// Which push stream a listener is attached to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scope {
    /// `driverLocationUpdate` for one driver.
    Driver(DriverId),
    /// Unscoped `locationUpdate` stream.
    All,
}

/// Local listener table keyed by push scope.
#[derive(Default)]
pub(crate) struct PushListeners {
    next_id: AtomicU64,
    table: Mutex<HashMap<Scope, Vec<(u64, LocationHandler)>>>,
}

impl PushListeners {
    pub(crate) fn attach(&self, scope: Scope, handler: LocationHandler) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.table.lock().entry(scope).or_default().push((id, handler));
        id
    }

    /// Remove one listener; returns how many remain on that scope.
    pub(crate) fn detach(&self, scope: Scope, id: u64) -> usize {
        let mut table = self.table.lock();
        let remaining = match table.get_mut(&scope) {
            Some(list) => {
                list.retain(|(lid, _)| *lid != id);
                list.len()
            }
            None => 0,
        };
        if remaining == 0 {
            table.remove(&scope);
        }
        remaining
    }

    pub(crate) fn notify(&self, scope: Scope, location: &DriverLocation) {
        let snapshot: Vec<LocationHandler> = {
            let table = self.table.lock();
            table
                .get(&scope)
                .map(|list| list.iter().map(|(_, h)| h.clone()).collect())
                .unwrap_or_default()
        };

        for handler in snapshot {
            invoke_isolated("location listener", || handler(location));
        }
    }

    pub(crate) fn count(&self, scope: Scope) -> usize {
        self.table.lock().get(&scope).map_or(0, Vec::len)
    }

    pub(crate) fn clear(&self) {
        self.table.lock().clear();
    }
}

/// Issues subscriptions on a connection manager.
#[derive(Clone)]
pub struct SubscriptionRegistry {
    manager: ConnectionManager,
}

impl SubscriptionRegistry {
    pub fn new(manager: ConnectionManager) -> Self {
        Self { manager }
    }

    /// Send `subscribeToDriver` and attach `on_update` to that driver's pushes.
    ///
    /// While disconnected only the listener is attached; the caller is
    /// expected to subscribe again once connected.
    pub fn subscribe_to_driver(
        &self,
        driver_id: DriverId,
        on_update: LocationHandler,
    ) -> Subscription {
        let scope = Scope::Driver(driver_id);
        let listener_id = self.manager.inner.listeners.attach(scope, on_update);

        match self.manager.send(ClientMessage::subscribe(driver_id)) {
            Ok(()) => debug!("Subscribed to driver {}", driver_id),
            Err(e) => debug!("Subscribe to driver {} not sent: {}", driver_id, e),
        }

        Subscription::new(self.manager.clone(), scope, listener_id)
    }

    /// Attach `on_update` to the unscoped stream. The server broadcasts it
    /// to every client, so nothing is sent.
    pub fn subscribe_to_all(&self, on_update: LocationHandler) -> Subscription {
        let listener_id = self.manager.inner.listeners.attach(Scope::All, on_update);
        Subscription::new(self.manager.clone(), Scope::All, listener_id)
    }

    /// Listeners currently attached to `scope`.
    pub fn listener_count(&self, scope: Scope) -> usize {
        self.manager.inner.listeners.count(scope)
    }
}

/// Active subscription. Cancelled by [`Subscription::cancel`] or on drop.
pub struct Subscription {
    manager: ConnectionManager,
    scope: Scope,
    listener_id: u64,
    active: AtomicBool,
}

impl Subscription {
    fn new(manager: ConnectionManager, scope: Scope, listener_id: u64) -> Self {
        Self {
            manager,
            scope,
            listener_id,
            active: AtomicBool::new(true),
        }
    }

    pub fn scope(&self) -> Scope {
        self.scope
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// Detach the listener and, for a driver scope with no other local
    /// listeners left, send `unsubscribeFromDriver`. Later calls are no-ops.
    pub fn cancel(&self) {
        if !self.active.swap(false, Ordering::SeqCst) {
            return;
        }

        let remaining = self.manager.inner.listeners.detach(self.scope, self.listener_id);

        if let Scope::Driver(driver_id) = self.scope {
            // The server keeps one subscription per client, not per listener.
            if remaining == 0 && self.manager.is_connected() {
                if let Err(e) = self.manager.send(ClientMessage::unsubscribe(driver_id)) {
                    debug!("Unsubscribe from driver {} not sent: {}", driver_id, e);
                }
            }
        }
    }

    /// Detach the local listener only. Used once the server side of the
    /// subscription is already gone with its link.
    pub(crate) fn release(&self) {
        if self.active.swap(false, Ordering::SeqCst) {
            self.manager.inner.listeners.detach(self.scope, self.listener_id);
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.cancel();
    }
}
