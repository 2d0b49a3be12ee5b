//! Tracker: the per-consumer view over shared tracking state.
//!
//! A tracker is bound either to one driver or to the whole fleet. It
//! never copies cache data; every read goes to the manager's cache. Its
//! own state is the subscription lifecycle:
//!
//! ```text
//! Idle ──connect()──► Connecting ──connectionChange(true)──► Subscribed
//!                         ▲                                     │
//!                         └──────── connectionChange(false) ────┘
//!
//! any ──close()──► TornDown
//! ```
//!
//! Entering `Subscribed` issues exactly one fresh subscription per
//! connection, so pushes resume after every reconnect.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use tracking_core::{DriverId, DriverLocation};

use crate::connection::{ConnectionManager, WeakConnectionManager};
use crate::error::TrackingError;
use crate::event_bus::{BusEvent, EventKind, Handler};
use crate::subscription::{LocationHandler, Subscription, SubscriptionRegistry};

const WATCHED_EVENTS: [EventKind; 3] = [
    EventKind::ConnectionChange,
    EventKind::Presence,
    EventKind::LocationChanged,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackingTarget {
    Driver(DriverId),
    Fleet,
}

impl TrackingTarget {
    fn covers(self, driver_id: DriverId) -> bool {
        match self {
            TrackingTarget::Driver(id) => id == driver_id,
            TrackingTarget::Fleet => true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackerPhase {
    Idle,
    Connecting,
    Subscribed,
    TornDown,
}

struct TrackerState {
    phase: TrackerPhase,
    is_loading: bool,
    error: Option<TrackingError>,
    subscription: Option<Subscription>,
    /// Set by the first successful connection; the bootstrap timeout
    /// no longer applies after that.
    connected_once: bool,
    /// Bumped on every connection loss. A subscription issued under an
    /// older epoch belongs to a dead link.
    epoch: u64,
}

struct Shared {
    state: Mutex<TrackerState>,
    version: watch::Sender<u64>,
}

impl Shared {
    fn bump(&self) {
        self.version.send_modify(|v| *v = v.wrapping_add(1));
    }
}

pub struct Tracker {
    manager: ConnectionManager,
    target: TrackingTarget,
    shared: Arc<Shared>,
    handler: Handler,
    bootstrap: Mutex<Option<JoinHandle<()>>>,
    closed: AtomicBool,
}

impl Tracker {
    /// Bind a tracker to `target` and start connecting.
    ///
    /// If the manager is already connected the subscription is issued
    /// immediately. Must be called within a tokio runtime.
    pub fn new(manager: &ConnectionManager, target: TrackingTarget) -> Self {
        let (version, _) = watch::channel(0u64);
        let shared = Arc::new(Shared {
            state: Mutex::new(TrackerState {
                phase: TrackerPhase::Idle,
                is_loading: true,
                error: None,
                subscription: None,
                connected_once: false,
                epoch: 0,
            }),
            version,
        });

        let handler: Handler = {
            let weak_shared = Arc::downgrade(&shared);
            let weak_manager = manager.downgrade();
            Arc::new(move |event: &BusEvent| {
                if let Some((shared, manager)) = upgrade(&weak_shared, &weak_manager) {
                    handle_event(&shared, &manager, target, event);
                }
            })
        };
        for kind in WATCHED_EVENTS {
            manager.bus().on(kind, handler.clone());
        }

        {
            // A connectionChange delivered since registration may have moved on.
            let mut st = shared.state.lock();
            if st.phase == TrackerPhase::Idle {
                st.phase = TrackerPhase::Connecting;
            }
        }
        manager.connect();
        if manager.is_connected() {
            enter_subscribed(&shared, manager, target);
        }

        let bootstrap = tokio::spawn(watch_bootstrap(
            Arc::downgrade(&shared),
            manager.downgrade(),
        ));

        Self {
            manager: manager.clone(),
            target,
            shared,
            handler,
            bootstrap: Mutex::new(Some(bootstrap)),
            closed: AtomicBool::new(false),
        }
    }

    pub fn target(&self) -> TrackingTarget {
        self.target
    }

    pub fn phase(&self) -> TrackerPhase {
        self.shared.state.lock().phase
    }

    pub fn is_connected(&self) -> bool {
        self.manager.is_connected()
    }

    /// True until the first connection outcome (or the bootstrap timeout).
    pub fn is_loading(&self) -> bool {
        self.shared.state.lock().is_loading
    }

    pub fn error(&self) -> Option<TrackingError> {
        self.shared.state.lock().error.clone()
    }

    /// Latest record for the bound driver; `None` in fleet mode.
    pub fn location(&self) -> Option<DriverLocation> {
        match self.target {
            TrackingTarget::Driver(id) => self.manager.cache().get(id),
            TrackingTarget::Fleet => None,
        }
    }

    /// Snapshot of the full cache.
    pub fn all_locations(&self) -> Vec<DriverLocation> {
        self.manager.cache().all()
    }

    /// Cache read, never touches the network.
    pub fn is_driver_online(&self, driver_id: DriverId) -> bool {
        self.manager.cache().is_online(driver_id)
    }

    /// Cache read, never touches the network.
    pub fn driver_location(&self, driver_id: DriverId) -> Option<DriverLocation> {
        self.manager.cache().get(driver_id)
    }

    /// Receiver that changes whenever a re-read may produce something new.
    pub fn changes(&self) -> watch::Receiver<u64> {
        self.shared.version.subscribe()
    }

    /// Re-query the server for the bound target (read-through into the cache).
    pub async fn refresh(&self) {
        match self.target {
            TrackingTarget::Driver(id) => {
                self.manager.get_driver_location(id).await;
            }
            TrackingTarget::Fleet => {
                self.manager.get_online_drivers().await;
            }
        }
        self.shared.bump();
    }

    /// Cancel the subscription and detach from the bus. Idempotent.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }

        for kind in WATCHED_EVENTS {
            self.manager.bus().off(kind, &self.handler);
        }
        if let Some(task) = self.bootstrap.lock().take() {
            task.abort();
        }

        let stale = {
            let mut st = self.shared.state.lock();
            st.phase = TrackerPhase::TornDown;
            st.is_loading = false;
            st.subscription.take()
        };
        drop(stale);

        debug!("Tracker for {:?} torn down", self.target);
        self.shared.bump();
    }
}

impl Drop for Tracker {
    fn drop(&mut self) {
        self.close();
    }
}

fn upgrade(
    shared: &Weak<Shared>,
    manager: &WeakConnectionManager,
) -> Option<(Arc<Shared>, ConnectionManager)> {
    Some((shared.upgrade()?, manager.upgrade()?))
}

fn handle_event(
    shared: &Arc<Shared>,
    manager: &ConnectionManager,
    target: TrackingTarget,
    event: &BusEvent,
) {
    match event {
        BusEvent::ConnectionChange(true) => enter_subscribed(shared, manager, target),
        BusEvent::ConnectionChange(false) => enter_connecting(shared),
        BusEvent::Presence { driver_id, .. } | BusEvent::LocationChanged(driver_id) => {
            if target.covers(*driver_id) {
                shared.bump();
            }
        }
        BusEvent::Stats(_) => {}
    }
}

/// Transition action on `connectionChange(true)`: replay the subscription.
fn enter_subscribed(shared: &Arc<Shared>, manager: &ConnectionManager, target: TrackingTarget) {
    let Some(epoch) = begin_subscribe(shared) else {
        // Torn down, or already subscribed on this connection.
        shared.bump();
        return;
    };

    let on_update: LocationHandler = {
        let weak = Arc::downgrade(shared);
        Arc::new(move |_: &DriverLocation| {
            if let Some(shared) = weak.upgrade() {
                shared.bump();
            }
        })
    };

    let registry = SubscriptionRegistry::new(manager.clone());
    let subscription = match target {
        TrackingTarget::Driver(id) => registry.subscribe_to_driver(id, on_update),
        TrackingTarget::Fleet => registry.subscribe_to_all(on_update),
    };

    finish_subscribe(shared, epoch, subscription);
    shared.bump();
}

/// Claim the `Subscribed` phase for the current epoch. `None` if another
/// caller already holds it or the tracker is closed.
fn begin_subscribe(shared: &Shared) -> Option<u64> {
    let mut st = shared.state.lock();
    if st.phase == TrackerPhase::TornDown {
        return None;
    }
    st.is_loading = false;
    st.error = None;
    st.connected_once = true;
    if st.phase == TrackerPhase::Subscribed {
        return None;
    }
    st.phase = TrackerPhase::Subscribed;
    Some(st.epoch)
}

/// Store `subscription` unless the link it was issued on is gone.
fn finish_subscribe(shared: &Shared, epoch: u64, subscription: Subscription) -> bool {
    let mut st = shared.state.lock();
    if st.phase == TrackerPhase::TornDown || st.epoch != epoch {
        drop(st);
        subscription.release();
        return false;
    }
    let stale = st.subscription.replace(subscription);
    drop(st);

    if let Some(stale) = stale {
        stale.release();
    }
    true
}

/// Transition action on `connectionChange(false)`: the server has dropped
/// our subscription, so drop the local side too.
fn enter_connecting(shared: &Arc<Shared>) {
    let stale = {
        let mut st = shared.state.lock();
        if st.phase == TrackerPhase::TornDown {
            return;
        }
        st.is_loading = false;
        st.phase = TrackerPhase::Connecting;
        st.epoch += 1;
        st.subscription.take()
    };
    if let Some(stale) = stale {
        stale.release();
    }

    shared.bump();
}

async fn watch_bootstrap(shared: Weak<Shared>, manager: WeakConnectionManager) {
    let waited = match manager.upgrade() {
        Some(manager) => manager.config().bootstrap_timeout(),
        None => return,
    };
    tokio::time::sleep(waited).await;

    let Some((shared, manager)) = upgrade(&shared, &manager) else {
        return;
    };
    if manager.is_connected() {
        return;
    }

    {
        let mut st = shared.state.lock();
        if st.phase == TrackerPhase::TornDown || st.connected_once {
            return;
        }
        st.is_loading = false;
        st.error = Some(TrackingError::ConnectTimeout { waited });
    }
    warn!("No connection to tracking service after {:?}", waited);
    shared.bump();
}
