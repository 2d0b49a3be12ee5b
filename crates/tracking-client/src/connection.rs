// crates/tracking-client/src/connection.rs

//! Connection manager: owns the single logical channel to the tracking
//! namespace.
//!
//! One background task per connect cycle runs the attempt / pump /
//! reconnect loop. Each cycle carries a generation number; once
//! `disconnect()` bumps the generation, work from the old cycle can no
//! longer change state or emit events.

use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, sleep, timeout, Instant, Interval};
use tracing::{debug, error, info, warn};
use tracking_core::{ClientMessage, DriverId, DriverLocation, ServerMessage};
use tracking_protocol::{ClientFrame, ServerFrame};

use crate::cache::LocationCache;
use crate::config::ClientConfig;
use crate::error::{Result, TrackingError};
use crate::event_bus::{BusEvent, EventBus};
use crate::query::Correlator;
use crate::subscription::{PushListeners, Scope};
use crate::transport::{Connector, Link, TcpConnector};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

struct ConnState {
    phase: ConnectionState,
    generation: u64,
    outbound: Option<UnboundedSender<ClientFrame>>,
    task: Option<JoinHandle<()>>,
}

pub(crate) struct Inner {
    config: ClientConfig,
    connector: Box<dyn Connector>,
    state: Mutex<ConnState>,
    pub(crate) bus: EventBus,
    pub(crate) cache: LocationCache,
    pub(crate) listeners: PushListeners,
    pub(crate) queries: Correlator,
}

/// Handle to one connection manager instance. Clones share the instance.
///
/// Every method that starts background work must be called from within
/// a tokio runtime.
#[derive(Clone)]
pub struct ConnectionManager {
    pub(crate) inner: Arc<Inner>,
}

/// Non-owning handle, for callbacks stored inside the manager itself.
#[derive(Clone)]
pub struct WeakConnectionManager(Weak<Inner>);

impl WeakConnectionManager {
    pub fn upgrade(&self) -> Option<ConnectionManager> {
        self.0.upgrade().map(|inner| ConnectionManager { inner })
    }
}

impl ConnectionManager {
    pub fn new(config: ClientConfig, connector: impl Connector) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                connector: Box::new(connector),
                state: Mutex::new(ConnState {
                    phase: ConnectionState::Disconnected,
                    generation: 0,
                    outbound: None,
                    task: None,
                }),
                bus: EventBus::new(),
                cache: LocationCache::new(),
                listeners: PushListeners::default(),
                queries: Correlator::default(),
            }),
        }
    }

    /// Manager speaking length-prefixed JSON over TCP to `config.server_addr`.
    pub fn tcp(config: ClientConfig) -> Self {
        let connector = TcpConnector::new(&config.server_addr);
        Self::new(config, connector)
    }

    pub fn downgrade(&self) -> WeakConnectionManager {
        WeakConnectionManager(Arc::downgrade(&self.inner))
    }

    /// Start a connect cycle. No-op while connecting or connected.
    pub fn connect(&self) {
        let mut st = self.inner.state.lock();
        if st.phase != ConnectionState::Disconnected {
            return;
        }

        st.phase = ConnectionState::Connecting;
        st.generation += 1;
        let generation = st.generation;

        let inner = self.inner.clone();
        st.task = Some(tokio::spawn(async move {
            inner.run(generation).await;
        }));
    }

    /// Tear the channel down, drop local subscriptions and clear the cache.
    /// No-op when already disconnected.
    pub fn disconnect(&self) {
        let task = {
            let mut st = self.inner.state.lock();
            if st.phase == ConnectionState::Disconnected {
                // A cycle that gave up has already finished.
                st.task = None;
                return;
            }
            st.generation += 1;
            st.phase = ConnectionState::Disconnected;
            st.outbound = None;
            st.task.take()
        };

        if let Some(task) = task {
            task.abort();
        }

        self.inner.queries.fail_all();
        self.inner.listeners.clear();
        self.inner.cache.clear();

        info!("Disconnected from tracking service");
        self.inner.bus.emit(&BusEvent::ConnectionChange(false));
    }

    /// Disconnect and drop every bus registration, listener and cached record.
    pub fn dispose(&self) {
        self.disconnect();
        self.inner.queries.fail_all();
        self.inner.listeners.clear();
        self.inner.cache.clear();
        self.inner.bus.clear();
    }

    /// Pure read; never starts a connection attempt.
    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    pub fn state(&self) -> ConnectionState {
        self.inner.state.lock().phase
    }

    pub fn bus(&self) -> &EventBus {
        &self.inner.bus
    }

    pub fn cache(&self) -> &LocationCache {
        &self.inner.cache
    }

    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    /// Fire-and-forget message on the current link.
    pub(crate) fn send(&self, message: ClientMessage) -> Result<()> {
        self.send_frame(ClientFrame::push(message))
    }

    pub(crate) fn send_frame(&self, frame: ClientFrame) -> Result<()> {
        let st = self.inner.state.lock();
        let outbound = st.outbound.as_ref().ok_or(TrackingError::NotConnected)?;
        outbound.send(frame).map_err(|_| TrackingError::NotConnected)
    }

    /// Write a sample into the cache and announce it.
    pub(crate) fn store(&self, location: DriverLocation) {
        self.inner.store(location);
    }
}

impl Inner {
    async fn run(self: Arc<Self>, generation: u64) {
        let mut attempt: u32 = 0;

        loop {
            match timeout(self.config.connect_timeout(), self.connector.connect()).await {
                Ok(Ok(link)) => {
                    attempt = 0;
                    let Link { outbound, mut inbound } = link;
                    if !self.install(generation, outbound) {
                        return;
                    }
                    info!("Connected to tracking service");
                    self.bus.emit(&BusEvent::ConnectionChange(true));

                    self.pump(generation, &mut inbound).await;

                    if !self.lose(generation) {
                        return;
                    }
                    warn!("Connection lost, attempting to reconnect...");
                    self.bus.emit(&BusEvent::ConnectionChange(false));
                }
                Ok(Err(e)) => {
                    if !self.is_current(generation) {
                        return;
                    }
                    warn!("Connection failed: {}", e);
                    self.bus.emit(&BusEvent::ConnectionChange(false));
                }
                Err(_) => {
                    if !self.is_current(generation) {
                        return;
                    }
                    let e = TrackingError::Transport(format!(
                        "connect timed out after {:?}",
                        self.config.connect_timeout()
                    ));
                    warn!("Connection failed: {}", e);
                    self.bus.emit(&BusEvent::ConnectionChange(false));
                }
            }

            if attempt >= self.config.reconnection_attempts {
                if self.give_up(generation) {
                    error!(
                        "Giving up after {} reconnect attempts; call connect() to retry",
                        attempt
                    );
                }
                return;
            }

            attempt += 1;
            let delay = self.config.reconnect_delay(attempt);
            debug!("Reconnect attempt {} in {:?}", attempt, delay);
            sleep(delay).await;

            if !self.is_current(generation) {
                return;
            }
        }
    }

    /// Deliver inbound frames until the link closes or a heartbeat can't be sent.
    async fn pump(&self, generation: u64, inbound: &mut UnboundedReceiver<ServerFrame>) {
        let mut heartbeat = self
            .config
            .heartbeat_interval()
            .map(|period| interval_at(Instant::now() + period, period));

        loop {
            tokio::select! {
                frame = inbound.recv() => match frame {
                    Some(frame) => {
                        if !self.is_current(generation) {
                            return;
                        }
                        self.dispatch(frame);
                    }
                    None => return,
                },
                _ = tick(&mut heartbeat) => {
                    let ping = ClientFrame::push(ClientMessage::Ping);
                    let sent = {
                        let st = self.state.lock();
                        st.outbound.as_ref().map_or(false, |tx| tx.send(ping).is_ok())
                    };
                    if !sent {
                        warn!("Heartbeat failed");
                        return;
                    }
                }
            }
        }
    }

    fn dispatch(&self, frame: ServerFrame) {
        match frame {
            ServerFrame::Ack { id, payload } => {
                if !self.queries.resolve(id, payload) {
                    debug!("Ack {} arrived after its query was abandoned", id);
                }
            }
            ServerFrame::Push(ServerMessage::DriverLocationUpdate(loc)) => {
                self.store(loc.clone());
                self.listeners.notify(Scope::Driver(loc.driver_id), &loc);
            }
            ServerFrame::Push(ServerMessage::LocationUpdate(loc)) => {
                self.store(loc.clone());
                self.listeners.notify(Scope::All, &loc);
            }
            ServerFrame::Push(ServerMessage::DriverOnline(r)) => {
                self.apply_presence(r.driver_id, true)
            }
            ServerFrame::Push(ServerMessage::DriverOffline(r)) => {
                self.apply_presence(r.driver_id, false)
            }
            ServerFrame::Push(ServerMessage::Stats(stats)) => {
                self.bus.emit(&BusEvent::Stats(stats))
            }
            ServerFrame::Push(ServerMessage::Pong) => debug!("pong"),
        }
    }

    fn store(&self, location: DriverLocation) {
        let driver_id = location.driver_id;
        self.cache.upsert(location);
        self.bus.emit(&BusEvent::LocationChanged(driver_id));
    }

    fn apply_presence(&self, driver_id: DriverId, is_online: bool) {
        if self.cache.patch_presence(driver_id, is_online) {
            self.bus.emit(&BusEvent::Presence { driver_id, is_online });
        } else {
            // No location yet to attach presence to.
            debug!("Presence for driver {} dropped (online = {})", driver_id, is_online);
        }
    }

    fn is_current(&self, generation: u64) -> bool {
        self.state.lock().generation == generation
    }

    fn install(&self, generation: u64, outbound: UnboundedSender<ClientFrame>) -> bool {
        let mut st = self.state.lock();
        if st.generation != generation {
            return false;
        }
        st.phase = ConnectionState::Connected;
        st.outbound = Some(outbound);
        true
    }

    fn lose(&self, generation: u64) -> bool {
        {
            let mut st = self.state.lock();
            if st.generation != generation {
                return false;
            }
            st.phase = ConnectionState::Connecting;
            st.outbound = None;
        }
        // Acks can't arrive on a new link.
        self.queries.fail_all();
        true
    }

    fn give_up(&self, generation: u64) -> bool {
        let mut st = self.state.lock();
        if st.generation != generation {
            return false;
        }
        st.phase = ConnectionState::Disconnected;
        st.outbound = None;
        true
    }
}

async fn tick(heartbeat: &mut Option<Interval>) {
    match heartbeat {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}
