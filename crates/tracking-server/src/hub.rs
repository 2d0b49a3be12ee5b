//! Central hub: owns all fleet state and decides who hears what.
//!
//! Routing policy:
//! - query acks go **only** to the requesting client.
//! - `driverLocationUpdate` goes to that driver's subscribers.
//! - `locationUpdate`, `driverOnline`, `driverOffline` and `stats` are
//!   broadcast to **all** connected clients.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use serde::Serialize;
use serde_json::json;
use tokio::time::{interval_at, Instant, Interval};
use tracing::{debug, info, warn};
use tracking_core::{
    ClientMessage, DriverId, DriverLocation, DriverLocationReply, DriverRef, OnlineDriversReply,
    ServerMessage,
};
use tracking_protocol::{ClientFrame, ServerFrame};

use crate::types::{ClientId, ClientRegistry, HubEvent, HubRequest, HubRx, OutboundTx};

/// Where a routed frame should go.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    To(ClientId),
    Broadcast,
}

pub type Routed = (Route, ServerFrame);

/// Fleet state: latest sample per driver, subscribers per driver and
/// which client reports for which driver.
#[derive(Debug, Default)]
pub struct Fleet {
    latest: BTreeMap<DriverId, DriverLocation>,
    subscribers: HashMap<DriverId, BTreeSet<ClientId>>,
    reporters: HashMap<ClientId, DriverId>,
}

impl Fleet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply one frame from `client_id` and return the frames it produces.
    pub fn handle(&mut self, client_id: ClientId, frame: ClientFrame) -> Vec<Routed> {
        let ClientFrame { ack, message } = frame;

        match message {
            ClientMessage::SubscribeToDriver(DriverRef { driver_id }) => {
                self.subscribers.entry(driver_id).or_default().insert(client_id);
                debug!("Client {} subscribed to driver {}", client_id.0, driver_id);
                Vec::new()
            }
            ClientMessage::UnsubscribeFromDriver(DriverRef { driver_id }) => {
                if let Some(subs) = self.subscribers.get_mut(&driver_id) {
                    subs.remove(&client_id);
                    if subs.is_empty() {
                        self.subscribers.remove(&driver_id);
                    }
                }
                debug!("Client {} unsubscribed from driver {}", client_id.0, driver_id);
                Vec::new()
            }
            ClientMessage::GetDriverLocation(DriverRef { driver_id }) => {
                let location = self.latest.get(&driver_id).cloned();
                let reply = DriverLocationReply {
                    is_online: location.as_ref().map_or(false, |l| l.is_online),
                    location,
                };
                ack_reply(client_id, ack, &reply)
            }
            ClientMessage::GetOnlineDrivers => {
                let reply = OnlineDriversReply {
                    drivers: self.latest.values().filter(|l| l.is_online).cloned().collect(),
                };
                ack_reply(client_id, ack, &reply)
            }
            ClientMessage::ReportLocation(location) => self.report(client_id, location),
            ClientMessage::Ping => {
                vec![(Route::To(client_id), ServerFrame::Push(ServerMessage::Pong))]
            }
        }
    }

    /// Forget a departed client. A reporting client takes its driver offline.
    pub fn disconnect(&mut self, client_id: ClientId) -> Vec<Routed> {
        self.subscribers.retain(|_, subs| {
            subs.remove(&client_id);
            !subs.is_empty()
        });

        match self.reporters.remove(&client_id) {
            Some(driver_id) => self.take_offline(driver_id),
            None => Vec::new(),
        }
    }

    /// Current `stats` payload.
    pub fn stats(&self, connected_clients: usize) -> ServerFrame {
        ServerFrame::Push(ServerMessage::Stats(json!({
            "connectedClients": connected_clients,
            "trackedDrivers": self.latest.len(),
            "onlineDrivers": self.online_count(),
        })))
    }

    pub fn online_count(&self) -> usize {
        self.latest.values().filter(|l| l.is_online).count()
    }

    pub fn subscriber_count(&self, driver_id: DriverId) -> usize {
        self.subscribers.get(&driver_id).map_or(0, BTreeSet::len)
    }

    pub fn location(&self, driver_id: DriverId) -> Option<&DriverLocation> {
        self.latest.get(&driver_id)
    }

    fn report(&mut self, client_id: ClientId, location: DriverLocation) -> Vec<Routed> {
        let driver_id = location.driver_id;
        let mut out = Vec::new();

        // One client reports for one driver at a time.
        if let Some(previous) = self.reporters.insert(client_id, driver_id) {
            if previous != driver_id {
                out.extend(self.take_offline(previous));
            }
        }

        let was_online = self.latest.get(&driver_id).map_or(false, |l| l.is_online);
        let location = location.with_presence(true);
        self.latest.insert(driver_id, location.clone());

        if let Some(subs) = self.subscribers.get(&driver_id) {
            for sub in subs {
                out.push((
                    Route::To(*sub),
                    ServerFrame::Push(ServerMessage::DriverLocationUpdate(location.clone())),
                ));
            }
        }
        out.push((Route::Broadcast, ServerFrame::Push(ServerMessage::LocationUpdate(location))));

        if !was_online {
            info!("Driver {} online (client {})", driver_id, client_id.0);
            out.push((
                Route::Broadcast,
                ServerFrame::Push(ServerMessage::DriverOnline(DriverRef { driver_id })),
            ));
        }
        out
    }

    fn take_offline(&mut self, driver_id: DriverId) -> Vec<Routed> {
        match self.latest.get_mut(&driver_id) {
            Some(loc) if loc.is_online => {
                *loc = loc.with_presence(false);
                info!("Driver {} offline", driver_id);
                vec![(
                    Route::Broadcast,
                    ServerFrame::Push(ServerMessage::DriverOffline(DriverRef { driver_id })),
                )]
            }
            _ => Vec::new(),
        }
    }
}

fn ack_reply<T: Serialize>(client_id: ClientId, ack: Option<u64>, reply: &T) -> Vec<Routed> {
    let Some(id) = ack else {
        warn!("Client {} sent a query without an ack id", client_id.0);
        return Vec::new();
    };
    match serde_json::to_value(reply) {
        Ok(payload) => vec![(Route::To(client_id), ServerFrame::Ack { id, payload })],
        Err(e) => {
            warn!("Failed to encode reply for client {}: {}", client_id.0, e);
            Vec::new()
        }
    }
}

/// Run the central hub loop until every client sender is gone.
pub async fn run_hub_loop(
    mut hub_rx: HubRx,
    clients: ClientRegistry,
    stats_interval: Option<std::time::Duration>,
) {
    let mut fleet = Fleet::new();
    let mut stats = stats_interval.map(|period| interval_at(Instant::now() + period, period));

    loop {
        tokio::select! {
            req = hub_rx.recv() => {
                let Some(HubRequest { client_id, event }) = req else {
                    break;
                };
                let routed = match event {
                    HubEvent::Frame(frame) => fleet.handle(client_id, frame),
                    HubEvent::Disconnected => fleet.disconnect(client_id),
                };
                if routed.is_empty() {
                    continue;
                }

                // Snapshot of current clients to minimize lock hold time.
                let current_clients = clients.read().await.clone();
                for (route, frame) in routed {
                    route_output(route, frame, &current_clients);
                }
            }
            _ = tick(&mut stats) => {
                let current_clients = clients.read().await.clone();
                let frame = fleet.stats(current_clients.len());
                route_output(Route::Broadcast, frame, &current_clients);
            }
        }
    }

    info!("Hub loop shutting down (hub_rx closed)");
}

fn route_output(route: Route, frame: ServerFrame, clients: &HashMap<ClientId, OutboundTx>) {
    match route {
        Route::To(client_id) => {
            if let Some(tx) = clients.get(&client_id) {
                let _ = tx.send(frame);
            }
        }
        Route::Broadcast => {
            for tx in clients.values() {
                let _ = tx.send(frame.clone());
            }
        }
    }
}

async fn tick(stats: &mut Option<Interval>) {
    match stats {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}
