//! Shared types for the tracking relay.
//!
//! - `ClientId`: handle for a connected client
//! - channel aliases between client tasks and the hub
//! - `HubRequest`: what client tasks tell the hub

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{mpsc, RwLock};
use tracking_protocol::{ClientFrame, ServerFrame};

/// Identifier for a connected client, unique for the life of the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ClientId(pub u64);

/// Outbound frames from the hub to one client.
pub type OutboundTx = mpsc::UnboundedSender<ServerFrame>;
pub type OutboundRx = mpsc::UnboundedReceiver<ServerFrame>;

/// Connected clients and their outbound channels.
pub type ClientRegistry = Arc<RwLock<HashMap<ClientId, OutboundTx>>>;

#[derive(Debug)]
pub enum HubEvent {
    Frame(ClientFrame),
    Disconnected,
}

/// Message flowing from a client task into the hub task.
#[derive(Debug)]
pub struct HubRequest {
    pub client_id: ClientId,
    pub event: HubEvent,
}

/// Channel from clients to the hub task.
pub type HubTx = mpsc::UnboundedSender<HubRequest>;
pub type HubRx = mpsc::UnboundedReceiver<HubRequest>;
