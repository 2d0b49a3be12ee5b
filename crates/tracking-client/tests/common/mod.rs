//! In-memory transport for driving a `ConnectionManager` from tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{TimeZone, Utc};
use futures::future::BoxFuture;
use parking_lot::Mutex;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::time::timeout;
use tracking_client::error::{Result, TrackingError};
use tracking_client::{ClientConfig, ConnectionManager, Connector, Link};
use tracking_core::{ClientMessage, DriverId, DriverLocation, ServerMessage};
use tracking_protocol::{ClientFrame, ServerFrame};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Accept,
    Refuse,
    Hang,
}

/// Server side of one accepted link. Dropping it drops the connection.
pub struct ServerEnd {
    pub incoming: UnboundedReceiver<ClientFrame>,
    pub outgoing: UnboundedSender<ServerFrame>,
}

impl ServerEnd {
    pub fn push(&self, msg: ServerMessage) {
        self.outgoing.send(ServerFrame::Push(msg)).expect("client link closed");
    }

    pub fn ack(&self, id: u64, payload: serde_json::Value) {
        self.outgoing
            .send(ServerFrame::Ack { id, payload })
            .expect("client link closed");
    }

    /// Next frame from the client, or `None` if nothing arrives shortly.
    pub async fn next_frame(&mut self) -> Option<ClientFrame> {
        timeout(Duration::from_millis(100), self.incoming.recv())
            .await
            .ok()
            .flatten()
    }

    /// Every frame the client sends until it goes quiet.
    pub async fn drain(&mut self) -> Vec<ClientFrame> {
        let mut frames = Vec::new();
        while let Some(frame) = self.next_frame().await {
            frames.push(frame);
        }
        frames
    }
}

struct MockConnector {
    mode: Arc<Mutex<Mode>>,
    attempts: Arc<AtomicUsize>,
    accepted: UnboundedSender<ServerEnd>,
}

impl Connector for MockConnector {
    fn connect(&self) -> BoxFuture<'static, Result<Link>> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        match *self.mode.lock() {
            Mode::Refuse => {
                Box::pin(async { Err(TrackingError::Transport("connection refused".into())) })
            }
            Mode::Hang => Box::pin(futures::future::pending()),
            Mode::Accept => {
                let (client_tx, server_rx) = mpsc::unbounded_channel();
                let (server_tx, client_rx) = mpsc::unbounded_channel();
                let end = ServerEnd {
                    incoming: server_rx,
                    outgoing: server_tx,
                };
                let accepted = self.accepted.send(end);
                Box::pin(async move {
                    accepted.map_err(|_| TrackingError::Transport("harness gone".into()))?;
                    Ok(Link {
                        outbound: client_tx,
                        inbound: client_rx,
                    })
                })
            }
        }
    }
}

pub struct Harness {
    mode: Arc<Mutex<Mode>>,
    attempts: Arc<AtomicUsize>,
    accepted: UnboundedReceiver<ServerEnd>,
}

impl Harness {
    pub fn set_mode(&self, mode: Mode) {
        *self.mode.lock() = mode;
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    /// Wait for the manager to open the next link.
    pub async fn accept(&mut self) -> ServerEnd {
        timeout(Duration::from_secs(60), self.accepted.recv())
            .await
            .expect("no connection attempt")
            .expect("connector dropped")
    }
}

pub fn test_config() -> ClientConfig {
    ClientConfig {
        heartbeat_interval_secs: 0,
        ..ClientConfig::default()
    }
}

pub fn mock_manager(config: ClientConfig) -> (ConnectionManager, Harness) {
    let mode = Arc::new(Mutex::new(Mode::Accept));
    let attempts = Arc::new(AtomicUsize::new(0));
    let (accepted_tx, accepted_rx) = mpsc::unbounded_channel();

    let connector = MockConnector {
        mode: mode.clone(),
        attempts: attempts.clone(),
        accepted: accepted_tx,
    };

    (
        ConnectionManager::new(config, connector),
        Harness {
            mode,
            attempts,
            accepted: accepted_rx,
        },
    )
}

/// Let spawned tasks run to completion of their current work.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(10)).await;
}

pub fn location(id: u64, lat: f64, lng: f64, secs: u32) -> DriverLocation {
    let ts = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, secs).unwrap();
    DriverLocation::new(DriverId(id), lat, lng, ts)
}

pub fn subscribes(frames: &[ClientFrame], id: u64) -> usize {
    frames
        .iter()
        .filter(|f| {
            matches!(&f.message, ClientMessage::SubscribeToDriver(r) if r.driver_id == DriverId(id))
        })
        .count()
}

pub fn unsubscribes(frames: &[ClientFrame], id: u64) -> usize {
    frames
        .iter()
        .filter(|f| {
            matches!(
                &f.message,
                ClientMessage::UnsubscribeFromDriver(r) if r.driver_id == DriverId(id)
            )
        })
        .count()
}
