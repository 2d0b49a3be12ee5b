//! TCP listener and top-level server wiring.
//!
//! Accepts connections, assigns each a `ClientId`, and spawns a
//! per-client I/O task plus the single hub task that owns fleet state.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::net::TcpListener;
use tokio::sync::{mpsc, RwLock};
use tracing::{info, warn};

use crate::client;
use crate::config::Config;
use crate::hub;
use crate::types::{ClientId, ClientRegistry, HubRx, HubTx, OutboundRx, OutboundTx};

static NEXT_CLIENT_ID: AtomicU64 = AtomicU64::new(1);

fn next_client_id() -> ClientId {
    ClientId(NEXT_CLIENT_ID.fetch_add(1, Ordering::Relaxed))
}

/// Bind the configured address and serve forever.
pub async fn run(config: Config) -> Result<()> {
    let addr = config.socket_addr_string();
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding {}", addr))?;
    info!("Listening on {}", addr);

    serve(listener, config).await
}

/// Serve on an already bound listener.
pub async fn serve(listener: TcpListener, config: Config) -> Result<()> {
    let clients: ClientRegistry = Arc::new(RwLock::new(Default::default()));
    let (hub_tx, hub_rx): (HubTx, HubRx) = mpsc::unbounded_channel();

    tokio::spawn(hub::run_hub_loop(hub_rx, clients.clone(), config.stats_interval));

    loop {
        let (stream, peer_addr) = listener.accept().await?;

        let current_clients = clients.read().await.len();
        if current_clients >= config.max_clients {
            warn!(
                "Rejecting connection from {}: max_clients ({}) reached",
                peer_addr, config.max_clients
            );
            continue;
        }

        let client_id = next_client_id();
        info!("Accepted connection {} from {}", client_id.0, peer_addr);

        let (out_tx, out_rx): (OutboundTx, OutboundRx) = mpsc::unbounded_channel();
        clients.write().await.insert(client_id, out_tx);

        let clients = clients.clone();
        let hub_tx = hub_tx.clone();
        tokio::spawn(async move {
            match client::run_client(client_id, stream, hub_tx, out_rx, clients).await {
                Ok(()) => info!("Client {} disconnected", client_id.0),
                Err(e) => warn!("Client {} error: {:#}", client_id.0, e),
            }
        });
    }
}
