// crates/tracking-server/src/client.rs

use anyhow::Result;
use bytes::BytesMut;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tracing::{debug, info, warn};
use tracking_protocol::{
    decode_client, encode_server, read_frame, write_frame, ProtocolError, ServerFrame,
};

use crate::types::{ClientId, ClientRegistry, HubEvent, HubRequest, HubTx, OutboundRx};

/// Run the I/O loop for a single connection.
///
/// Returns once the peer goes away; the client is then unregistered and
/// the hub is told so it can drop subscriptions and presence.
pub async fn run_client(
    client_id: ClientId,
    stream: TcpStream,
    hub_tx: HubTx,
    out_rx: OutboundRx,
    clients: ClientRegistry,
) -> Result<()> {
    stream.set_nodelay(true)?;
    let (read_stream, write_stream) = stream.into_split();

    let writer = tokio::spawn(run_writer(client_id, write_stream, out_rx));
    let result = run_reader(client_id, read_stream, &hub_tx).await;

    clients.write().await.remove(&client_id);
    let _ = hub_tx.send(HubRequest {
        client_id,
        event: HubEvent::Disconnected,
    });
    writer.abort();

    result
}

async fn run_reader(
    client_id: ClientId,
    mut read_stream: OwnedReadHalf,
    hub_tx: &HubTx,
) -> Result<()> {
    let mut buffer = BytesMut::with_capacity(8192);

    loop {
        let n = read_stream.read_buf(&mut buffer).await?;
        if n == 0 {
            info!("Client {} closed the connection", client_id.0);
            return Ok(());
        }

        loop {
            let payload = match read_frame(&mut buffer) {
                Ok(Some(payload)) => payload,
                Ok(None) => break,
                Err(e @ ProtocolError::FrameTooLarge(_)) => {
                    warn!("Client {}: {}; dropping connection", client_id.0, e);
                    return Ok(());
                }
                Err(e) => return Err(e.into()),
            };

            match decode_client(&payload) {
                Ok(frame) => {
                    debug!("Client {} frame: {:?}", client_id.0, frame);
                    let req = HubRequest {
                        client_id,
                        event: HubEvent::Frame(frame),
                    };
                    if hub_tx.send(req).is_err() {
                        warn!("Hub channel closed");
                        return Ok(());
                    }
                }
                Err(e) => warn!("Client {} protocol violation, frame dropped: {}", client_id.0, e),
            }
        }
    }
}

async fn run_writer(client_id: ClientId, mut write_stream: OwnedWriteHalf, mut out_rx: OutboundRx) {
    let mut write_buffer = BytesMut::with_capacity(4096);

    while let Some(frame) = out_rx.recv().await {
        if let Err(e) = write_message(&mut write_stream, &mut write_buffer, &frame).await {
            warn!("Client {} write error: {}", client_id.0, e);
            break;
        }
    }
}

async fn write_message(
    stream: &mut OwnedWriteHalf,
    buffer: &mut BytesMut,
    frame: &ServerFrame,
) -> Result<()> {
    buffer.clear();
    let payload = encode_server(frame)?;
    write_frame(&payload, buffer)?;
    stream.write_all(buffer).await?;
    Ok(())
}
