// crates/tracking-client/src/transport.rs

//! Transport seam between the connection manager and the network.
//!
//! A [`Connector`] produces a [`Link`]: a frame-level channel pair. The
//! manager never touches sockets; it sends [`ClientFrame`]s and receives
//! [`ServerFrame`]s. The link is considered dropped when its inbound
//! receiver ends.

use bytes::BytesMut;
use futures::future::BoxFuture;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::{debug, info, warn};
use tracking_protocol::{
    decode_server, encode_client, read_frame, write_frame, ClientFrame, ServerFrame,
};

use crate::error::{Result, TrackingError};

/// One established connection, seen as frames.
pub struct Link {
    pub outbound: UnboundedSender<ClientFrame>,
    pub inbound: UnboundedReceiver<ServerFrame>,
}

/// Something that can open a [`Link`] to the tracking namespace.
pub trait Connector: Send + Sync + 'static {
    fn connect(&self) -> BoxFuture<'static, Result<Link>>;
}

/// Length-prefixed JSON frames over TCP.
pub struct TcpConnector {
    server_addr: String,
}

impl TcpConnector {
    pub fn new(server_addr: &str) -> Self {
        Self {
            server_addr: server_addr.to_string(),
        }
    }
}

impl Connector for TcpConnector {
    fn connect(&self) -> BoxFuture<'static, Result<Link>> {
        let addr = self.server_addr.clone();
        Box::pin(async move {
            info!("Connecting to {}...", addr);
            let stream = TcpStream::connect(&addr).await?;
            stream.set_nodelay(true)?;

            let (read_half, write_half) = stream.into_split();
            let (out_tx, out_rx) = mpsc::unbounded_channel();
            let (in_tx, in_rx) = mpsc::unbounded_channel();

            tokio::spawn(run_writer(write_half, out_rx));
            tokio::spawn(run_reader(read_half, in_tx));

            Ok(Link {
                outbound: out_tx,
                inbound: in_rx,
            })
        })
    }
}

/// Drain outbound frames onto the socket until the manager drops the link.
async fn run_writer(mut stream: OwnedWriteHalf, mut rx: UnboundedReceiver<ClientFrame>) {
    let mut write_buffer = BytesMut::with_capacity(4096);

    while let Some(frame) = rx.recv().await {
        write_buffer.clear();
        let encoded =
            encode_client(&frame).and_then(|payload| write_frame(&payload, &mut write_buffer));
        if let Err(e) = encoded {
            warn!("Dropping unencodable frame {:?}: {}", frame.message, e);
            continue;
        }

        if let Err(e) = stream.write_all(&write_buffer).await {
            warn!("Write failed: {}", e);
            break;
        }
        debug!("Sent frame: {:?}", frame);
    }

    let _ = stream.shutdown().await;
}

/// Decode inbound frames until EOF, a read error, or the manager dropping the link.
async fn run_reader(mut stream: OwnedReadHalf, tx: UnboundedSender<ServerFrame>) {
    let mut read_buffer = BytesMut::with_capacity(65536);

    loop {
        let n = tokio::select! {
            _ = tx.closed() => return,
            read = stream.read_buf(&mut read_buffer) => match read {
                Ok(n) => n,
                Err(e) => {
                    warn!("Read error: {}", e);
                    return;
                }
            },
        };

        if n == 0 {
            info!("Server closed the connection");
            return;
        }

        if let Err(e) = drain_frames(&mut read_buffer, &tx) {
            // A bad length prefix leaves the stream unrecoverable.
            warn!("{}; dropping connection", e);
            return;
        }
    }
}

fn drain_frames(buf: &mut BytesMut, tx: &UnboundedSender<ServerFrame>) -> Result<()> {
    while let Some(payload) = read_frame(buf)? {
        match decode_server(&payload) {
            Ok(frame) => {
                if tx.send(frame).is_err() {
                    return Err(TrackingError::NotConnected);
                }
            }
            Err(e) => warn!("Protocol violation, frame dropped: {}", e),
        }
    }
    Ok(())
}
