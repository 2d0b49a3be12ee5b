mod common;

use std::time::Duration;

use bytes::BytesMut;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpListener;
use tracking_client::{ClientConfig, ConnectionManager};
use tracking_core::{DriverId, ServerMessage};
use tracking_protocol::{encode_server, write_frame, ServerFrame};

use common::location;

async fn wait_until(mut check: impl FnMut() -> bool) -> bool {
    for _ in 0..200 {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}

#[tokio::test]
async fn bad_frame_is_dropped_and_stream_continues() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let manager = ConnectionManager::tcp(ClientConfig {
        server_addr: addr.to_string(),
        heartbeat_interval_secs: 0,
        ..ClientConfig::default()
    });
    manager.connect();

    let (mut socket, _) = listener.accept().await.unwrap();

    let mut buf = BytesMut::new();
    write_frame(br#"{"v":1,"ns":"tracking","event":"mystery","data":{}}"#, &mut buf).unwrap();
    write_frame(b"not json at all", &mut buf).unwrap();
    let good = ServerFrame::Push(ServerMessage::LocationUpdate(location(11, 6.25, -75.56, 0)));
    write_frame(&encode_server(&good).unwrap(), &mut buf).unwrap();
    socket.write_all(&buf).await.unwrap();

    assert!(wait_until(|| manager.cache().get(DriverId(11)).is_some()).await);
    assert!(manager.is_connected());

    manager.disconnect();
}

#[tokio::test]
async fn server_close_is_detected_as_connection_loss() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let manager = ConnectionManager::tcp(ClientConfig {
        server_addr: addr.to_string(),
        heartbeat_interval_secs: 0,
        reconnection_attempts: 0,
        ..ClientConfig::default()
    });
    manager.connect();

    let (socket, _) = listener.accept().await.unwrap();
    assert!(wait_until(|| manager.is_connected()).await);

    drop(socket);
    assert!(wait_until(|| !manager.is_connected()).await);
}
