//! Frames: one logical message plus its wire-level correlation data.

use serde_json::Value;
use tracking_core::{ClientMessage, ServerMessage};

/// Client → server frame.
#[derive(Debug, Clone, PartialEq)]
pub struct ClientFrame {
    /// Set on requests that expect an acknowledgement.
    pub ack: Option<u64>,
    pub message: ClientMessage,
}

impl ClientFrame {
    /// Fire-and-forget frame.
    pub fn push(message: ClientMessage) -> Self {
        ClientFrame { ack: None, message }
    }

    /// Request frame answered by `ServerFrame::Ack` with the same id.
    pub fn request(id: u64, message: ClientMessage) -> Self {
        ClientFrame {
            ack: Some(id),
            message,
        }
    }
}

/// Server → client frame.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerFrame {
    /// Unsolicited push.
    Push(ServerMessage),

    /// Acknowledgement of the request carrying `id`.
    ///
    /// The payload stays untyped on the wire: only the requester knows
    /// which reply shape to expect.
    Ack { id: u64, payload: Value },
}
