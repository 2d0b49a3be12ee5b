//! JSON envelope encoding/decoding for tracking frames.
//!
//! Every frame payload is one JSON object:
//!
//! ```text
//! {
//!   "v":     1,                 // PROTOCOL_VERSION
//!   "ns":    "tracking",        // TRACKING_NAMESPACE
//!   "event": "<event name>",    // see WireEvent
//!   "data":  { ... },           // event payload, camelCase fields
//!   "ack":   42                 // optional correlation id
//! }
//! ```
//!
//! Requests (`getDriverLocation`, `getOnlineDrivers`) must carry `ack`;
//! the server answers with `event: "ack"`, the same `ack` id, and the
//! reply in `data`.
//!
//! Location payloads are validated on decode, so a frame that decodes
//! successfully never carries an impossible position.
//!
//! NOTE: This module encodes/decodes **one message per buffer**. Stream
//! framing lives in `framing`.

use std::fmt;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use tracking_core::{ClientMessage, DriverLocation, DriverRef, LocationError, ServerMessage};

use crate::frame::{ClientFrame, ServerFrame};
use crate::wire_types::{WireEvent, MAX_FRAME_LEN, PROTOCOL_VERSION, TRACKING_NAMESPACE};

/// Errors that can arise when encoding/decoding a frame.
#[derive(Debug)]
pub enum ProtocolError {
    /// Announced frame length exceeds `MAX_FRAME_LEN`.
    FrameTooLarge(usize),
    /// Payload is not the JSON we expect.
    Json(String),
    /// Unsupported or mismatched protocol version.
    VersionMismatch(u8),
    /// Envelope scoped to another namespace.
    WrongNamespace(String),
    /// Unknown event name.
    UnknownEvent(String),
    /// Known event sent in the wrong direction.
    UnexpectedEvent(&'static str),
    /// Missing or semantically invalid field.
    InvalidField(&'static str),
    /// Location sample outside physical bounds.
    InvalidLocation(LocationError),
}

impl fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProtocolError::FrameTooLarge(len) => {
                write!(f, "Frame too large: {} bytes (max {})", len, MAX_FRAME_LEN)
            }
            ProtocolError::Json(e) => write!(f, "Malformed JSON: {}", e),
            ProtocolError::VersionMismatch(v) => {
                write!(f, "Protocol version mismatch: got {}, expected {}", v, PROTOCOL_VERSION)
            }
            ProtocolError::WrongNamespace(ns) => {
                write!(f, "Wrong namespace: got {:?}, expected {:?}", ns, TRACKING_NAMESPACE)
            }
            ProtocolError::UnknownEvent(name) => write!(f, "Unknown event: {}", name),
            ProtocolError::UnexpectedEvent(name) => write!(f, "Unexpected event: {}", name),
            ProtocolError::InvalidField(field) => write!(f, "Invalid field: {}", field),
            ProtocolError::InvalidLocation(e) => write!(f, "Invalid location: {}", e),
        }
    }
}

impl std::error::Error for ProtocolError {}

impl From<serde_json::Error> for ProtocolError {
    fn from(e: serde_json::Error) -> Self {
        ProtocolError::Json(e.to_string())
    }
}

impl From<LocationError> for ProtocolError {
    fn from(e: LocationError) -> Self {
        ProtocolError::InvalidLocation(e)
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct Envelope {
    v: u8,
    ns: String,
    event: String,
    #[serde(default)]
    data: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    ack: Option<u64>,
}

// ============================================================================
// CLIENT: client → server
// ============================================================================

/// Encode a client frame into a JSON payload.
pub fn encode_client(frame: &ClientFrame) -> Result<Vec<u8>, ProtocolError> {
    let (event, data) = match &frame.message {
        ClientMessage::SubscribeToDriver(r) => {
            (WireEvent::SubscribeToDriver, serde_json::to_value(r)?)
        }
        ClientMessage::UnsubscribeFromDriver(r) => {
            (WireEvent::UnsubscribeFromDriver, serde_json::to_value(r)?)
        }
        ClientMessage::GetDriverLocation(r) => {
            (WireEvent::GetDriverLocation, serde_json::to_value(r)?)
        }
        ClientMessage::GetOnlineDrivers => (WireEvent::GetOnlineDrivers, empty_object()),
        ClientMessage::ReportLocation(loc) => {
            (WireEvent::ReportLocation, serde_json::to_value(loc)?)
        }
        ClientMessage::Ping => (WireEvent::Ping, empty_object()),
    };

    encode_envelope(event, data, frame.ack)
}

/// Decode a single client frame from a JSON payload.
pub fn decode_client(buf: &[u8]) -> Result<ClientFrame, ProtocolError> {
    let (event, envelope) = open_envelope(buf)?;

    let message = match event {
        WireEvent::SubscribeToDriver => {
            ClientMessage::SubscribeToDriver(payload::<DriverRef>(envelope.data)?)
        }
        WireEvent::UnsubscribeFromDriver => {
            ClientMessage::UnsubscribeFromDriver(payload::<DriverRef>(envelope.data)?)
        }
        WireEvent::GetDriverLocation => {
            ClientMessage::GetDriverLocation(payload::<DriverRef>(envelope.data)?)
        }
        WireEvent::GetOnlineDrivers => ClientMessage::GetOnlineDrivers,
        WireEvent::ReportLocation => ClientMessage::ReportLocation(location(envelope.data)?),
        WireEvent::Ping => ClientMessage::Ping,
        other => return Err(ProtocolError::UnexpectedEvent(other.as_str())),
    };

    if message.expects_ack() && envelope.ack.is_none() {
        return Err(ProtocolError::InvalidField("ack"));
    }

    Ok(ClientFrame {
        ack: envelope.ack,
        message,
    })
}

// ============================================================================
// SERVER: server → client
// ============================================================================

/// Encode a server frame into a JSON payload.
pub fn encode_server(frame: &ServerFrame) -> Result<Vec<u8>, ProtocolError> {
    match frame {
        ServerFrame::Ack { id, payload } => {
            encode_envelope(WireEvent::Ack, payload.clone(), Some(*id))
        }
        ServerFrame::Push(msg) => {
            let (event, data) = match msg {
                ServerMessage::DriverLocationUpdate(loc) => {
                    (WireEvent::DriverLocationUpdate, serde_json::to_value(loc)?)
                }
                ServerMessage::LocationUpdate(loc) => {
                    (WireEvent::LocationUpdate, serde_json::to_value(loc)?)
                }
                ServerMessage::DriverOnline(r) => {
                    (WireEvent::DriverOnline, serde_json::to_value(r)?)
                }
                ServerMessage::DriverOffline(r) => {
                    (WireEvent::DriverOffline, serde_json::to_value(r)?)
                }
                ServerMessage::Stats(v) => (WireEvent::Stats, v.clone()),
                ServerMessage::Pong => (WireEvent::Pong, empty_object()),
            };
            encode_envelope(event, data, None)
        }
    }
}

/// Decode a single server frame from a JSON payload.
pub fn decode_server(buf: &[u8]) -> Result<ServerFrame, ProtocolError> {
    let (event, envelope) = open_envelope(buf)?;

    let msg = match event {
        WireEvent::Ack => {
            let id = envelope.ack.ok_or(ProtocolError::InvalidField("ack"))?;
            return Ok(ServerFrame::Ack {
                id,
                payload: envelope.data,
            });
        }
        WireEvent::DriverLocationUpdate => {
            ServerMessage::DriverLocationUpdate(location(envelope.data)?)
        }
        WireEvent::LocationUpdate => ServerMessage::LocationUpdate(location(envelope.data)?),
        WireEvent::DriverOnline => {
            ServerMessage::DriverOnline(payload::<DriverRef>(envelope.data)?)
        }
        WireEvent::DriverOffline => {
            ServerMessage::DriverOffline(payload::<DriverRef>(envelope.data)?)
        }
        WireEvent::Stats => ServerMessage::Stats(envelope.data),
        WireEvent::Pong => ServerMessage::Pong,
        other => return Err(ProtocolError::UnexpectedEvent(other.as_str())),
    };

    Ok(ServerFrame::Push(msg))
}

// -----------------------------------------------------------------------------
// Helpers
// -----------------------------------------------------------------------------

fn encode_envelope(
    event: WireEvent,
    data: Value,
    ack: Option<u64>,
) -> Result<Vec<u8>, ProtocolError> {
    let envelope = Envelope {
        v: PROTOCOL_VERSION,
        ns: TRACKING_NAMESPACE.to_string(),
        event: event.as_str().to_string(),
        data,
        ack,
    };

    let bytes = serde_json::to_vec(&envelope)?;
    if bytes.len() > MAX_FRAME_LEN {
        return Err(ProtocolError::FrameTooLarge(bytes.len()));
    }
    Ok(bytes)
}

fn open_envelope(buf: &[u8]) -> Result<(WireEvent, Envelope), ProtocolError> {
    let envelope: Envelope = serde_json::from_slice(buf)?;

    if envelope.v != PROTOCOL_VERSION {
        return Err(ProtocolError::VersionMismatch(envelope.v));
    }
    if envelope.ns != TRACKING_NAMESPACE {
        return Err(ProtocolError::WrongNamespace(envelope.ns));
    }

    let event = WireEvent::from_name(&envelope.event)
        .ok_or_else(|| ProtocolError::UnknownEvent(envelope.event.clone()))?;

    Ok((event, envelope))
}

fn payload<T: DeserializeOwned>(data: Value) -> Result<T, ProtocolError> {
    Ok(serde_json::from_value(data)?)
}

fn location(data: Value) -> Result<DriverLocation, ProtocolError> {
    let loc: DriverLocation = payload(data)?;
    loc.validate()?;
    Ok(loc)
}

fn empty_object() -> Value {
    Value::Object(Default::default())
}
