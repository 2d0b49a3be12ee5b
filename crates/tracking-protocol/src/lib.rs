//! tracking-protocol
//!
//! Wire-level encoding/decoding for the tracking channel.
//!
//! This crate is responsible for turning logical tracking messages
//! (`tracking_core::ClientMessage` / `ServerMessage`) into bytes and
//! back again.
//!
//! - [`wire_types`] : event names, protocol constants
//! - [`frame`]      : client / server frames (messages + ack ids)
//! - [`json_codec`] : JSON envelope encoding scoped to the namespace
//! - [`framing`]    : length-prefixed framing over a byte stream

pub mod wire_types;
pub mod frame;
pub mod json_codec;
pub mod framing;

pub use frame::{ClientFrame, ServerFrame};

pub use json_codec::{
    ProtocolError,
    decode_client,
    decode_server,
    encode_client,
    encode_server,
};

pub use framing::{read_frame, write_frame};
