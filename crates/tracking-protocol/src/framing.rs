//! Length-prefixed framing.
//!
//! ```text
//! [0..4] : payload length (u32 BE)
//! [4..]  : payload (one JSON envelope)
//! ```

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::json_codec::ProtocolError;
use crate::wire_types::{LENGTH_PREFIX_LEN, MAX_FRAME_LEN};

/// Append one length-prefixed frame to `dst`.
pub fn write_frame(payload: &[u8], dst: &mut BytesMut) -> Result<(), ProtocolError> {
    if payload.len() > MAX_FRAME_LEN {
        return Err(ProtocolError::FrameTooLarge(payload.len()));
    }

    dst.reserve(LENGTH_PREFIX_LEN + payload.len());
    dst.put_u32(payload.len() as u32);
    dst.extend_from_slice(payload);
    Ok(())
}

/// Split one complete frame off the front of `src`.
///
/// Returns `Ok(None)` when more bytes are needed. An oversized length
/// prefix is an error: the stream cannot be resynchronized after it.
pub fn read_frame(src: &mut BytesMut) -> Result<Option<Bytes>, ProtocolError> {
    if src.len() < LENGTH_PREFIX_LEN {
        return Ok(None);
    }

    let len = u32::from_be_bytes([src[0], src[1], src[2], src[3]]) as usize;
    if len > MAX_FRAME_LEN {
        return Err(ProtocolError::FrameTooLarge(len));
    }

    if src.len() < LENGTH_PREFIX_LEN + len {
        src.reserve(LENGTH_PREFIX_LEN + len - src.len());
        return Ok(None);
    }

    src.advance(LENGTH_PREFIX_LEN);
    Ok(Some(src.split_to(len).freeze()))
}
