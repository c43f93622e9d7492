//! Framing: 4-byte big-endian length prefix followed by a bincode payload.
//!
//! The payload uses bincode's fixed-width little-endian integers. Its length
//! must match the prefix exactly; truncated and padded frames are rejected.

use crate::protocol::{Message, MessageKind};
use bincode::Options;
use thiserror::Error;

/// Size of the length prefix in bytes.
pub const LEN_SIZE: usize = 4;
/// Largest payload accepted in either direction.
pub const MAX_FRAME_LEN: usize = 16 * 1024 * 1024;

#[derive(Debug, Error)]
pub enum WireError {
    #[error("malformed frame: {0}")]
    MalformedFrame(String),
    #[error("unknown message kind {0}")]
    UnknownKind(u32),
    #[error("encode error: {0}")]
    Encode(#[from] bincode::Error),
    #[error("frame of {0} bytes exceeds the frame limit")]
    FrameTooLarge(usize),
}

fn options() -> impl Options {
    bincode::DefaultOptions::new()
        .with_fixint_encoding()
        .with_limit(MAX_FRAME_LEN as u64)
        .reject_trailing_bytes()
}

/// Serializes a message payload without the length prefix.
pub fn encode_payload(message: &Message) -> Result<Vec<u8>, WireError> {
    let payload = options().serialize(message)?;
    if payload.len() > MAX_FRAME_LEN {
        return Err(WireError::FrameTooLarge(payload.len()));
    }
    Ok(payload)
}

/// Prepends the big-endian length prefix to an encoded payload.
pub fn frame_bytes(payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(LEN_SIZE + payload.len());
    out.extend_from_slice(&(payload.len() as u32).to_be_bytes());
    out.extend_from_slice(payload);
    out
}

/// Encodes a message into a complete frame.
pub fn encode(message: &Message) -> Result<Vec<u8>, WireError> {
    Ok(frame_bytes(&encode_payload(message)?))
}

/// Reads the payload length announced by a frame prefix.
pub fn read_len(prefix: [u8; LEN_SIZE]) -> Result<usize, WireError> {
    let len = u32::from_be_bytes(prefix) as usize;
    if len > MAX_FRAME_LEN {
        return Err(WireError::FrameTooLarge(len));
    }
    Ok(len)
}

/// Decodes one complete frame. `bytes` must hold exactly the prefix and the
/// announced payload.
pub fn decode(bytes: &[u8]) -> Result<Message, WireError> {
    if bytes.len() < LEN_SIZE {
        return Err(WireError::MalformedFrame(format!(
            "{} bytes cannot hold a length prefix",
            bytes.len()
        )));
    }
    let len = read_len([bytes[0], bytes[1], bytes[2], bytes[3]])?;
    let payload = &bytes[LEN_SIZE..];
    if payload.len() != len {
        return Err(WireError::MalformedFrame(format!(
            "declared {} payload bytes, got {}",
            len,
            payload.len()
        )));
    }
    decode_payload(payload)
}

/// Decodes a payload whose length prefix has already been consumed.
pub fn decode_payload(payload: &[u8]) -> Result<Message, WireError> {
    options().deserialize(payload).map_err(|e| match peek_tag(payload) {
        Some(tag) if MessageKind::from_tag(tag).is_none() => WireError::UnknownKind(tag),
        _ => WireError::MalformedFrame(e.to_string()),
    })
}

/// Reads the body tag that follows the origin string, if the payload is long
/// enough to carry one.
fn peek_tag(payload: &[u8]) -> Option<u32> {
    let origin_len = u64::from_le_bytes(payload.get(0..8)?.try_into().ok()?);
    let start = 8usize.checked_add(usize::try_from(origin_len).ok()?)?;
    let tag = payload.get(start..start.checked_add(4)?)?;
    Some(u32::from_le_bytes(tag.try_into().ok()?))
}
