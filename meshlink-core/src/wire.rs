//! Framing: length-prefix (4 bytes LE) + bincode payload.

use crate::protocol::Message;

const LEN_SIZE: usize = 4;
const MAX_FRAME_LEN: u32 = 1024 * 1024; // 1 MiB

/// Encode a message into a single frame: 4 bytes LE length + bincode payload.
pub fn encode_frame(msg: &Message) -> Result<Vec<u8>, FrameEncodeError> {
    let payload = bincode::serialize(msg).map_err(FrameEncodeError::Encode)?;
    if payload.len() > MAX_FRAME_LEN as usize {
        return Err(FrameEncodeError::TooLarge(payload.len()));
    }
    let len = payload.len() as u32;
    let mut out = Vec::with_capacity(LEN_SIZE + payload.len());
    out.extend_from_slice(&len.to_le_bytes());
    out.extend_from_slice(&payload);
    Ok(out)
}

/// Error encoding a message into a frame (bincode or size limit).
#[derive(Debug, thiserror::Error)]
pub enum FrameEncodeError {
    #[error("encode error: {0}")]
    Encode(#[from] bincode::Error),
    #[error("frame too large: {0} bytes")]
    TooLarge(usize),
}

/// Decode one frame from the front of `bytes`. Returns the message and the number of bytes consumed.
pub fn decode_frame(bytes: &[u8]) -> Result<(Message, usize), FrameDecodeError> {
    if bytes.len() < LEN_SIZE {
        return Err(FrameDecodeError::NeedMore);
    }
    let len = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as usize;
    if len > MAX_FRAME_LEN as usize {
        return Err(FrameDecodeError::TooLarge);
    }
    if bytes.len() < LEN_SIZE + len {
        return Err(FrameDecodeError::NeedMore);
    }
    let msg: Message =
        bincode::deserialize(&bytes[LEN_SIZE..LEN_SIZE + len]).map_err(FrameDecodeError::Decode)?;
    Ok((msg, LEN_SIZE + len))
}

/// Decode a payload that must hold exactly one frame. The transport delivers whole
/// payloads, so leftover bytes mean the payload is corrupt.
pub fn decode_message(bytes: &[u8]) -> Result<Message, FrameDecodeError> {
    let (msg, consumed) = decode_frame(bytes)?;
    if consumed != bytes.len() {
        return Err(FrameDecodeError::TrailingBytes(bytes.len() - consumed));
    }
    Ok(msg)
}

/// Error decoding a frame (need more bytes, too large, trailing data, or bincode failure).
#[derive(Debug, thiserror::Error)]
pub enum FrameDecodeError {
    #[error("need more bytes")]
    NeedMore,
    #[error("frame too large")]
    TooLarge,
    #[error("{0} trailing bytes after frame")]
    TrailingBytes(usize),
    #[error("decode error: {0}")]
    Decode(#[from] bincode::Error),
}
