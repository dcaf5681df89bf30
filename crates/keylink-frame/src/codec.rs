use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::channel::ChannelId;
use crate::error::{FrameError, RestartCause, Result};

/// Frame header: channel (1) + length (1) = 2 bytes.
pub const HEADER_SIZE: usize = 2;

/// Largest payload a frame may carry, matching the USB packet size.
pub const MAX_PAYLOAD: usize = 64;

/// Largest chunk that still fits one USB packet once its own 2-byte
/// transport header is added.
pub const MAX_CHUNK_PAYLOAD: usize = MAX_PAYLOAD - HEADER_SIZE;

/// A framed message with channel routing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// The channel this message belongs to.
    pub channel: ChannelId,
    /// The message payload.
    pub payload: Bytes,
}

impl Frame {
    /// Create a new frame.
    pub fn new(channel: ChannelId, payload: impl Into<Bytes>) -> Self {
        Self {
            channel,
            payload: payload.into(),
        }
    }

    /// The total wire size of this frame (header + payload).
    pub fn wire_size(&self) -> usize {
        HEADER_SIZE + self.payload.len()
    }
}

/// Encode a frame into the wire format.
///
/// Wire format:
/// ```text
/// ┌────────────┬────────────┬──────────────────┐
/// │ Channel    │ Length     │ Payload          │
/// │ (1B, bit)  │ (1B, 0-64) │ (Length bytes)   │
/// └────────────┴────────────┴──────────────────┘
/// ```
pub fn encode_frame(channel: ChannelId, payload: &[u8], dst: &mut BytesMut) -> Result<()> {
    if !channel.is_link_channel() {
        return Err(FrameError::NotLinkChannel(channel));
    }
    if payload.len() > MAX_PAYLOAD {
        return Err(FrameError::PayloadTooLarge {
            size: payload.len(),
            max: MAX_PAYLOAD,
        });
    }
    dst.reserve(HEADER_SIZE + payload.len());
    dst.put_u8(channel.as_u8());
    dst.put_u8(payload.len() as u8);
    dst.put_slice(payload);
    Ok(())
}

/// Encode `data` as consecutive frames of at most `max_chunk` payload bytes.
///
/// Returns the number of frames written. Empty `data` writes nothing.
pub fn encode_chunked(
    channel: ChannelId,
    data: &[u8],
    max_chunk: usize,
    dst: &mut BytesMut,
) -> Result<usize> {
    if max_chunk == 0 || max_chunk > MAX_PAYLOAD {
        return Err(FrameError::PayloadTooLarge {
            size: max_chunk,
            max: MAX_PAYLOAD,
        });
    }
    let mut frames = 0;
    for chunk in data.chunks(max_chunk) {
        encode_frame(channel, chunk, dst)?;
        frames += 1;
    }
    Ok(frames)
}

/// Decode a frame from a buffer.
///
/// Returns `Ok(None)` if the buffer doesn't contain a complete frame yet.
/// On success, consumes the frame bytes from the buffer. A bad header is
/// reported as [`FrameError::RestartRequired`] and nothing is consumed.
pub fn decode_frame(src: &mut BytesMut, max_payload: usize) -> Result<Option<Frame>> {
    if src.is_empty() {
        return Ok(None);
    }

    let channel = ChannelId::from_wire(src[0])
        .ok_or(FrameError::RestartRequired(RestartCause::Desync { byte: src[0] }))?;

    if src.len() < HEADER_SIZE {
        return Ok(None); // Need more data
    }

    let length = src[1];
    if usize::from(length) > max_payload.min(MAX_PAYLOAD) {
        return Err(FrameError::RestartRequired(RestartCause::OversizedFrame {
            channel,
            length,
        }));
    }

    let total = HEADER_SIZE + usize::from(length);
    if src.len() < total {
        return Ok(None); // Need more data
    }

    src.advance(HEADER_SIZE);
    let payload = src.split_to(usize::from(length)).freeze();

    Ok(Some(Frame { channel, payload }))
}

/// Configuration for the frame codec.
#[derive(Debug, Clone)]
pub struct FrameConfig {
    /// Maximum payload size in bytes. Default and ceiling: [`MAX_PAYLOAD`].
    pub max_payload_size: usize,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            max_payload_size: MAX_PAYLOAD,
        }
    }
}
