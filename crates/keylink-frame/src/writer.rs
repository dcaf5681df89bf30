use bytes::BytesMut;
use keylink_transport::ByteChannel;

use crate::channel::ChannelId;
use crate::codec::{encode_chunked, encode_frame, Frame, FrameConfig, MAX_PAYLOAD};
use crate::error::{FrameError, Result};

/// Writes complete frames to any [`ByteChannel`].
pub struct FrameWriter<C> {
    inner: C,
    buf: BytesMut,
    config: FrameConfig,
}

impl<C: ByteChannel> FrameWriter<C> {
    /// Create a new frame writer with default configuration.
    pub fn new(inner: C) -> Self {
        Self::with_config(inner, FrameConfig::default())
    }

    /// Create a new frame writer with explicit configuration.
    pub fn with_config(inner: C, config: FrameConfig) -> Self {
        Self {
            inner,
            buf: BytesMut::with_capacity(MAX_PAYLOAD * 2),
            config,
        }
    }

    /// Write a complete frame (blocking).
    pub fn write_frame(&mut self, frame: &Frame) -> Result<()> {
        self.send(frame.channel, frame.payload.as_ref())
    }

    /// Encode and send a payload on a channel as one frame.
    pub fn send(&mut self, channel: ChannelId, payload: &[u8]) -> Result<()> {
        self.check_size(payload.len())?;
        self.buf.clear();
        encode_frame(channel, payload, &mut self.buf)?;
        self.flush_buf()
    }

    /// Send `data` as consecutive frames of at most `max_chunk` bytes each.
    /// Returns the number of frames written.
    pub fn send_chunked(&mut self, channel: ChannelId, data: &[u8], max_chunk: usize) -> Result<usize> {
        let max_chunk = max_chunk.min(self.config.max_payload_size);
        self.buf.clear();
        let frames = encode_chunked(channel, data, max_chunk, &mut self.buf)?;
        self.flush_buf()?;
        Ok(frames)
    }

    /// Flush the underlying channel.
    pub fn flush(&mut self) -> Result<()> {
        self.inner.flush().map_err(FrameError::Transport)
    }

    /// Borrow the underlying channel.
    pub fn get_ref(&self) -> &C {
        &self.inner
    }

    /// Mutably borrow the underlying channel.
    pub fn get_mut(&mut self) -> &mut C {
        &mut self.inner
    }

    /// Consume the writer and return the inner channel.
    pub fn into_inner(self) -> C {
        self.inner
    }

    /// Current frame writer configuration.
    pub fn config(&self) -> &FrameConfig {
        &self.config
    }

    fn check_size(&self, size: usize) -> Result<()> {
        if size > self.config.max_payload_size {
            return Err(FrameError::PayloadTooLarge {
                size,
                max: self.config.max_payload_size,
            });
        }
        Ok(())
    }

    fn flush_buf(&mut self) -> Result<()> {
        self.inner.write_all(&self.buf)?;
        self.flush()
    }
}

#[cfg(test)]
mod tests {
    use bytes::BytesMut;
    use keylink_transport::MemoryChannel;

    use super::*;
    use crate::codec::{decode_frame, MAX_CHUNK_PAYLOAD};
    use crate::reader::FrameReader;

    fn decode_all(bytes: &[u8]) -> Vec<Frame> {
        let mut wire = BytesMut::from(bytes);
        let mut frames = Vec::new();
        while let Some(frame) = decode_frame(&mut wire, MAX_PAYLOAD).unwrap() {
            frames.push(frame);
        }
        assert!(wire.is_empty());
        frames
    }

    #[test]
    fn write_single_frame() {
        let mut writer = FrameWriter::new(MemoryChannel::default());
        writer.send(ChannelId::Cdc, b"hello").unwrap();

        let frames = decode_all(writer.get_ref().written());
        assert_eq!(frames, vec![Frame::new(ChannelId::Cdc, &b"hello"[..])]);
    }

    #[test]
    fn payload_too_large_rejected() {
        let cfg = FrameConfig {
            max_payload_size: 4,
        };
        let mut writer = FrameWriter::with_config(MemoryChannel::default(), cfg);

        let err = writer.send(ChannelId::Cdc, b"oversized").unwrap_err();
        assert!(matches!(err, FrameError::PayloadTooLarge { size: 9, max: 4 }));
        assert!(writer.get_ref().written().is_empty());
    }

    #[test]
    fn write_frame_method() {
        let mut writer = FrameWriter::new(MemoryChannel::default());
        writer
            .write_frame(&Frame::new(ChannelId::Fido, &b"abc"[..]))
            .unwrap();

        let frames = decode_all(writer.into_inner().written());
        assert_eq!(frames[0].channel, ChannelId::Fido);
        assert_eq!(frames[0].payload.as_ref(), b"abc");
    }

    #[test]
    fn chunked_send_splits_usb_packet() {
        let packet = [0x5Au8; 64];
        let mut writer = FrameWriter::new(MemoryChannel::default());
        let n = writer
            .send_chunked(ChannelId::Cdc, &packet, MAX_CHUNK_PAYLOAD)
            .unwrap();
        assert_eq!(n, 2);

        let frames = decode_all(writer.get_ref().written());
        assert_eq!(frames[0].payload.len(), 62);
        assert_eq!(frames[1].payload.len(), 2);
    }

    #[test]
    fn chunk_size_is_capped_by_config() {
        let cfg = FrameConfig {
            max_payload_size: 8,
        };
        let mut writer = FrameWriter::with_config(MemoryChannel::default(), cfg);
        let n = writer.send_chunked(ChannelId::Debug, &[1u8; 20], 62).unwrap();
        assert_eq!(n, 3);
        assert_eq!(writer.config().max_payload_size, 8);
    }

    #[test]
    fn written_bytes_decode_through_reader() {
        let mut writer = FrameWriter::new(MemoryChannel::default());
        writer.send(ChannelId::Control, b"z").unwrap();

        let bytes = writer.get_mut().take_written();
        let mut reader = FrameReader::new(MemoryChannel::with_input(bytes));
        let frame = reader.read_frame().unwrap();
        assert_eq!(frame.channel, ChannelId::Control);
        assert_eq!(frame.payload.as_ref(), b"z");
    }
}
