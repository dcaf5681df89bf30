use keylink_transport::{ByteChannel, TransportError};

use crate::channel::ChannelMask;
use crate::codec::Frame;
use crate::decoder::{DecodeEvent, FrameDecoder};
use crate::error::{FrameError, Result};

/// Reads complete frames from any [`ByteChannel`].
///
/// Frames for channels outside the active set are consumed and skipped.
/// A desynchronised header surfaces as [`FrameError::RestartRequired`].
pub struct FrameReader<C> {
    inner: C,
    decoder: FrameDecoder,
    discarded: usize,
}

impl<C: ByteChannel> FrameReader<C> {
    /// Create a frame reader that delivers every link channel.
    pub fn new(inner: C) -> Self {
        Self::with_active(inner, ChannelMask::all())
    }

    /// Create a frame reader that delivers only `active` channels.
    pub fn with_active(inner: C, active: ChannelMask) -> Self {
        Self {
            inner,
            decoder: FrameDecoder::new(active),
            discarded: 0,
        }
    }

    /// Read the next complete frame (blocking).
    ///
    /// Returns `Err(FrameError::ConnectionClosed)` when the channel closes.
    pub fn read_frame(&mut self) -> Result<Frame> {
        loop {
            let byte = match self.inner.read_byte() {
                Ok(byte) => byte,
                Err(TransportError::Closed) => return Err(FrameError::ConnectionClosed),
                Err(err) => return Err(FrameError::Transport(err)),
            };

            match self.decoder.decode_step(byte) {
                DecodeEvent::FrameComplete(frame) => return Ok(frame),
                DecodeEvent::FrameDiscarded { .. } => self.discarded += 1,
                DecodeEvent::Restart(cause) => return Err(FrameError::RestartRequired(cause)),
                DecodeEvent::NeedMore | DecodeEvent::HeaderAccepted { .. } => {}
            }
        }
    }

    /// Frames skipped because their channel was inactive.
    pub fn discarded(&self) -> usize {
        self.discarded
    }

    /// `true` if a frame has been started but not finished.
    pub fn mid_frame(&self) -> bool {
        self.decoder.in_frame()
    }

    /// Borrow the underlying channel.
    pub fn get_ref(&self) -> &C {
        &self.inner
    }

    /// Mutably borrow the underlying channel.
    pub fn get_mut(&mut self) -> &mut C {
        &mut self.inner
    }

    /// Consume the reader and return the inner channel.
    pub fn into_inner(self) -> C {
        self.inner
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use bytes::BytesMut;
    use keylink_transport::{IoChannel, MemoryChannel};

    use super::*;
    use crate::channel::ChannelId;
    use crate::codec::encode_frame;
    use crate::error::RestartCause;

    fn wire(frames: &[(ChannelId, &[u8])]) -> Vec<u8> {
        let mut buf = BytesMut::new();
        for (channel, payload) in frames {
            encode_frame(*channel, payload, &mut buf).unwrap();
        }
        buf.to_vec()
    }

    #[test]
    fn read_single_frame() {
        let mut reader = FrameReader::new(MemoryChannel::with_input(wire(&[(
            ChannelId::Cdc,
            b"hello",
        )])));
        let frame = reader.read_frame().unwrap();

        assert_eq!(frame.channel, ChannelId::Cdc);
        assert_eq!(frame.payload.as_ref(), b"hello");
    }

    #[test]
    fn read_multiple_frames() {
        let bytes = wire(&[
            (ChannelId::Cdc, b"one"),
            (ChannelId::Fido, b"two"),
            (ChannelId::Debug, b"three"),
        ]);
        let mut reader = FrameReader::new(IoChannel::new(Cursor::new(bytes)));

        let f1 = reader.read_frame().unwrap();
        let f2 = reader.read_frame().unwrap();
        let f3 = reader.read_frame().unwrap();

        assert_eq!((f1.channel, f1.payload.as_ref()), (ChannelId::Cdc, b"one".as_ref()));
        assert_eq!((f2.channel, f2.payload.as_ref()), (ChannelId::Fido, b"two".as_ref()));
        assert_eq!((f3.channel, f3.payload.as_ref()), (ChannelId::Debug, b"three".as_ref()));
    }

    #[test]
    fn skips_inactive_channels() {
        let bytes = wire(&[(ChannelId::Debug, b"drop me"), (ChannelId::Cdc, b"keep")]);
        let mut reader = FrameReader::with_active(MemoryChannel::with_input(bytes), ChannelMask::CDC);

        let frame = reader.read_frame().unwrap();
        assert_eq!(frame.payload.as_ref(), b"keep");
        assert_eq!(reader.discarded(), 1);
    }

    #[test]
    fn connection_closed_cleanly() {
        let mut reader = FrameReader::new(MemoryChannel::default());
        assert!(matches!(reader.read_frame(), Err(FrameError::ConnectionClosed)));
        assert!(!reader.mid_frame());
    }

    #[test]
    fn connection_closed_mid_frame() {
        let mut reader = FrameReader::new(MemoryChannel::with_input([0x40, 16, b'a', b'b']));
        assert!(matches!(reader.read_frame(), Err(FrameError::ConnectionClosed)));
        assert!(reader.mid_frame());
    }

    #[test]
    fn desync_in_stream() {
        let mut reader = FrameReader::new(MemoryChannel::with_input([0x55, 0x00]));
        let err = reader.read_frame().unwrap_err();
        assert_eq!(err.restart_cause(), Some(RestartCause::Desync { byte: 0x55 }));
    }

    #[test]
    fn accessors_and_into_inner() {
        let mut reader = FrameReader::new(MemoryChannel::with_input([1u8]));
        assert_eq!(reader.get_ref().pending(), 1);
        reader.get_mut().feed([2u8]);
        assert_eq!(reader.into_inner().pending(), 2);
    }
}
