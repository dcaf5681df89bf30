//! Incremental, one-byte-at-a-time frame decoding.
//!
//! The poll loop feeds bytes drained from the receive ring into
//! [`FrameDecoder::decode_step`]. The header is validated before any payload
//! byte is consumed, and frames addressed to inactive channels are counted
//! down and dropped without touching the payload buffer.

use bytes::Bytes;

use crate::channel::{ChannelId, ChannelMask};
use crate::codec::{Frame, MAX_PAYLOAD};
use crate::error::RestartCause;

/// Snapshot of the per-link decode state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DecodeState {
    /// Channel from the first header byte; `None` while unset.
    pub mode: Option<ChannelId>,
    /// Payload bytes still expected for the current frame.
    pub remaining: u8,
    /// Both header bytes have been consumed and validated.
    pub started: bool,
    /// The current frame's channel is inactive; its payload is dropped.
    pub discarding: bool,
}

/// Result of feeding one byte.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeEvent {
    /// The byte was consumed; nothing to report yet.
    NeedMore,
    /// The header is complete and the payload is non-empty.
    HeaderAccepted {
        channel: ChannelId,
        length: u8,
        discard: bool,
    },
    /// A frame for an active channel is complete.
    FrameComplete(Frame),
    /// A frame for an inactive channel has been fully consumed and dropped.
    FrameDiscarded { channel: ChannelId, length: u8 },
    /// The stream is unusable; the device must restart.
    Restart(RestartCause),
}

#[derive(Debug, Clone)]
pub struct FrameDecoder {
    state: DecodeState,
    active: ChannelMask,
    length: u8,
    payload: [u8; MAX_PAYLOAD],
    filled: usize,
}

impl FrameDecoder {
    /// Decoder that delivers frames for channels in `active` and discards
    /// the rest.
    pub fn new(active: ChannelMask) -> Self {
        Self {
            state: DecodeState::default(),
            active,
            length: 0,
            payload: [0; MAX_PAYLOAD],
            filled: 0,
        }
    }

    /// Decoder that delivers every link channel.
    pub fn accept_all() -> Self {
        Self::new(ChannelMask::all())
    }

    pub fn state(&self) -> DecodeState {
        self.state
    }

    pub fn active(&self) -> ChannelMask {
        self.active
    }

    /// `true` between the first header byte and the end of the frame.
    pub fn in_frame(&self) -> bool {
        self.state.mode.is_some()
    }

    /// Return to UNSET, dropping any partial frame.
    pub fn reset(&mut self) {
        self.state = DecodeState::default();
        self.length = 0;
        self.filled = 0;
    }

    /// Consume one byte.
    pub fn decode_step(&mut self, byte: u8) -> DecodeEvent {
        if !self.state.started {
            return match self.state.mode {
                None => self.on_channel_byte(byte),
                Some(channel) => self.on_length_byte(channel, byte),
            };
        }

        let Some(channel) = self.state.mode else {
            // started implies mode; treat a broken invariant as desync
            self.reset();
            return DecodeEvent::Restart(RestartCause::Desync { byte });
        };

        if !self.state.discarding {
            self.payload[self.filled] = byte;
            self.filled += 1;
        }
        self.state.remaining -= 1;

        if self.state.remaining == 0 {
            return self.finish(channel);
        }
        DecodeEvent::NeedMore
    }

    fn on_channel_byte(&mut self, byte: u8) -> DecodeEvent {
        match ChannelId::from_wire(byte) {
            Some(channel) => {
                self.state.mode = Some(channel);
                DecodeEvent::NeedMore
            }
            None => {
                tracing::error!(byte, "unknown channel in frame header");
                self.reset();
                DecodeEvent::Restart(RestartCause::Desync { byte })
            }
        }
    }

    fn on_length_byte(&mut self, channel: ChannelId, length: u8) -> DecodeEvent {
        if usize::from(length) > MAX_PAYLOAD {
            tracing::error!(%channel, length, "frame length exceeds packet size");
            self.reset();
            return DecodeEvent::Restart(RestartCause::OversizedFrame { channel, length });
        }

        let discard = !self.active.contains_channel(channel);
        self.length = length;
        self.filled = 0;
        self.state.remaining = length;
        self.state.started = true;
        self.state.discarding = discard;

        if length == 0 {
            return self.finish(channel);
        }
        DecodeEvent::HeaderAccepted {
            channel,
            length,
            discard,
        }
    }

    fn finish(&mut self, channel: ChannelId) -> DecodeEvent {
        let length = self.length;
        let event = if self.state.discarding {
            tracing::debug!(%channel, length, "frame discarded");
            DecodeEvent::FrameDiscarded { channel, length }
        } else {
            let payload = Bytes::copy_from_slice(&self.payload[..self.filled]);
            DecodeEvent::FrameComplete(Frame { channel, payload })
        };
        self.reset();
        event
    }
}
