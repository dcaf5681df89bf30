use std::fmt;

use keylink_transport::TransportError;

use crate::channel::{ChannelId, ChannelMask};

/// A condition that leaves the link in an unknown state.
///
/// These are deliberately not error variants: the only safe response is to
/// drop the flow-control line and restart the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestartCause {
    /// A header byte that is not a link channel. The byte stream is
    /// misaligned and cannot be told apart from payload.
    Desync { byte: u8 },
    /// A header declaring more payload than a frame may carry.
    OversizedFrame { channel: ChannelId, length: u8 },
    /// The control channel requested a new endpoint mask.
    EndpointsChanged { mask: ChannelMask },
    /// A transport frame on the secure-core side that is not CDC.
    UnsupportedMode { byte: u8 },
    /// The UART failed while a forwarded frame was only partly written, so
    /// the peer's decoder is no longer at a frame boundary.
    UplinkWriteFailed { channel: ChannelId },
}

impl fmt::Display for RestartCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Desync { byte } => write!(f, "link desync: unknown channel byte {byte:#04x}"),
            Self::OversizedFrame { channel, length } => {
                write!(f, "oversized frame on {channel}: {length} bytes")
            }
            Self::EndpointsChanged { mask } => {
                write!(f, "endpoint mask changed to {:#04x}", mask.bits())
            }
            Self::UnsupportedMode { byte } => {
                write!(f, "unsupported transport mode {byte:#04x}")
            }
            Self::UplinkWriteFailed { channel } => {
                write!(f, "uart write failed mid-frame on {channel}")
            }
        }
    }
}

/// Errors that can occur during frame encoding/decoding.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// The payload exceeds the configured maximum size.
    #[error("payload too large ({size} bytes, max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    /// The channel is destination-only and cannot be framed on the link.
    #[error("channel {0} cannot be framed on the link")]
    NotLinkChannel(ChannelId),

    /// The stream hit a fatal condition; the device must restart.
    #[error("restart required: {0}")]
    RestartRequired(RestartCause),

    /// The underlying byte channel failed.
    #[error("frame transport error: {0}")]
    Transport(#[from] TransportError),

    /// An I/O error from an async stream.
    #[error("frame I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The byte source ended before a complete frame was received.
    #[error("connection closed (incomplete frame)")]
    ConnectionClosed,
}

impl FrameError {
    /// The restart cause, if this error is a fatal link condition.
    pub fn restart_cause(&self) -> Option<RestartCause> {
        match self {
            Self::RestartRequired(cause) => Some(*cause),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, FrameError>;
