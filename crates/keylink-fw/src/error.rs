use keylink_frame::RestartCause;
use keylink_transport::TransportError;

use crate::header::Endpoint;

/// A command that cannot be accepted. The command is dropped without a reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    /// Header bit 7 is set.
    #[error("unsupported header version in {byte:#04x}")]
    BadVersion { byte: u8 },

    /// Header bit 2 is set.
    #[error("reserved bit set in header {byte:#04x}")]
    ReservedBitSet { byte: u8 },

    /// The declared payload does not fit the command buffer.
    #[error("command of {needed} bytes exceeds buffer of {capacity}")]
    BufferTooSmall { needed: usize, capacity: usize },

    /// The command targets another endpoint.
    #[error("command addressed to {0}, not this firmware")]
    WrongEndpoint(Endpoint),
}

/// A reply that cannot be built. These are local programming errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ReplyError {
    #[error("unknown response code {0:#04x}")]
    UnknownResponse(u8),

    #[error("reply data of {len} bytes exceeds {max}")]
    DataTooLong { len: usize, max: usize },
}

/// Errors raised by the secure-core link.
#[derive(Debug, thiserror::Error)]
pub enum FwError {
    #[error("parse error: {0}")]
    Parse(#[from] ParseError),

    #[error("reply error: {0}")]
    Reply(#[from] ReplyError),

    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("frame error: {0}")]
    Frame(#[from] keylink_frame::FrameError),

    /// The link is unusable; the secure core must restart.
    #[error("fatal: {0}")]
    Fatal(RestartCause),
}

impl FwError {
    pub fn restart_cause(&self) -> Option<RestartCause> {
        match self {
            Self::Fatal(cause) => Some(*cause),
            Self::Frame(err) => err.restart_cause(),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, FwError>;
