//! Length-prefixed channel framing for the keylink UART bridge.
//!
//! Every frame on the bridge ↔ secure-core link is:
//! - a 1-byte channel id (one bit of [`ChannelMask`])
//! - a 1-byte payload length, at most [`MAX_PAYLOAD`]
//! - the payload
//!
//! The length is always known before the first payload byte, so the link
//! never scans for delimiters. A header byte that is not a link channel means
//! the stream is out of sync; that is reported as a [`RestartCause`], never
//! as a recoverable error.

pub mod channel;
pub mod codec;
#[cfg(feature = "async")]
pub mod codec_async;
pub mod decoder;
pub mod error;
pub mod reader;
pub mod writer;

pub use channel::{channel_name, ChannelId, ChannelMask};
pub use codec::{
    decode_frame, encode_chunked, encode_frame, Frame, FrameConfig, HEADER_SIZE,
    MAX_CHUNK_PAYLOAD, MAX_PAYLOAD,
};
#[cfg(feature = "async")]
pub use codec_async::LinkCodec;
pub use decoder::{DecodeEvent, DecodeState, FrameDecoder};
pub use error::{FrameError, RestartCause, Result};
pub use reader::FrameReader;
pub use writer::FrameWriter;
