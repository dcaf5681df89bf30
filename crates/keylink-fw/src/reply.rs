//! Reply generation.
//!
//! A reply is sent as one CDC transport frame holding the reply header and
//! the response code, followed by the rest of the declared length in CDC
//! frames of at most [`REPLY_CHUNK`] bytes.

use bytes::Bytes;
use keylink_frame::{ChannelId, Frame, MAX_CHUNK_PAYLOAD};

use crate::error::ReplyError;
use crate::header::{CommandHeader, LengthClass};

/// Largest data chunk per transport frame: 2-byte transport header plus the
/// chunk fills one 64-byte USB packet.
pub const REPLY_CHUNK: usize = MAX_CHUNK_PAYLOAD;

/// Command codes understood by the firmware.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum FwCommand {
    NameVersion = 0x01,
    LoadApp = 0x03,
    LoadAppData = 0x05,
    GetUdi = 0x08,
}

impl FwCommand {
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0x01 => Some(Self::NameVersion),
            0x03 => Some(Self::LoadApp),
            0x05 => Some(Self::LoadAppData),
            0x08 => Some(Self::GetUdi),
            _ => None,
        }
    }
}

/// Response codes and their fixed reply sizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum FwResponse {
    NameVersion = 0x02,
    LoadApp = 0x04,
    LoadAppData = 0x06,
    LoadAppDataReady = 0x07,
    GetUdi = 0x09,
}

impl FwResponse {
    pub const ALL: [FwResponse; 5] = [
        FwResponse::NameVersion,
        FwResponse::LoadApp,
        FwResponse::LoadAppData,
        FwResponse::LoadAppDataReady,
        FwResponse::GetUdi,
    ];

    pub fn from_code(code: u8) -> Option<Self> {
        Self::ALL.into_iter().find(|rsp| *rsp as u8 == code)
    }

    pub fn code(self) -> u8 {
        self as u8
    }

    /// Length class covering the response code plus its data.
    pub fn length_class(self) -> LengthClass {
        match self {
            Self::NameVersion | Self::GetUdi => LengthClass::Len32,
            Self::LoadApp | Self::LoadAppData => LengthClass::Len4,
            Self::LoadAppDataReady => LengthClass::Len128,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::NameVersion => "NAME_VERSION",
            Self::LoadApp => "LOAD_APP",
            Self::LoadAppData => "LOAD_APP_DATA",
            Self::LoadAppDataReady => "LOAD_APP_DATA_READY",
            Self::GetUdi => "GET_UDI",
        }
    }

    /// Room left for data after the response code.
    pub fn data_len(self) -> usize {
        self.length_class().bytes() - 1
    }
}

impl std::str::FromStr for FwResponse {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_uppercase().replace('-', "_");
        Self::ALL
            .into_iter()
            .find(|rsp| rsp.name() == wanted)
            .ok_or_else(|| format!("unknown response kind: {s}"))
    }
}

/// Build the transport frames for a reply to `command`.
///
/// `data` may be shorter than the reply's data length; the remainder is
/// zero-filled. An unknown `code` is logged and no frames are produced.
pub fn build_reply(
    command: &CommandHeader,
    code: u8,
    data: &[u8],
) -> Result<Vec<Frame>, ReplyError> {
    let Some(response) = FwResponse::from_code(code) else {
        tracing::error!(code, "unknown response code, reply abandoned");
        return Err(ReplyError::UnknownResponse(code));
    };

    let data_len = response.data_len();
    if data.len() > data_len {
        tracing::error!(code, len = data.len(), max = data_len, "reply data too long");
        return Err(ReplyError::DataTooLong {
            len: data.len(),
            max: data_len,
        });
    }

    let header = command.reply(response.length_class());
    let mut body = vec![0u8; data_len];
    body[..data.len()].copy_from_slice(data);

    let mut frames = Vec::with_capacity(1 + data_len.div_ceil(REPLY_CHUNK));
    frames.push(Frame::new(
        ChannelId::Cdc,
        Bytes::copy_from_slice(&[header.encode(), code]),
    ));
    frames.extend(
        body.chunks(REPLY_CHUNK)
            .map(|chunk| Frame::new(ChannelId::Cdc, Bytes::copy_from_slice(chunk))),
    );

    tracing::debug!(
        response = response.name(),
        id = command.id,
        frames = frames.len(),
        "reply built"
    );
    Ok(frames)
}
