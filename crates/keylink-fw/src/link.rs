use keylink_frame::{ChannelId, FrameWriter, RestartCause, MAX_PAYLOAD};
use keylink_transport::ByteChannel;

use crate::config::FwConfig;
use crate::error::{FwError, Result};
use crate::header::CommandHeader;
use crate::parser::{Command, CommandParser, ParseStatus};
use crate::reply::build_reply;

/// The secure core's end of the UART link.
///
/// Inbound bytes arrive wrapped in bridge transport frames. `FwLink` strips
/// those transparently so a command may span several of them, and wraps
/// replies the same way on the way out.
pub struct FwLink<C> {
    channel: C,
    parser: CommandParser,
    mode: Option<ChannelId>,
    mode_bytes_left: u8,
}

impl<C: ByteChannel> FwLink<C> {
    pub fn new(channel: C, config: &FwConfig) -> Self {
        Self {
            channel,
            parser: CommandParser::new(config),
            mode: None,
            mode_bytes_left: 0,
        }
    }

    /// Next payload byte of the CDC stream (blocking).
    ///
    /// A transport frame on any other channel leaves the stream in an unknown
    /// state and is reported as [`FwError::Fatal`].
    pub fn read_byte(&mut self) -> Result<u8> {
        while self.mode_bytes_left == 0 {
            let mode = self.channel.read_byte()?;
            if mode != ChannelId::Cdc.as_u8() {
                tracing::error!(mode, "only CDC transport frames are supported");
                self.mode = None;
                return Err(FwError::Fatal(RestartCause::UnsupportedMode { byte: mode }));
            }
            let length = self.channel.read_byte()?;
            if usize::from(length) > MAX_PAYLOAD {
                self.mode = None;
                return Err(FwError::Fatal(RestartCause::OversizedFrame {
                    channel: ChannelId::Cdc,
                    length,
                }));
            }
            self.mode = Some(ChannelId::Cdc);
            self.mode_bytes_left = length;
        }

        let byte = self.channel.read_byte()?;
        self.mode_bytes_left -= 1;
        Ok(byte)
    }

    /// Read one command (blocking).
    ///
    /// Parse failures drop only this command and come back as
    /// [`FwError::Parse`]; the caller decides whether to
    /// [`drain_transport_frame`](Self::drain_transport_frame).
    pub fn read_command(&mut self) -> Result<Command> {
        self.parser.reset();
        loop {
            let byte = self.read_byte()?;
            match self.parser.push(byte) {
                ParseStatus::Pending => {}
                ParseStatus::Complete(command) => {
                    tracing::debug!(
                        id = command.header.id,
                        len = command.payload.len(),
                        code = command.code(),
                        "command received"
                    );
                    return Ok(command);
                }
                ParseStatus::Rejected(err) => return Err(FwError::Parse(err)),
            }
        }
    }

    /// Discard what is left of the current transport frame. Returns the
    /// number of bytes dropped.
    pub fn drain_transport_frame(&mut self) -> Result<usize> {
        let left = usize::from(self.mode_bytes_left);
        for _ in 0..left {
            self.channel.read_byte()?;
            self.mode_bytes_left -= 1;
        }
        if left > 0 {
            tracing::debug!(dropped = left, "transport frame drained");
        }
        Ok(left)
    }

    /// Send a reply to `command`. Returns the number of transport frames
    /// written.
    pub fn reply(&mut self, command: &CommandHeader, code: u8, data: &[u8]) -> Result<usize> {
        let frames = build_reply(command, code, data)?;
        let mut writer = FrameWriter::new(&mut self.channel);
        for frame in &frames {
            writer.write_frame(frame)?;
        }
        Ok(frames.len())
    }

    /// Bytes left in the current inbound transport frame.
    pub fn mode_bytes_left(&self) -> u8 {
        self.mode_bytes_left
    }

    /// Channel of the current inbound transport frame, if any.
    pub fn mode(&self) -> Option<ChannelId> {
        self.mode
    }

    pub fn get_ref(&self) -> &C {
        &self.channel
    }

    pub fn get_mut(&mut self) -> &mut C {
        &mut self.channel
    }

    pub fn into_inner(self) -> C {
        self.channel
    }
}

#[cfg(test)]
mod tests {
    use bytes::BytesMut;
    use keylink_frame::{decode_frame, encode_frame};
    use keylink_transport::MemoryChannel;

    use super::*;
    use crate::error::ParseError;
    use crate::header::{Endpoint, LengthClass};

    fn cdc(payloads: &[&[u8]]) -> Vec<u8> {
        let mut buf = BytesMut::new();
        for payload in payloads {
            encode_frame(ChannelId::Cdc, payload, &mut buf).unwrap();
        }
        buf.to_vec()
    }

    fn link(input: Vec<u8>) -> FwLink<MemoryChannel> {
        FwLink::new(MemoryChannel::with_input(input), &FwConfig::default())
    }

    #[test]
    fn command_spans_transport_frames() {
        let hdr = CommandHeader::new(1, Endpoint::Fw, LengthClass::Len4).encode();
        let mut fw = link(cdc(&[&[hdr, 0x03], &[0xaa, 0xbb, 0xcc]]));

        let command = fw.read_command().unwrap();
        assert_eq!(command.header.id, 1);
        assert_eq!(command.payload.as_ref(), &[0x03, 0xaa, 0xbb, 0xcc]);
        assert_eq!(fw.mode_bytes_left(), 0);
        assert_eq!(fw.mode(), Some(ChannelId::Cdc));
    }

    #[test]
    fn empty_transport_frames_are_skipped() {
        let hdr = CommandHeader::new(0, Endpoint::Fw, LengthClass::Len1).encode();
        let mut fw = link(cdc(&[&[], &[hdr, 0x01]]));
        assert_eq!(fw.read_command().unwrap().code(), 0x01);
    }

    #[test]
    fn non_cdc_mode_is_fatal() {
        let mut fw = link(vec![0x80, 1, 0x00]);
        let err = fw.read_command().unwrap_err();
        assert_eq!(
            err.restart_cause(),
            Some(RestartCause::UnsupportedMode { byte: 0x80 })
        );
    }

    #[test]
    fn bad_header_then_drain_resyncs() {
        let good = CommandHeader::new(0, Endpoint::Fw, LengthClass::Len1).encode();
        let mut fw = link(cdc(&[&[0x80, 9, 9, 9], &[good, 0x08]]));

        let err = fw.read_command().unwrap_err();
        assert!(matches!(
            err,
            FwError::Parse(ParseError::BadVersion { byte: 0x80 })
        ));
        assert_eq!(fw.drain_transport_frame().unwrap(), 3);

        assert_eq!(fw.read_command().unwrap().code(), 0x08);
    }

    #[test]
    fn reply_goes_out_as_cdc_frames() {
        let mut fw = link(Vec::new());
        let cmd = CommandHeader::new(3, Endpoint::Fw, LengthClass::Len1);
        assert_eq!(fw.reply(&cmd, 0x02, b"name").unwrap(), 2);

        let mut wire = BytesMut::from(fw.get_ref().written());
        let first = decode_frame(&mut wire, MAX_PAYLOAD).unwrap().unwrap();
        let second = decode_frame(&mut wire, MAX_PAYLOAD).unwrap().unwrap();
        assert_eq!(first.payload.as_ref(), &[(3 << 5) | (2 << 3) | 2, 0x02]);
        assert_eq!(second.payload.len(), 31);
        assert!(wire.is_empty());
    }

    #[test]
    fn unknown_reply_writes_nothing() {
        let mut fw = link(Vec::new());
        let cmd = CommandHeader::new(0, Endpoint::Fw, LengthClass::Len1);
        assert!(matches!(fw.reply(&cmd, 0x55, &[]), Err(FwError::Reply(_))));
        assert!(fw.into_inner().written().is_empty());
    }
}
