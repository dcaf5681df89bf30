use bytes::Bytes;

use crate::config::FwConfig;
use crate::error::ParseError;
use crate::header::{CommandHeader, Endpoint, CMDLEN_MAXBYTES};

/// A complete command addressed to this firmware.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    pub header: CommandHeader,
    /// Exactly `header.payload_len()` bytes. Byte 0 is the command code.
    pub payload: Bytes,
}

impl Command {
    pub fn code(&self) -> u8 {
        self.payload.first().copied().unwrap_or(0)
    }
}

/// Progress after feeding bytes to a [`CommandParser`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseStatus {
    /// More payload bytes are needed.
    Pending,
    Complete(Command),
    /// The command was dropped. The parser is ready for the next header.
    Rejected(ParseError),
}

/// Incremental command parser: one header byte, then exactly the number of
/// payload bytes its length class names.
#[derive(Debug, Clone)]
pub struct CommandParser {
    header: Option<CommandHeader>,
    buf: [u8; CMDLEN_MAXBYTES],
    filled: usize,
    capacity: usize,
    identity: Endpoint,
}

impl CommandParser {
    pub fn new(config: &FwConfig) -> Self {
        Self {
            header: None,
            buf: [0; CMDLEN_MAXBYTES],
            filled: 0,
            capacity: config.max_command_len.min(CMDLEN_MAXBYTES),
            identity: config.identity,
        }
    }

    /// `true` when the next byte will be read as a header.
    pub fn is_idle(&self) -> bool {
        self.header.is_none()
    }

    /// Payload bytes still expected for the current command.
    pub fn remaining(&self) -> usize {
        self.header.map_or(0, |hdr| hdr.payload_len() - self.filled)
    }

    pub fn reset(&mut self) {
        self.header = None;
        self.filled = 0;
    }

    pub fn push(&mut self, byte: u8) -> ParseStatus {
        let Some(header) = self.header else {
            return self.on_header(byte);
        };

        self.buf[self.filled] = byte;
        self.filled += 1;
        if self.filled < header.payload_len() {
            return ParseStatus::Pending;
        }

        let payload = Bytes::copy_from_slice(&self.buf[..self.filled]);
        self.reset();

        if header.endpoint != self.identity {
            tracing::warn!(endpoint = %header.endpoint, "command not addressed to us");
            return ParseStatus::Rejected(ParseError::WrongEndpoint(header.endpoint));
        }
        ParseStatus::Complete(Command { header, payload })
    }

    /// Feed bytes until a command completes or is rejected. Returns how many
    /// bytes were used; the rest belong to whatever follows.
    pub fn feed(&mut self, bytes: &[u8]) -> (usize, ParseStatus) {
        for (i, &byte) in bytes.iter().enumerate() {
            match self.push(byte) {
                ParseStatus::Pending => {}
                done => return (i + 1, done),
            }
        }
        (bytes.len(), ParseStatus::Pending)
    }

    fn on_header(&mut self, byte: u8) -> ParseStatus {
        let header = match CommandHeader::decode(byte) {
            Ok(header) => header,
            Err(err) => {
                tracing::warn!(byte, %err, "couldn't parse command header");
                return ParseStatus::Rejected(err);
            }
        };
        if header.payload_len() > self.capacity {
            tracing::warn!(
                needed = header.payload_len(),
                capacity = self.capacity,
                "command buffer overrun"
            );
            return ParseStatus::Rejected(ParseError::BufferTooSmall {
                needed: header.payload_len(),
                capacity: self.capacity,
            });
        }
        self.header = Some(header);
        self.filled = 0;
        ParseStatus::Pending
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;
    use crate::header::LengthClass;

    fn parser() -> CommandParser {
        CommandParser::new(&FwConfig::default())
    }

    fn fw_header(len: LengthClass) -> u8 {
        CommandHeader::new(0, Endpoint::Fw, len).encode()
    }

    #[test]
    fn version_bit_rejected() {
        let mut p = parser();
        assert_eq!(
            p.push(0x80),
            ParseStatus::Rejected(ParseError::BadVersion { byte: 0x80 })
        );
        assert!(p.is_idle());
    }

    #[test]
    fn reserved_bit_rejected() {
        let mut p = parser();
        assert_eq!(
            p.push(0x04),
            ParseStatus::Rejected(ParseError::ReservedBitSet { byte: 0x04 })
        );
    }

    #[test]
    fn short_input_is_pending_not_complete() {
        let mut p = parser();
        let mut input = vec![fw_header(LengthClass::Len32)];
        input.extend_from_slice(&[0xab; 31]);

        let (used, status) = p.feed(&input);
        assert_eq!(used, 32);
        assert_eq!(status, ParseStatus::Pending);
        assert_eq!(p.remaining(), 1);

        let (_, status) = p.feed(&[0xcd]);
        let ParseStatus::Complete(cmd) = status else {
            panic!("expected a complete command, got {status:?}");
        };
        assert_eq!(cmd.payload.len(), 32);
        assert_eq!(cmd.payload[31], 0xcd);
    }

    #[test]
    fn one_byte_command() {
        let mut p = parser();
        let (used, status) = p.feed(&[fw_header(LengthClass::Len1), 0x01, 0xff]);
        assert_eq!(used, 2);
        match status {
            ParseStatus::Complete(cmd) => {
                assert_eq!(cmd.code(), 0x01);
                assert_eq!(cmd.header.endpoint, Endpoint::Fw);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn other_endpoint_rejected_after_payload() {
        let mut p = parser();
        let hdr = CommandHeader::new(1, Endpoint::Sw, LengthClass::Len4).encode();
        let (used, status) = p.feed(&[hdr, 1, 2, 3, 4]);
        assert_eq!(used, 5);
        assert_eq!(
            status,
            ParseStatus::Rejected(ParseError::WrongEndpoint(Endpoint::Sw))
        );
        assert!(p.is_idle());
    }

    #[test]
    fn oversized_command_rejected_at_header() {
        let mut p = CommandParser::new(&FwConfig {
            max_command_len: 32,
            ..FwConfig::default()
        });
        assert_eq!(
            p.push(fw_header(LengthClass::Len128)),
            ParseStatus::Rejected(ParseError::BufferTooSmall {
                needed: 128,
                capacity: 32
            })
        );
        assert!(p.is_idle());
    }

    proptest! {
        // A command never completes early, however its bytes are split.
        #[test]
        fn prop_completes_exactly_at_declared_length(
            class in 0u8..4,
            id in 0u8..4,
            split in 0usize..=128,
        ) {
            let len = LengthClass::from_bits(class);
            let header = CommandHeader::new(id, Endpoint::Fw, len).encode();
            let payload: Vec<u8> = (0..len.bytes()).map(|i| i as u8).collect();
            let split = split.min(payload.len() - 1);

            let mut p = parser();
            prop_assert_eq!(p.push(header), ParseStatus::Pending);
            let (_, status) = p.feed(&payload[..split]);
            prop_assert_eq!(status, ParseStatus::Pending);
            let (used, status) = p.feed(&payload[split..]);
            prop_assert_eq!(used, payload.len() - split);
            match status {
                ParseStatus::Complete(cmd) => {
                    prop_assert_eq!(cmd.header.id, id);
                    prop_assert_eq!(cmd.payload.as_ref(), payload.as_slice());
                }
                other => prop_assert!(false, "unexpected {:?}", other),
            }
        }
    }
}
