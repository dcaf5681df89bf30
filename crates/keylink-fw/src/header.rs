//! The one-byte command header.
//!
//! ```text
//!   bit:   7        6  5        4  3        2         1  0
//!        ┌────────┬────────┬────────────┬──────────┬──────────────┐
//!        │version │   id   │  endpoint  │  status  │ length class │
//!        │ (= 0)  │ (0..4) │   (0..4)   │ cmd: = 0 │  1/4/32/128  │
//!        └────────┴────────┴────────────┴──────────┴──────────────┘
//! ```
//!
//! Bit 2 is reserved in commands and carries the status in replies.

use std::fmt;

use crate::error::ParseError;

/// Largest command payload any length class can declare.
pub const CMDLEN_MAXBYTES: usize = 128;

const VERSION_BIT: u8 = 0x80;
const ID_MASK: u8 = 0x60;
const ID_SHIFT: u8 = 5;
const ENDPOINT_MASK: u8 = 0x18;
const ENDPOINT_SHIFT: u8 = 3;
const STATUS_BIT: u8 = 0x04;
const LEN_MASK: u8 = 0x03;

/// Command target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Endpoint {
    /// Interface FPGA.
    HwIfpga = 0,
    /// Application FPGA.
    HwAfpga = 1,
    /// Secure-core firmware.
    Fw = 2,
    /// Application software.
    Sw = 3,
}

impl Endpoint {
    pub fn from_bits(bits: u8) -> Self {
        match bits & 0x03 {
            0 => Self::HwIfpga,
            1 => Self::HwAfpga,
            2 => Self::Fw,
            _ => Self::Sw,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::HwIfpga => "HW_IFPGA",
            Self::HwAfpga => "HW_AFPGA",
            Self::Fw => "FW",
            Self::Sw => "SW",
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl std::str::FromStr for Endpoint {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "hw_ifpga" | "ifpga" | "0" => Ok(Self::HwIfpga),
            "hw_afpga" | "afpga" | "1" => Ok(Self::HwAfpga),
            "fw" | "2" => Ok(Self::Fw),
            "sw" | "3" => Ok(Self::Sw),
            _ => Err(format!("unknown endpoint: {s}")),
        }
    }
}

/// Fixed payload size selected by the low two header bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum LengthClass {
    Len1 = 0,
    Len4 = 1,
    Len32 = 2,
    Len128 = 3,
}

impl LengthClass {
    pub fn from_bits(bits: u8) -> Self {
        match bits & LEN_MASK {
            0 => Self::Len1,
            1 => Self::Len4,
            2 => Self::Len32,
            _ => Self::Len128,
        }
    }

    pub const fn bytes(self) -> usize {
        match self {
            Self::Len1 => 1,
            Self::Len4 => 4,
            Self::Len32 => 32,
            Self::Len128 => 128,
        }
    }
}

/// A decoded command (or reply) header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandHeader {
    /// Transaction id, echoed in the reply. Two bits.
    pub id: u8,
    pub endpoint: Endpoint,
    /// Reply status; always `false` in commands.
    pub status: bool,
    pub len: LengthClass,
}

impl CommandHeader {
    /// Only the low two bits of `id` are kept.
    pub fn new(id: u8, endpoint: Endpoint, len: LengthClass) -> Self {
        Self {
            id: id & 0x03,
            endpoint,
            status: false,
            len,
        }
    }

    /// Decode an inbound command header.
    pub fn decode(byte: u8) -> Result<Self, ParseError> {
        if byte & VERSION_BIT != 0 {
            return Err(ParseError::BadVersion { byte });
        }
        if byte & STATUS_BIT != 0 {
            return Err(ParseError::ReservedBitSet { byte });
        }
        Ok(Self {
            id: (byte & ID_MASK) >> ID_SHIFT,
            endpoint: Endpoint::from_bits((byte & ENDPOINT_MASK) >> ENDPOINT_SHIFT),
            status: false,
            len: LengthClass::from_bits(byte),
        })
    }

    pub fn encode(&self) -> u8 {
        ((self.id & 0x03) << ID_SHIFT)
            | ((self.endpoint as u8) << ENDPOINT_SHIFT)
            | (u8::from(self.status) << 2)
            | self.len as u8
    }

    /// Header for the reply to this command: same id and endpoint, status 0.
    pub fn reply(&self, len: LengthClass) -> Self {
        Self::new(self.id, self.endpoint, len)
    }

    pub fn payload_len(&self) -> usize {
        self.len.bytes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_named_fields() {
        // id 1, endpoint FW, len class 2
        let hdr = CommandHeader::decode(0b0011_0010).unwrap();
        assert_eq!(hdr.id, 1);
        assert_eq!(hdr.endpoint, Endpoint::Fw);
        assert_eq!(hdr.len, LengthClass::Len32);
        assert_eq!(hdr.payload_len(), 32);
        assert!(!hdr.status);
    }

    #[test]
    fn rejects_version_bit() {
        assert_eq!(
            CommandHeader::decode(0x80),
            Err(ParseError::BadVersion { byte: 0x80 })
        );
    }

    #[test]
    fn rejects_reserved_bit() {
        assert_eq!(
            CommandHeader::decode(0x04),
            Err(ParseError::ReservedBitSet { byte: 0x04 })
        );
    }

    #[test]
    fn length_classes() {
        let sizes: Vec<_> = (0..4).map(|b| LengthClass::from_bits(b).bytes()).collect();
        assert_eq!(sizes, vec![1, 4, 32, 128]);
    }

    #[test]
    fn every_valid_byte_round_trips() {
        for byte in 0u8..=0x7f {
            if byte & STATUS_BIT != 0 {
                continue;
            }
            assert_eq!(CommandHeader::decode(byte).unwrap().encode(), byte);
        }
    }

    #[test]
    fn reply_header_keeps_id_and_endpoint() {
        let cmd = CommandHeader::new(3, Endpoint::Fw, LengthClass::Len1);
        let reply = cmd.reply(LengthClass::Len128);
        assert_eq!(reply.encode(), (3 << 5) | (2 << 3) | 3);
    }

    #[test]
    fn status_bit_encodes_at_bit_two() {
        let mut hdr = CommandHeader::new(0, Endpoint::HwIfpga, LengthClass::Len1);
        hdr.status = true;
        assert_eq!(hdr.encode(), 0x04);
    }

    #[test]
    fn endpoint_names_parse() {
        assert_eq!("fw".parse::<Endpoint>().unwrap(), Endpoint::Fw);
        assert_eq!("HW_AFPGA".parse::<Endpoint>().unwrap(), Endpoint::HwAfpga);
        assert!("usb".parse::<Endpoint>().is_err());
    }
}
