//! Channel ids.
//!
//! Ids are single bits so a set of endpoints fits in one byte. The same
//! values are used on both processors.

use std::fmt;
use std::str::FromStr;

bitflags::bitflags! {
    /// A set of channels, e.g. the endpoints enabled on the bridge.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ChannelMask: u8 {
        const UART = 0x01;
        const CONTROL = 0x02;
        const QEMU = 0x10;
        const DEBUG = 0x20;
        const CDC = 0x40;
        const FIDO = 0x80;
    }
}

/// One logical stream on the link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ChannelId {
    /// No endpoint.
    None = 0x00,
    /// Raw UART access. Destination only, never framed on the link.
    Uart = 0x01,
    /// Bridge administration.
    Control = 0x02,
    /// Emulator debug port. Destination only, never framed on the link.
    Qemu = 0x10,
    /// HID debug endpoint.
    Debug = 0x20,
    /// CDC "serial port".
    Cdc = 0x40,
    /// FIDO/HID security token endpoint.
    Fido = 0x80,
}

impl ChannelId {
    /// The HID security token shares the FIDO endpoint.
    pub const HID: ChannelId = ChannelId::Fido;

    /// Channels that may appear in a frame header on the link.
    pub const LINK: [ChannelId; 4] = [
        ChannelId::Cdc,
        ChannelId::Fido,
        ChannelId::Debug,
        ChannelId::Control,
    ];

    pub const fn as_u8(self) -> u8 {
        self as u8
    }

    /// Any known channel value.
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x00 => Some(Self::None),
            0x01 => Some(Self::Uart),
            0x02 => Some(Self::Control),
            0x10 => Some(Self::Qemu),
            0x20 => Some(Self::Debug),
            0x40 => Some(Self::Cdc),
            0x80 => Some(Self::Fido),
            _ => None,
        }
    }

    /// A channel valid as the first byte of a link frame header.
    pub fn from_wire(value: u8) -> Option<Self> {
        Self::from_u8(value).filter(|ch| ch.is_link_channel())
    }

    pub fn is_link_channel(self) -> bool {
        Self::LINK.contains(&self)
    }

    pub fn mask(self) -> ChannelMask {
        ChannelMask::from_bits_truncate(self.as_u8())
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::None => "NONE",
            Self::Uart => "UART",
            Self::Control => "CONTROL",
            Self::Qemu => "QEMU",
            Self::Debug => "DEBUG",
            Self::Cdc => "CDC",
            Self::Fido => "FIDO",
        }
    }
}

impl ChannelMask {
    /// `true` if `channel` is a member. [`ChannelId::None`] is never a member.
    pub fn contains_channel(self, channel: ChannelId) -> bool {
        channel != ChannelId::None && self.contains(channel.mask())
    }

    /// Member channels, lowest bit first.
    pub fn channels(self) -> impl Iterator<Item = ChannelId> {
        self.iter().filter_map(|flag| ChannelId::from_u8(flag.bits()))
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl From<ChannelId> for u8 {
    fn from(channel: ChannelId) -> Self {
        channel.as_u8()
    }
}

impl TryFrom<u8> for ChannelId {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::from_u8(value).ok_or(value)
    }
}

impl FromStr for ChannelId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "none" => Ok(Self::None),
            "uart" => Ok(Self::Uart),
            "control" | "ctrl" => Ok(Self::Control),
            "qemu" => Ok(Self::Qemu),
            "debug" => Ok(Self::Debug),
            "cdc" => Ok(Self::Cdc),
            "fido" | "hid" => Ok(Self::Fido),
            other => {
                let value = other
                    .strip_prefix("0x")
                    .map(|hex| u8::from_str_radix(hex, 16))
                    .unwrap_or_else(|| other.parse::<u8>())
                    .map_err(|_| format!("unknown channel: {s}"))?;
                Self::from_u8(value).ok_or_else(|| format!("unknown channel value: {value:#04x}"))
            }
        }
    }
}

/// Returns a human-readable name for a raw channel byte.
pub fn channel_name(value: u8) -> &'static str {
    ChannelId::from_u8(value).map_or("UNKNOWN", ChannelId::name)
}
