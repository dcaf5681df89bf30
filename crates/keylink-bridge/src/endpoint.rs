//! USB-facing side of the bridge: endpoint identities, upload policy, busy
//! flags and the upstream transfer sink.

use std::sync::atomic::{AtomicBool, Ordering};

use keylink_frame::{ChannelId, MAX_PAYLOAD};

/// A channel that has a USB endpoint behind it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UsbEndpoint {
    Cdc,
    Fido,
    Debug,
}

/// How a delivered payload is turned into a USB IN packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketPolicy {
    /// Upload exactly the delivered bytes.
    Exact,
    /// Upload a full packet, zero-padded after the delivered bytes.
    Padded,
}

impl UsbEndpoint {
    pub const ALL: [UsbEndpoint; 3] = [UsbEndpoint::Cdc, UsbEndpoint::Fido, UsbEndpoint::Debug];

    pub fn from_channel(channel: ChannelId) -> Option<Self> {
        match channel {
            ChannelId::Cdc => Some(Self::Cdc),
            ChannelId::Fido => Some(Self::Fido),
            ChannelId::Debug => Some(Self::Debug),
            _ => None,
        }
    }

    pub fn channel(self) -> ChannelId {
        match self {
            Self::Cdc => ChannelId::Cdc,
            Self::Fido => ChannelId::Fido,
            Self::Debug => ChannelId::Debug,
        }
    }

    /// CDC is a byte stream; the HID endpoints exchange fixed-size reports.
    pub fn policy(self) -> PacketPolicy {
        match self {
            Self::Cdc => PacketPolicy::Exact,
            Self::Fido | Self::Debug => PacketPolicy::Padded,
        }
    }

    pub(crate) fn index(self) -> usize {
        self as usize
    }
}

impl PacketPolicy {
    /// Number of bytes to upload for a payload of `delivered` bytes.
    pub fn packet_len(self, delivered: usize) -> usize {
        match self {
            Self::Exact => delivered,
            Self::Padded => MAX_PAYLOAD,
        }
    }
}

/// Per-endpoint "transfer in flight" flags.
///
/// Set by the poll loop when it submits a transfer, cleared only by the
/// transfer-complete interrupt.
#[derive(Debug, Default)]
pub struct BusyFlags {
    flags: [AtomicBool; 3],
}

impl BusyFlags {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_busy(&self, endpoint: UsbEndpoint) -> bool {
        self.flags[endpoint.index()].load(Ordering::Acquire)
    }

    /// Mark the endpoint busy. Returns `false` if it already was.
    pub fn try_claim(&self, endpoint: UsbEndpoint) -> bool {
        self.flags[endpoint.index()]
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Transfer-complete interrupt.
    pub fn release(&self, endpoint: UsbEndpoint) {
        self.flags[endpoint.index()].store(false, Ordering::Release);
    }
}

/// Starts USB IN transfers.
///
/// The packet slice stays valid only for the duration of the call; hardware
/// implementations copy it into endpoint memory.
pub trait UpstreamSink {
    fn submit(&mut self, endpoint: UsbEndpoint, packet: &[u8]);
}

impl<S: UpstreamSink + ?Sized> UpstreamSink for &mut S {
    fn submit(&mut self, endpoint: UsbEndpoint, packet: &[u8]) {
        (**self).submit(endpoint, packet)
    }
}

/// One submitted USB IN transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transfer {
    pub endpoint: UsbEndpoint,
    pub data: Vec<u8>,
}

/// An [`UpstreamSink`] that keeps every submitted transfer.
#[derive(Debug, Default)]
pub struct RecordingSink {
    transfers: Vec<Transfer>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn transfers(&self) -> &[Transfer] {
        &self.transfers
    }

    pub fn take(&mut self) -> Vec<Transfer> {
        std::mem::take(&mut self.transfers)
    }
}

impl UpstreamSink for RecordingSink {
    fn submit(&mut self, endpoint: UsbEndpoint, packet: &[u8]) {
        self.transfers.push(Transfer {
            endpoint,
            data: packet.to_vec(),
        });
    }
}
