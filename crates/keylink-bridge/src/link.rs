use keylink_frame::{ChannelId, ChannelMask};
use keylink_transport::{FlowController, FlowLine, RingBuffer, DEFAULT_CAPACITY};

use crate::config::BridgeConfig;
use crate::endpoint::{BusyFlags, UsbEndpoint};
use crate::error::Result;
use crate::slot::OutSlots;

/// Everything shared between the interrupt handlers and the poll loop for
/// one physical link.
///
/// Interrupt handlers get `&LinkContext` and call the `on_*` entry points;
/// the poll loop passes the same reference to [`crate::Bridge::poll`].
/// Nothing here needs a lock: each shared field has exactly one writer per
/// direction.
#[derive(Debug)]
pub struct LinkContext<L, const N: usize = DEFAULT_CAPACITY> {
    ring: RingBuffer<N>,
    flow: FlowController<L>,
    busy: BusyFlags,
    slots: OutSlots,
    active: ChannelMask,
}

impl<L: FlowLine, const N: usize> LinkContext<L, N> {
    /// Build the context. The flow line stays low until [`start`](Self::start).
    pub fn new(line: L, config: &BridgeConfig) -> Result<Self> {
        config.validate()?;
        let flow = FlowController::new(line, config.flow)?;
        Ok(Self {
            ring: RingBuffer::new(),
            flow,
            busy: BusyFlags::new(),
            slots: OutSlots::new(),
            active: config.active,
        })
    }

    /// Let the peer start transmitting.
    pub fn start(&self) {
        tracing::info!(active = self.active.bits(), capacity = N, "bridge link up");
        self.flow.start();
    }

    /// UART receive interrupt. Returns `false` if the byte was dropped
    /// because the ring was full.
    pub fn on_uart_rx(&self, byte: u8) -> bool {
        let stored = self.ring.push(byte);
        self.flow.check_pause(self.ring.occupancy());
        stored
    }

    /// USB IN transfer-complete interrupt.
    pub fn on_transfer_complete(&self, endpoint: UsbEndpoint) {
        self.busy.release(endpoint);
    }

    /// USB OUT receive interrupt. Returns `false` to NAK the packet.
    pub fn on_usb_rx(&self, channel: ChannelId, packet: &[u8]) -> bool {
        match UsbEndpoint::from_channel(channel) {
            Some(endpoint) if self.active.contains_channel(channel) => {
                self.slots.get(endpoint).fill(packet)
            }
            _ => false,
        }
    }

    pub fn ring(&self) -> &RingBuffer<N> {
        &self.ring
    }

    pub fn flow(&self) -> &FlowController<L> {
        &self.flow
    }

    pub fn busy(&self) -> &BusyFlags {
        &self.busy
    }

    pub fn slots(&self) -> &OutSlots {
        &self.slots
    }

    pub fn active(&self) -> ChannelMask {
        self.active
    }
}

#[cfg(test)]
mod tests {
    use keylink_transport::RecordingLine;

    use super::*;

    fn link() -> LinkContext<RecordingLine> {
        let cfg = BridgeConfig::from_persisted(ChannelMask::FIDO.bits());
        let link = LinkContext::new(RecordingLine::new(), &cfg).unwrap();
        link.start();
        link
    }

    #[test]
    fn rx_pauses_peer_at_threshold() {
        let link = link();
        for _ in 0..132 {
            assert!(link.on_uart_rx(0));
        }
        assert!(link.flow().line().may_send());

        link.on_uart_rx(0);
        assert!(!link.flow().line().may_send());
        assert_eq!(link.flow().line().pauses(), 1);
    }

    #[test]
    fn rx_beyond_capacity_counts_overrun() {
        let link = link();
        for _ in 0..DEFAULT_CAPACITY {
            assert!(link.on_uart_rx(1));
        }
        assert!(!link.on_uart_rx(1));
        assert_eq!(link.ring().overruns(), 1);
    }

    #[test]
    fn usb_rx_only_for_active_usb_endpoints() {
        let link = link();
        assert!(link.on_usb_rx(ChannelId::Fido, b"hi"));
        assert!(!link.on_usb_rx(ChannelId::Debug, b"hi"));
        assert!(!link.on_usb_rx(ChannelId::Control, b"hi"));
        assert!(link.slots().get(UsbEndpoint::Fido).is_full());
    }

    #[test]
    fn transfer_complete_releases_busy() {
        let link = link();
        assert!(link.busy().try_claim(UsbEndpoint::Cdc));
        link.on_transfer_complete(UsbEndpoint::Cdc);
        assert!(!link.busy().is_busy(UsbEndpoint::Cdc));
    }
}
