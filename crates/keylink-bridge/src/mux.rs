//! The bridge poll loop.
//!
//! One frame is in flight at a time:
//!
//! ```text
//! Idle ──channel byte──▶ HeaderPending ──length byte──▶ PayloadAccumulating ──▶ Delivering ──▶ Idle
//!                                            │
//!                                            └─(inactive)─▶ Discarding ───────────────────────▶ Idle
//! ```
//!
//! A delivering frame stays in the ring until its whole payload has arrived
//! and the target endpoint is idle; that stall is what holds the peer back
//! once the ring crosses the flow-control threshold.

use std::convert::Infallible;

use bytes::Bytes;
use keylink_frame::{
    ChannelId, ChannelMask, DecodeEvent, DecodeState, Frame, FrameDecoder, FrameError,
    FrameWriter, RestartCause, MAX_PAYLOAD,
};
use keylink_transport::{ByteChannel, FlowLine, RingBuffer};

use crate::control::ControlCommand;
use crate::endpoint::{UpstreamSink, UsbEndpoint};
use crate::error::Result;
use crate::link::LinkContext;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MuxState {
    /// Waiting for the channel byte of the next header.
    Idle,
    /// Channel byte accepted, waiting for the length byte.
    HeaderPending,
    /// Waiting for the whole payload and an idle endpoint.
    PayloadAccumulating,
    /// A complete frame is ready to hand to its endpoint.
    Delivering,
    /// Dropping the payload of a frame for an inactive channel.
    Discarding,
}

/// Result of one [`Bridge::poll`] pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    /// Nothing could move.
    Idle,
    /// At least one byte, frame or USB packet moved.
    Progressed,
    /// The flow line is down and the device must restart.
    Restart(RestartCause),
}

/// Counters kept by the poll loop.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BridgeStats {
    /// Frames handed to a USB endpoint.
    pub delivered: u64,
    /// Frames dropped because their channel is inactive.
    pub discarded: u64,
    /// USB OUT packets forwarded to the UART.
    pub forwarded: u64,
    /// Frames that had to wait for a busy endpoint.
    pub stalls: u64,
    /// CONTROL frames with an unknown or malformed command.
    pub ignored_control: u64,
}

enum Step {
    Blocked,
    Advanced,
    Restart(RestartCause),
}

/// Bridge-side channel multiplexer.
///
/// `S` starts USB IN transfers; `W` is the UART transmit side used to
/// forward USB OUT packets to the secure core.
pub struct Bridge<S, W> {
    sink: S,
    uart: FrameWriter<W>,
    decoder: FrameDecoder,
    state: MuxState,
    pending: Option<Frame>,
    stalled: bool,
    scratch: [u8; MAX_PAYLOAD],
    packets: [[u8; MAX_PAYLOAD]; 3],
    stats: BridgeStats,
}

impl<S: UpstreamSink, W: ByteChannel> Bridge<S, W> {
    /// Bridge for `link`, delivering the channels `link` was configured with.
    pub fn new<L: FlowLine, const N: usize>(sink: S, uart: W, link: &LinkContext<L, N>) -> Self {
        Self {
            sink,
            uart: FrameWriter::new(uart),
            decoder: FrameDecoder::new(link.active()),
            state: MuxState::Idle,
            pending: None,
            stalled: false,
            scratch: [0; MAX_PAYLOAD],
            packets: [[0; MAX_PAYLOAD]; 3],
            stats: BridgeStats::default(),
        }
    }

    /// Run one pass: forward parked USB OUT packets, then drain the ring
    /// until nothing more can move.
    pub fn poll<L: FlowLine, const N: usize>(
        &mut self,
        link: &LinkContext<L, N>,
    ) -> Result<PollOutcome> {
        let mut progressed = match self.forward_usb_out(link)? {
            Step::Restart(cause) => return Ok(self.restart(link, cause)),
            Step::Advanced => true,
            Step::Blocked => false,
        };

        loop {
            match self.step(link) {
                Step::Blocked => break,
                Step::Advanced => progressed = true,
                Step::Restart(cause) => return Ok(self.restart(link, cause)),
            }
        }

        Ok(if progressed {
            PollOutcome::Progressed
        } else {
            PollOutcome::Idle
        })
    }

    /// Poll until a restart is required. Never returns otherwise.
    pub fn run<L: FlowLine, const N: usize>(
        &mut self,
        link: &LinkContext<L, N>,
    ) -> Result<RestartCause> {
        loop {
            match self.poll(link)? {
                PollOutcome::Restart(cause) => return Ok(cause),
                PollOutcome::Idle => std::hint::spin_loop(),
                PollOutcome::Progressed => {}
            }
        }
    }

    /// Channels delivered to USB; everything else is discarded.
    pub fn active(&self) -> ChannelMask {
        self.decoder.active()
    }

    pub fn state(&self) -> MuxState {
        self.state
    }

    pub fn decode_state(&self) -> DecodeState {
        self.decoder.state()
    }

    pub fn stats(&self) -> BridgeStats {
        self.stats
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn sink_mut(&mut self) -> &mut S {
        &mut self.sink
    }

    pub fn uart(&self) -> &W {
        self.uart.get_ref()
    }

    pub fn uart_mut(&mut self) -> &mut W {
        self.uart.get_mut()
    }

    /// Forward parked USB OUT packets. A slot is always freed once its
    /// packet has been handed to the UART: a frame that failed partway is
    /// never sent again, since its first bytes are already on the wire.
    fn forward_usb_out<L: FlowLine, const N: usize>(
        &mut self,
        link: &LinkContext<L, N>,
    ) -> Result<Step> {
        let mut step = Step::Blocked;
        for endpoint in UsbEndpoint::ALL {
            let channel = endpoint.channel();
            let uart = &mut self.uart;
            let sent = link
                .slots()
                .get(endpoint)
                .drain(|packet| Ok::<_, Infallible>(uart.send(channel, packet).map(|()| packet.len())));
            let Ok(Some(sent)) = sent else {
                continue;
            };
            match sent {
                Ok(len) => {
                    tracing::trace!(%channel, len, "usb out forwarded");
                    self.stats.forwarded += 1;
                    step = Step::Advanced;
                }
                Err(err @ (FrameError::Transport(_) | FrameError::Io(_))) => {
                    tracing::error!(%channel, %err, "uart write failed inside a frame");
                    return Ok(Step::Restart(RestartCause::UplinkWriteFailed { channel }));
                }
                Err(err) => return Err(err.into()),
            }
        }
        Ok(step)
    }

    fn restart<L: FlowLine, const N: usize>(
        &mut self,
        link: &LinkContext<L, N>,
        cause: RestartCause,
    ) -> PollOutcome {
        link.flow().signal_pause();
        self.state = MuxState::Idle;
        self.pending = None;
        tracing::error!(%cause, "link restart required");
        PollOutcome::Restart(cause)
    }

    fn step<L: FlowLine, const N: usize>(&mut self, link: &LinkContext<L, N>) -> Step {
        let ring = link.ring();
        match self.state {
            MuxState::Idle | MuxState::HeaderPending => {
                let mut byte = [0u8; 1];
                if ring.pop_into(&mut byte, 1) == 0 {
                    return Step::Blocked;
                }
                let event = self.decoder.decode_step(byte[0]);
                self.on_event(link, event)
            }
            MuxState::PayloadAccumulating => {
                let DecodeState {
                    mode: Some(channel),
                    remaining,
                    ..
                } = self.decoder.state()
                else {
                    self.state = MuxState::Idle;
                    return Step::Advanced;
                };

                if let Some(endpoint) = UsbEndpoint::from_channel(channel) {
                    if link.busy().is_busy(endpoint) {
                        self.note_stall(channel);
                        return Step::Blocked;
                    }
                }
                let remaining = usize::from(remaining);
                if ring.occupancy() < remaining {
                    return Step::Blocked;
                }
                self.consume(link, ring, remaining)
            }
            MuxState::Discarding => {
                let remaining = usize::from(self.decoder.state().remaining);
                let available = ring.occupancy().min(remaining);
                if available == 0 {
                    return Step::Blocked;
                }
                self.consume(link, ring, available)
            }
            MuxState::Delivering => self.deliver(link),
        }
    }

    /// Pop `n` bytes and run them through the decoder.
    fn consume<L: FlowLine, const N: usize>(
        &mut self,
        link: &LinkContext<L, N>,
        ring: &RingBuffer<N>,
        n: usize,
    ) -> Step {
        let popped = ring.pop_into(&mut self.scratch, n);
        let mut last = DecodeEvent::NeedMore;
        for &byte in &self.scratch[..popped] {
            let event = self.decoder.decode_step(byte);
            if event != DecodeEvent::NeedMore {
                last = event;
            }
        }
        match last {
            DecodeEvent::NeedMore => Step::Advanced,
            event => self.on_event(link, event),
        }
    }

    fn on_event<L: FlowLine, const N: usize>(
        &mut self,
        link: &LinkContext<L, N>,
        event: DecodeEvent,
    ) -> Step {
        match event {
            DecodeEvent::NeedMore => {
                self.state = MuxState::HeaderPending;
                Step::Advanced
            }
            DecodeEvent::HeaderAccepted {
                channel,
                length,
                discard,
            } => {
                tracing::trace!(%channel, length, discard, "frame header");
                self.state = if discard {
                    MuxState::Discarding
                } else {
                    MuxState::PayloadAccumulating
                };
                Step::Advanced
            }
            DecodeEvent::FrameComplete(frame) => {
                self.pending = Some(frame);
                self.state = MuxState::Delivering;
                self.deliver(link)
            }
            DecodeEvent::FrameDiscarded { channel, length } => {
                tracing::warn!(%channel, length, "frame for inactive channel discarded");
                self.stats.discarded += 1;
                self.frame_done(link);
                Step::Advanced
            }
            DecodeEvent::Restart(cause) => Step::Restart(cause),
        }
    }

    fn deliver<L: FlowLine, const N: usize>(&mut self, link: &LinkContext<L, N>) -> Step {
        let Some(frame) = self.pending.take() else {
            self.state = MuxState::Idle;
            return Step::Advanced;
        };

        match UsbEndpoint::from_channel(frame.channel) {
            Some(endpoint) => {
                if !link.busy().try_claim(endpoint) {
                    self.note_stall(frame.channel);
                    self.pending = Some(frame);
                    return Step::Blocked;
                }
                self.submit(endpoint, &frame.payload);
            }
            None => {
                if let Some(step) = self.on_control(frame.payload) {
                    return step;
                }
            }
        }

        self.frame_done(link);
        Step::Advanced
    }

    fn submit(&mut self, endpoint: UsbEndpoint, payload: &[u8]) {
        let packet = &mut self.packets[endpoint.index()];
        packet[..payload.len()].copy_from_slice(payload);
        packet[payload.len()..].fill(0);
        let len = endpoint.policy().packet_len(payload.len());

        tracing::debug!(channel = %endpoint.channel(), payload = payload.len(), len, "usb in transfer");
        self.sink.submit(endpoint, &packet[..len]);
        self.stats.delivered += 1;
    }

    fn on_control(&mut self, payload: Bytes) -> Option<Step> {
        match ControlCommand::parse(&payload) {
            Some(ControlCommand::SetEndpoints(mask)) => {
                tracing::info!(mask = mask.bits(), "endpoint mask change requested");
                Some(Step::Restart(RestartCause::EndpointsChanged { mask }))
            }
            None => {
                self.stats.ignored_control += 1;
                None
            }
        }
    }

    fn frame_done<L: FlowLine, const N: usize>(&mut self, link: &LinkContext<L, N>) {
        self.state = MuxState::Idle;
        self.stalled = false;
        let occupancy = link.ring().occupancy();
        if link.flow().resume_if_drained(occupancy) {
            tracing::debug!(occupancy, "peer resumed");
        }
    }

    fn note_stall(&mut self, channel: ChannelId) {
        if !self.stalled {
            self.stalled = true;
            self.stats.stalls += 1;
            tracing::trace!(%channel, "endpoint busy, delivery stalled");
        }
    }
}
