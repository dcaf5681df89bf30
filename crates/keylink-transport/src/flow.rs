//! Receive-side flow control.
//!
//! The bridge drives one output line the peer samples before transmitting:
//! asserted means "may send", deasserted means "pause". The line drops as
//! soon as ring occupancy reaches the threshold and is raised again only by
//! the poll loop after it has drained a whole frame.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use crate::error::{Result, TransportError};
use crate::ring::DEFAULT_CAPACITY;

/// The "peer may transmit" output line.
pub trait FlowLine {
    /// Drive the line. `true` lets the peer transmit.
    fn set_may_send(&self, asserted: bool);
}

impl<L: FlowLine + ?Sized> FlowLine for &L {
    fn set_may_send(&self, asserted: bool) {
        (**self).set_may_send(asserted)
    }
}

/// Flow controller configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlowConfig {
    /// Capacity of the ring being protected, in bytes.
    pub capacity: usize,
    /// Occupancy, as a percentage of capacity, at which the peer is paused.
    pub pause_percent: u8,
}

impl Default for FlowConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CAPACITY,
            pause_percent: 95,
        }
    }
}

impl FlowConfig {
    /// Occupancy at or above which the peer must pause.
    pub fn threshold(&self) -> usize {
        (self.capacity * usize::from(self.pause_percent)).div_ceil(100)
    }

    pub fn validate(&self) -> Result<()> {
        if self.capacity == 0 {
            return Err(TransportError::InvalidConfig(
                "flow capacity must be non-zero".to_string(),
            ));
        }
        if self.pause_percent == 0 || self.pause_percent > 100 {
            return Err(TransportError::InvalidConfig(format!(
                "pause_percent must be 1..=100, got {}",
                self.pause_percent
            )));
        }
        Ok(())
    }
}

/// Single-threshold flow controller with explicit pause/resume edges.
///
/// `check_pause` runs in interrupt context after every received byte;
/// `resume_if_drained` runs in the poll loop after a frame is consumed.
#[derive(Debug)]
pub struct FlowController<L> {
    line: L,
    threshold: usize,
    paused: AtomicBool,
}

impl<L: FlowLine> FlowController<L> {
    pub fn new(line: L, config: FlowConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            line,
            threshold: config.threshold(),
            paused: AtomicBool::new(true),
        })
    }

    /// Raise the line for the first time. The controller starts paused so the
    /// peer stays quiet until the link context is fully set up.
    pub fn start(&self) {
        self.paused.store(false, Ordering::Release);
        self.line.set_may_send(true);
        tracing::debug!(threshold = self.threshold, "flow control started");
    }

    pub fn threshold(&self) -> usize {
        self.threshold
    }

    pub fn should_pause(&self, occupancy: usize) -> bool {
        occupancy >= self.threshold
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::Acquire)
    }

    /// Deassert the line. Only the first call after a resume produces an edge.
    pub fn signal_pause(&self) {
        if !self.paused.swap(true, Ordering::AcqRel) {
            self.line.set_may_send(false);
        }
    }

    /// Assert the line. Only the first call after a pause produces an edge.
    pub fn signal_resume(&self) {
        if self.paused.swap(false, Ordering::AcqRel) {
            self.line.set_may_send(true);
            // An interrupt may have paused between the swap and the line write.
            if self.paused.load(Ordering::Acquire) {
                self.line.set_may_send(false);
            }
        }
    }

    /// Interrupt side: pause if `occupancy` crossed the threshold.
    /// Returns `true` when the line was dropped by this call.
    pub fn check_pause(&self, occupancy: usize) -> bool {
        if self.should_pause(occupancy) && !self.is_paused() {
            self.signal_pause();
            return true;
        }
        false
    }

    /// Poll-loop side: call once per fully drained frame. Resumes the peer if
    /// it is paused and occupancy has fallen below the threshold.
    pub fn resume_if_drained(&self, occupancy: usize) -> bool {
        if self.is_paused() && !self.should_pause(occupancy) {
            self.signal_resume();
            return true;
        }
        false
    }

    pub fn line(&self) -> &L {
        &self.line
    }
}

/// A [`FlowLine`] that remembers its level and counts edges.
#[derive(Debug)]
pub struct RecordingLine {
    level: AtomicBool,
    pauses: AtomicUsize,
    resumes: AtomicUsize,
}

impl RecordingLine {
    pub fn new() -> Self {
        Self {
            level: AtomicBool::new(false),
            pauses: AtomicUsize::new(0),
            resumes: AtomicUsize::new(0),
        }
    }

    /// Current level: `true` while the peer may transmit.
    pub fn may_send(&self) -> bool {
        self.level.load(Ordering::Acquire)
    }

    /// Number of falling edges.
    pub fn pauses(&self) -> usize {
        self.pauses.load(Ordering::Relaxed)
    }

    /// Number of rising edges.
    pub fn resumes(&self) -> usize {
        self.resumes.load(Ordering::Relaxed)
    }
}

impl Default for RecordingLine {
    fn default() -> Self {
        Self::new()
    }
}

impl FlowLine for RecordingLine {
    fn set_may_send(&self, asserted: bool) {
        let previous = self.level.swap(asserted, Ordering::AcqRel);
        match (previous, asserted) {
            (true, false) => {
                self.pauses.fetch_add(1, Ordering::Relaxed);
            }
            (false, true) => {
                self.resumes.fetch_add(1, Ordering::Relaxed);
            }
            _ => {}
        }
    }
}
